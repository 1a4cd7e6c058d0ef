//! Paged EEPROM/FRAM access
//!
//! EEPROM writes must not cross a page boundary: the device wraps around
//! inside the page instead. [`Eeprom`] splits reads and writes on page
//! boundaries and moves each piece with one storage transfer.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::delay::DelayNs;
use escapement_core::BusController;
use escapement_hal::I2cPeripheral;

use super::{I2cNvs, NvsDeviceKind, NvsTransfer, NvsTransferResult};

/// Largest page moved in one transfer
pub const MAX_PAGE_SIZE: usize = 64;

/// Bytes reachable with a 16-bit word address
pub const MAX_ADDRESSABLE: u32 = 0x1_0000;

/// Storage device geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EepromConfig {
    /// 7-bit device address
    pub address: u8,
    /// Capacity in bytes
    pub size: u32,
    /// Write page size in bytes (clamped to [`MAX_PAGE_SIZE`])
    pub page_size: u16,
    pub kind: NvsDeviceKind,
}

impl EepromConfig {
    /// 24C02, 256 bytes
    pub const AT24C02: Self = Self {
        address: 0x50,
        size: 256,
        page_size: 8,
        kind: NvsDeviceKind::Eeprom,
    };

    /// 24C32, 4 KiB
    pub const AT24C32: Self = Self {
        address: 0x50,
        size: 4096,
        page_size: 32,
        kind: NvsDeviceKind::Eeprom,
    };

    /// 24C256, 32 KiB
    pub const AT24C256: Self = Self {
        address: 0x50,
        size: 32768,
        page_size: 64,
        kind: NvsDeviceKind::Eeprom,
    };

    /// MB85RC256 FRAM, 32 KiB
    pub const MB85RC256: Self = Self {
        address: 0x50,
        size: 32768,
        page_size: MAX_PAGE_SIZE as u16,
        kind: NvsDeviceKind::Fram,
    };

    /// Word address width on the wire
    pub fn word_addr_bytes(&self) -> u8 {
        if self.size > 256 {
            2
        } else {
            1
        }
    }

    fn page_len(&self) -> usize {
        match self.page_size as usize {
            0 => MAX_PAGE_SIZE,
            n => n.min(MAX_PAGE_SIZE),
        }
    }

    /// Bytes from `offset` to the end of its page
    fn chunk_len(&self, offset: u32) -> usize {
        let page = self.page_len();
        page - (offset as usize % page)
    }
}

/// Storage errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NvsError {
    /// Access beyond the end of the device
    OutOfRange,
    /// A transfer did not complete
    Failed,
}

/// Paged storage device on the shared bus
pub struct Eeprom<'a, M: RawMutex, P, D> {
    nvs: I2cNvs<'a, M, P, D>,
    config: EepromConfig,
}

impl<'a, M: RawMutex, P: I2cPeripheral, D: DelayNs> Eeprom<'a, M, P, D> {
    pub fn new(bus: &'a BusController<M, P>, delay: D, config: EepromConfig) -> Self {
        Self {
            nvs: I2cNvs::new(bus, delay, config.kind),
            config,
        }
    }

    pub fn config(&self) -> &EepromConfig {
        &self.config
    }

    /// Capacity in bytes
    pub fn capacity(&self) -> u32 {
        self.config.size
    }

    /// Read `buf.len()` bytes starting at `offset`
    pub fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), NvsError> {
        self.check_range(offset, buf.len())?;

        let mut offset = offset;
        let mut t = NvsTransfer::new(
            self.config.address,
            offset as u16,
            self.config.word_addr_bytes(),
            buf,
        );

        while !t.data.is_empty() {
            t.word_addr = offset as u16;
            t.count = t.data.len().min(self.config.chunk_len(offset));
            if self.nvs.transfer(&mut t, true) != NvsTransferResult::Ok {
                return Err(NvsError::Failed);
            }
            offset += t.count as u32;
        }

        Ok(())
    }

    /// Write `data` starting at `offset`
    pub fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), NvsError> {
        self.check_range(offset, data.len())?;

        let mut page = [0u8; MAX_PAGE_SIZE];
        let mut offset = offset;
        let mut rest = data;

        while !rest.is_empty() {
            let len = rest.len().min(self.config.chunk_len(offset));
            page[..len].copy_from_slice(&rest[..len]);

            let mut t = NvsTransfer::new(
                self.config.address,
                offset as u16,
                self.config.word_addr_bytes(),
                &mut page[..len],
            );
            if self.nvs.transfer(&mut t, false) != NvsTransferResult::Ok {
                return Err(NvsError::Failed);
            }

            rest = &rest[len..];
            offset += len as u32;
        }

        Ok(())
    }

    /// Rejects accesses past the device end or past what a word address reaches
    fn check_range(&self, offset: u32, len: usize) -> Result<(), NvsError> {
        let limit = self.config.size.min(MAX_ADDRESSABLE);
        match u32::try_from(len).ok().and_then(|len| offset.checked_add(len)) {
            Some(end) if end <= limit => Ok(()),
            _ => Err(NvsError::OutOfRange),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use escapement_hal::sim::{FrameKind, SimBus, SimDelay};
    use escapement_hal::I2cConfig;

    fn keep_waiting() -> bool {
        true
    }

    fn bus_with_device(address: u8) -> BusController<NoopRawMutex, SimBus> {
        let mut sim = SimBus::ready();
        sim.add_device(address);
        BusController::new(sim, I2cConfig::default(), keep_waiting)
    }

    #[test]
    fn test_word_addr_width_follows_size() {
        assert_eq!(EepromConfig::AT24C02.word_addr_bytes(), 1);
        assert_eq!(EepromConfig::AT24C32.word_addr_bytes(), 2);
    }

    #[test]
    fn test_write_splits_on_page_boundary() {
        let bus = bus_with_device(0x50);
        let mut eeprom = Eeprom::new(&bus, SimDelay::new(), EepromConfig::AT24C32);

        // 40 bytes from 0x1C: 4 bytes to the page end, then 32, then 4
        let data: [u8; 40] = core::array::from_fn(|i| i as u8 + 1);
        eeprom.write(0x1C, &data).unwrap();

        bus.with_peripheral(|sim| {
            let writes: heapless::Vec<(u16, usize), 8> = sim
                .frames()
                .iter()
                .filter(|f| f.kind == FrameKind::MemWrite)
                .map(|f| (f.mem_address.unwrap(), f.len))
                .collect();
            assert_eq!(writes.as_slice(), &[(0x1C, 4), (0x20, 32), (0x40, 4)]);
            assert_eq!(&sim.memory(0x50).unwrap()[0x1C..0x1C + 40], &data[..]);
        });
    }

    #[test]
    fn test_each_page_write_settles() {
        let bus = bus_with_device(0x50);
        let mut delay = SimDelay::new();
        {
            let mut eeprom = Eeprom::new(&bus, &mut delay, EepromConfig::AT24C02);
            eeprom.write(0, &[0xEE; 16]).unwrap();
        }
        // Two 8-byte pages
        assert_eq!(delay.elapsed_ms(), 10);
    }

    #[test]
    fn test_read_back() {
        let bus = bus_with_device(0x50);
        bus.with_peripheral(|sim| sim.load_memory(0x50, 0x3F0, &[0xA5; 48]));

        let mut eeprom = Eeprom::new(&bus, SimDelay::new(), EepromConfig::AT24C32);
        let mut buf = [0u8; 48];
        eeprom.read(0x3F0, &mut buf).unwrap();
        assert_eq!(buf, [0xA5; 48]);

        let reads = bus.with_peripheral(|sim| {
            sim.frames()
                .iter()
                .filter(|f| f.kind == FrameKind::MemRead)
                .count()
        });
        assert_eq!(reads, 2);
    }

    #[test]
    fn test_out_of_range() {
        let bus = bus_with_device(0x50);
        let mut eeprom = Eeprom::new(&bus, SimDelay::new(), EepromConfig::AT24C02);

        let mut buf = [0u8; 8];
        assert_eq!(eeprom.read(250, &mut buf), Err(NvsError::OutOfRange));
        assert_eq!(eeprom.write(u32::MAX, &[1]), Err(NvsError::OutOfRange));
        assert!(bus.with_peripheral(|sim| sim.frames().is_empty()));
    }

    #[test]
    fn test_access_beyond_word_address_rejected() {
        let bus = bus_with_device(0x50);
        let config = EepromConfig {
            size: 0x2_0000,
            ..EepromConfig::AT24C256
        };
        let mut eeprom = Eeprom::new(&bus, SimDelay::new(), config);

        assert_eq!(eeprom.write(0x1_0000, &[1]), Err(NvsError::OutOfRange));
        assert_eq!(eeprom.write(0xFFFF, &[1, 2]), Err(NvsError::OutOfRange));
        assert!(bus.with_peripheral(|sim| sim.frames().is_empty()));

        // Last addressable byte is still reachable
        assert_eq!(eeprom.write(0xFFFF, &[1]), Ok(()));
        let frame = bus.with_peripheral(|sim| sim.last_frame().cloned()).unwrap();
        assert_eq!(frame.mem_address, Some(0xFFFF));
    }

    #[test]
    fn test_missing_device_fails() {
        let bus = bus_with_device(0x51);
        let mut eeprom = Eeprom::new(&bus, SimDelay::new(), EepromConfig::AT24C32);

        assert_eq!(eeprom.write(0, &[1, 2, 3]), Err(NvsError::Failed));
    }
}
