//! Register-mapped storage transfers
//!
//! EEPROM and FRAM parts are addressed with a 1 or 2 byte word address
//! followed by the data:
//!
//! ```text
//! START | dev<<1 | W | word addr (1-2 bytes) | data...            STOP
//! START | dev<<1 | W | word addr (1-2 bytes) | RESTART | dev<<1 | R | data... STOP
//! ```
//!
//! Storage transfers wait for the bus by spinning; there is no way to abort
//! them. They are rare and short, and the caller has nothing else to do
//! until the data is there.

pub mod eeprom;

use core::hint::spin_loop;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::delay::DelayNs;
use escapement_core::BusController;
use escapement_hal::{I2cPeripheral, MemAddressWidth};

pub use eeprom::{Eeprom, EepromConfig, NvsError};

/// Timeout for one storage transfer in milliseconds
pub const NVS_TIMEOUT_MS: u32 = 100;

/// Time an EEPROM needs to commit a write, in milliseconds
pub const WRITE_SETTLE_MS: u32 = 5;

/// Outcome of a storage transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NvsTransferResult {
    Ok,
    Failed,
}

/// Storage device class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NvsDeviceKind {
    /// Needs a settle delay after every write
    Eeprom,
    /// Commits writes immediately
    Fram,
}

impl NvsDeviceKind {
    /// Check if writes complete without a settle delay
    pub fn is_zero_wait(self) -> bool {
        matches!(self, NvsDeviceKind::Fram)
    }
}

/// One storage transfer
///
/// `data` is advanced by `count` bytes after every transfer, so a sequence
/// of blocks can be moved by calling [`I2cNvs::transfer`] repeatedly with
/// the same descriptor, updating `word_addr` and `count` in between.
#[derive(Debug)]
pub struct NvsTransfer<'a> {
    /// 7-bit device address
    pub address: u8,
    /// Memory address inside the device
    pub word_addr: u16,
    /// Width of `word_addr` on the wire (2 for two bytes, anything else is one)
    pub word_addr_bytes: u8,
    /// Remaining caller buffer
    pub data: &'a mut [u8],
    /// Bytes to move in the next transfer
    pub count: usize,
}

impl<'a> NvsTransfer<'a> {
    /// Descriptor moving all of `data`
    pub fn new(address: u8, word_addr: u16, word_addr_bytes: u8, data: &'a mut [u8]) -> Self {
        let count = data.len();
        Self {
            address,
            word_addr,
            word_addr_bytes,
            data,
            count,
        }
    }

    fn advance(&mut self) {
        let data = core::mem::take(&mut self.data);
        self.data = &mut data[self.count..];
    }
}

/// Storage transfers on the shared bus
pub struct I2cNvs<'a, M: RawMutex, P, D> {
    bus: &'a BusController<M, P>,
    delay: D,
    kind: NvsDeviceKind,
}

impl<'a, M: RawMutex, P: I2cPeripheral, D: DelayNs> I2cNvs<'a, M, P, D> {
    pub fn new(bus: &'a BusController<M, P>, delay: D, kind: NvsDeviceKind) -> Self {
        Self { bus, delay, kind }
    }

    /// Device class
    pub fn kind(&self) -> NvsDeviceKind {
        self.kind
    }

    /// Read or write `t.count` bytes at `t.word_addr`
    ///
    /// Spins until the bus is idle, then performs the transfer with a
    /// [`NVS_TIMEOUT_MS`] timeout. Writes to non-zero-wait devices are
    /// followed by a [`WRITE_SETTLE_MS`] delay. `t.data` is advanced by
    /// `t.count` whether or not the transfer succeeded.
    ///
    /// A `count` larger than the remaining buffer fails without touching
    /// the bus.
    pub fn transfer(&mut self, t: &mut NvsTransfer<'_>, read: bool) -> NvsTransferResult {
        if t.count > t.data.len() {
            warn!(
                "storage transfer of {} bytes into {} byte buffer",
                t.count,
                t.data.len()
            );
            return NvsTransferResult::Failed;
        }

        while !self.bus.is_ready() {
            spin_loop();
        }

        let width = MemAddressWidth::from_bytes(t.word_addr_bytes);
        let block = &mut t.data[..t.count];

        let ret = if read {
            self.bus
                .mem_read(t.address, t.word_addr, width, block, NVS_TIMEOUT_MS)
        } else {
            let ret = self
                .bus
                .mem_write(t.address, t.word_addr, width, block, NVS_TIMEOUT_MS);
            if !self.kind.is_zero_wait() {
                self.delay.delay_ms(WRITE_SETTLE_MS);
            }
            ret
        };

        t.advance();

        match ret {
            Ok(()) => NvsTransferResult::Ok,
            Err(e) => {
                debug!(
                    "storage {} at {=u16:#x} failed: {:?}",
                    if read { "read" } else { "write" },
                    t.word_addr,
                    e
                );
                NvsTransferResult::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use escapement_hal::sim::{FrameKind, SimBus, SimDelay};
    use escapement_hal::I2cConfig;

    const EEPROM: u8 = 0x50;

    fn keep_waiting() -> bool {
        true
    }

    fn bus_with_eeprom() -> BusController<NoopRawMutex, SimBus> {
        let mut sim = SimBus::ready();
        sim.add_device(EEPROM);
        BusController::new(sim, I2cConfig::default(), keep_waiting)
    }

    #[test]
    fn test_write_two_byte_address() {
        let bus = bus_with_eeprom();
        let mut delay = SimDelay::new();
        let mut data = [0x11, 0x22, 0x33, 0x44];

        {
            let mut nvs = I2cNvs::new(&bus, &mut delay, NvsDeviceKind::Eeprom);
            let mut t = NvsTransfer::new(EEPROM, 0x0123, 2, &mut data);

            assert_eq!(nvs.transfer(&mut t, false), NvsTransferResult::Ok);
            assert!(t.data.is_empty());
        }

        assert!(delay.elapsed_ms() >= u64::from(WRITE_SETTLE_MS));

        bus.with_peripheral(|sim| {
            let frame = sim.last_frame().unwrap();
            assert_eq!(frame.kind, FrameKind::MemWrite);
            assert_eq!(frame.wire_address, 0xA0);
            assert_eq!(frame.mem_address, Some(0x0123));
            assert_eq!(frame.width, Some(MemAddressWidth::TwoBytes));
            assert_eq!(frame.data.as_slice(), &[0x11, 0x22, 0x33, 0x44]);

            let memory = sim.memory(EEPROM).unwrap();
            assert_eq!(&memory[0x0123..0x0127], &[0x11, 0x22, 0x33, 0x44]);
            assert_eq!(memory[0x0127], 0);
        });
    }

    #[test]
    fn test_fram_write_has_no_settle_delay() {
        let bus = bus_with_eeprom();
        let mut delay = SimDelay::new();
        let mut data = [0xAB];

        {
            let mut nvs = I2cNvs::new(&bus, &mut delay, NvsDeviceKind::Fram);
            let mut t = NvsTransfer::new(EEPROM, 0x10, 1, &mut data);
            assert_eq!(nvs.transfer(&mut t, false), NvsTransferResult::Ok);
        }

        assert_eq!(delay.elapsed_ms(), 0);
    }

    #[test]
    fn test_read_one_byte_address() {
        let bus = bus_with_eeprom();
        bus.with_peripheral(|sim| sim.load_memory(EEPROM, 0x40, &[9, 8, 7]));

        let mut nvs = I2cNvs::new(&bus, SimDelay::new(), NvsDeviceKind::Eeprom);
        let mut buf = [0u8; 3];
        let mut t = NvsTransfer::new(EEPROM, 0x40, 1, &mut buf);

        assert_eq!(nvs.transfer(&mut t, true), NvsTransferResult::Ok);
        drop(t);
        assert_eq!(buf, [9, 8, 7]);

        let width = bus.with_peripheral(|sim| sim.last_frame().unwrap().width);
        assert_eq!(width, Some(MemAddressWidth::OneByte));
    }

    #[test]
    fn test_read_timeout_fails() {
        let bus = bus_with_eeprom();
        bus.with_peripheral(|sim| sim.set_ack_latency_ms(NVS_TIMEOUT_MS + 1));

        let mut nvs = I2cNvs::new(&bus, SimDelay::new(), NvsDeviceKind::Eeprom);
        let mut buf = [0u8; 4];
        let mut t = NvsTransfer::new(EEPROM, 0, 2, &mut buf);

        assert_eq!(nvs.transfer(&mut t, true), NvsTransferResult::Failed);
        // Still advanced
        assert!(t.data.is_empty());
    }

    #[test]
    fn test_read_within_timeout_succeeds() {
        let bus = bus_with_eeprom();
        bus.with_peripheral(|sim| sim.set_ack_latency_ms(NVS_TIMEOUT_MS));

        let mut nvs = I2cNvs::new(&bus, SimDelay::new(), NvsDeviceKind::Eeprom);
        let mut buf = [0u8; 4];
        let mut t = NvsTransfer::new(EEPROM, 0, 2, &mut buf);
        assert_eq!(nvs.transfer(&mut t, true), NvsTransferResult::Ok);
    }

    #[test]
    fn test_chained_blocks_share_descriptor() {
        let bus = bus_with_eeprom();
        bus.with_peripheral(|sim| sim.load_memory(EEPROM, 0x200, &[1, 2, 3, 4, 5, 6]));

        let mut nvs = I2cNvs::new(&bus, SimDelay::new(), NvsDeviceKind::Eeprom);
        let mut buf = [0u8; 6];
        let mut t = NvsTransfer::new(EEPROM, 0x200, 2, &mut buf);

        t.count = 4;
        assert_eq!(nvs.transfer(&mut t, true), NvsTransferResult::Ok);
        assert_eq!(t.data.len(), 2);

        t.word_addr += 4;
        t.count = 2;
        assert_eq!(nvs.transfer(&mut t, true), NvsTransferResult::Ok);
        assert!(t.data.is_empty());

        drop(t);
        assert_eq!(buf, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_waits_for_bus_before_transfer() {
        let bus = bus_with_eeprom();
        bus.with_peripheral(|sim| sim.hold_busy(50));

        let mut nvs = I2cNvs::new(&bus, SimDelay::new(), NvsDeviceKind::Eeprom);
        let mut data = [0x5A];
        let mut t = NvsTransfer::new(EEPROM, 0, 1, &mut data);

        assert_eq!(nvs.transfer(&mut t, false), NvsTransferResult::Ok);
    }

    #[test]
    fn test_count_past_buffer_fails_without_bus_access() {
        let bus = bus_with_eeprom();
        let mut nvs = I2cNvs::new(&bus, SimDelay::new(), NvsDeviceKind::Eeprom);
        let mut data = [0u8; 2];
        let mut t = NvsTransfer::new(EEPROM, 0, 1, &mut data);
        t.count = 3;

        assert_eq!(nvs.transfer(&mut t, true), NvsTransferResult::Failed);
        assert_eq!(t.data.len(), 2);
        assert!(bus.with_peripheral(|sim| sim.frames().is_empty()));
    }
}
