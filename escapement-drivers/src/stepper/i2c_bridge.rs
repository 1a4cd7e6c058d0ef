//! Trinamic register bridge over I2C
//!
//! A bridge device on the bus exposes the registers of one or more TMC
//! drivers as sub-addresses. Each logical register is translated by a
//! [`TmcAddressMap`]; the write flag is part of the translated address.
//!
//! ```text
//! read:  START | 0x47<<1 | W | sub | RESTART | 0x47<<1 | R | status | d31..24 | d23..16 | d15..8 | d7..0 | STOP
//! write: START | 0x47<<1 | W | sub | d31..24 | d23..16 | d15..8 | d7..0 | STOP
//! ```

use embassy_sync::blocking_mutex::raw::RawMutex;
use escapement_core::traits::{
    TmcAddressMap, TmcDatagram, TmcRegisterIo, TmcStatus, UNSUPPORTED_REGISTER,
};
use escapement_core::BusController;
use escapement_hal::{I2cPeripheral, MemAddressWidth};

/// Default 7-bit address of the bridge device
pub const I2C_BRIDGE_ADDRESS: u8 = 0x47;

/// Timeout for one bridge access in milliseconds
pub const BRIDGE_TIMEOUT_MS: u32 = 100;

/// TMC register access through the I2C bridge
pub struct TmcI2cBridge<'a, M: RawMutex, P, T> {
    bus: &'a BusController<M, P>,
    map: T,
    address: u8,
}

impl<'a, M: RawMutex, P: I2cPeripheral, T: TmcAddressMap> TmcI2cBridge<'a, M, P, T> {
    /// Bridge at the default address
    pub fn new(bus: &'a BusController<M, P>, map: T) -> Self {
        Self::with_address(bus, map, I2C_BRIDGE_ADDRESS)
    }

    pub fn with_address(bus: &'a BusController<M, P>, map: T, address: u8) -> Self {
        Self { bus, map, address }
    }

    /// 7-bit bridge address
    pub fn address(&self) -> u8 {
        self.address
    }
}

impl<M: RawMutex, P: I2cPeripheral, T: TmcAddressMap> TmcRegisterIo for TmcI2cBridge<'_, M, P, T> {
    /// An unsupported register leaves `reg.payload` as it was. A failed
    /// read sets it to 0. Both report a zero status.
    fn read_register(&mut self, chip_select: u8, reg: &mut TmcDatagram) -> TmcStatus {
        let sub = self.map.map_address(chip_select, reg.addr);
        if sub == UNSUPPORTED_REGISTER {
            trace!("tmc{} register {=u8:#x} not mapped", chip_select, reg.addr.idx);
            return TmcStatus::default();
        }

        let mut b = [0u8; 5];
        if let Err(e) = self.bus.mem_read(
            self.address,
            u16::from(sub),
            MemAddressWidth::OneByte,
            &mut b,
            BRIDGE_TIMEOUT_MS,
        ) {
            warn!(
                "tmc{} read of {=u8:#x} failed: {:?}",
                chip_select, reg.addr.idx, e
            );
            b = [0; 5];
        }

        reg.payload = (b[4] as u32)
            | ((b[3] as u32) << 8)
            | ((b[2] as u32) << 16)
            | ((b[1] as u32) << 24);

        TmcStatus::new(b[0])
    }

    /// The bridge does not report a status on writes; always zero.
    fn write_register(&mut self, chip_select: u8, reg: &mut TmcDatagram) -> TmcStatus {
        reg.addr.write = true;
        let sub = self.map.map_address(chip_select, reg.addr);
        reg.addr.write = false;

        if sub == UNSUPPORTED_REGISTER {
            trace!("tmc{} register {=u8:#x} not mapped", chip_select, reg.addr.idx);
            return TmcStatus::default();
        }

        let data = [
            (reg.payload >> 24) as u8,
            (reg.payload >> 16) as u8,
            (reg.payload >> 8) as u8,
            reg.payload as u8,
        ];

        if let Err(e) = self.bus.mem_write(
            self.address,
            u16::from(sub),
            MemAddressWidth::OneByte,
            &data,
            BRIDGE_TIMEOUT_MS,
        ) {
            warn!(
                "tmc{} write of {=u8:#x} failed: {:?}",
                chip_select, reg.addr.idx, e
            );
        }

        TmcStatus::default()
    }
}
