//! Trinamic register access traits
//!
//! Trinamic stepper drivers expose 7-bit registers holding 32-bit values.
//! A register transport ([`TmcRegisterIo`]) moves [`TmcDatagram`]s to and
//! from a driver and reports the driver's status byte. Transports that put
//! several drivers behind one bus device translate the logical register
//! address through a [`TmcAddressMap`].

/// Sub-address returned by an address map for registers a driver does not have
pub const UNSUPPORTED_REGISTER: u8 = 0xFF;

/// Logical register address with the write-intent flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TmcAddress {
    /// Register index (0x00-0x7F)
    pub idx: u8,
    /// Write access
    pub write: bool,
}

impl TmcAddress {
    /// Read address of a register
    pub const fn new(idx: u8) -> Self {
        Self {
            idx: idx & 0x7F,
            write: false,
        }
    }

    /// Raw address byte, write flag in bit 7
    pub const fn value(self) -> u8 {
        (self.idx & 0x7F) | ((self.write as u8) << 7)
    }

    /// Parse a raw address byte
    pub const fn from_value(value: u8) -> Self {
        Self {
            idx: value & 0x7F,
            write: value & 0x80 != 0,
        }
    }
}

/// Register address plus 32-bit payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TmcDatagram {
    pub addr: TmcAddress,
    pub payload: u32,
}

impl TmcDatagram {
    /// Datagram for reading a register
    pub const fn new(idx: u8) -> Self {
        Self {
            addr: TmcAddress::new(idx),
            payload: 0,
        }
    }

    /// Datagram carrying a value to write
    pub const fn with_payload(idx: u8, payload: u32) -> Self {
        Self {
            addr: TmcAddress::new(idx),
            payload,
        }
    }
}

/// Status byte returned with every register access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TmcStatus {
    pub value: u8,
}

impl TmcStatus {
    pub const fn new(value: u8) -> Self {
        Self { value }
    }

    /// Driver was reset since GSTAT was last cleared
    pub fn reset_flag(&self) -> bool {
        self.value & (1 << 0) != 0
    }

    /// Overtemperature or short circuit shutdown
    pub fn driver_error(&self) -> bool {
        self.value & (1 << 1) != 0
    }

    /// StallGuard2 threshold reached
    pub fn stallguard(&self) -> bool {
        self.value & (1 << 2) != 0
    }

    /// Motor standstill
    pub fn standstill(&self) -> bool {
        self.value & (1 << 3) != 0
    }
}

/// Translation from a logical register to a bridge sub-address
///
/// Pure function of the driver's chip-select identity and the register
/// address including the write flag. Returns [`UNSUPPORTED_REGISTER`] for
/// registers the driver instance does not implement.
pub trait TmcAddressMap {
    fn map_address(&self, chip_select: u8, addr: TmcAddress) -> u8;
}

impl<F: Fn(u8, TmcAddress) -> u8> TmcAddressMap for F {
    fn map_address(&self, chip_select: u8, addr: TmcAddress) -> u8 {
        self(chip_select, addr)
    }
}

/// Register transport for Trinamic drivers
///
/// `chip_select` identifies the driver instance on the transport.
pub trait TmcRegisterIo {
    /// Read `reg.addr` into `reg.payload`
    fn read_register(&mut self, chip_select: u8, reg: &mut TmcDatagram) -> TmcStatus;

    /// Write `reg.payload` to `reg.addr`
    fn write_register(&mut self, chip_select: u8, reg: &mut TmcDatagram) -> TmcStatus;
}
