//! I2C peripheral abstractions
//!
//! Models a single I2C master peripheral the way vendor HALs expose it:
//! a small state machine that is idle or busy, interrupt-driven
//! transmit/receive that return as soon as the transfer is started, and
//! blocking memory-addressed transfers with an explicit timeout.
//!
//! All addresses handed to an [`I2cPeripheral`] are wire addresses, i.e. the
//! 7-bit device address already shifted into the framing byte. Use
//! [`wire_address`] to build one.

use crate::config::I2cConfig;

/// Build the 8-bit framing address from a 7-bit device address
#[inline]
pub const fn wire_address(address: u8) -> u8 {
    address << 1
}

/// Current activity of the peripheral state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusState {
    /// Not yet initialized
    Reset,
    /// Idle, a new transfer may be started
    Ready,
    /// Interrupt-driven transmit in progress
    BusyTx,
    /// Interrupt-driven receive in progress
    BusyRx,
    /// Peripheral reported an unrecoverable error
    Error,
}

impl BusState {
    /// Check if a new transfer may be started
    pub fn is_ready(self) -> bool {
        self == BusState::Ready
    }
}

/// Width of the memory (word) address sent ahead of a memory-addressed transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MemAddressWidth {
    /// One address byte (devices up to 256 bytes)
    OneByte,
    /// Two address bytes, high byte first
    TwoBytes,
}

impl MemAddressWidth {
    /// Select the width from a byte count; anything other than 2 is one byte
    pub fn from_bytes(bytes: u8) -> Self {
        if bytes == 2 {
            MemAddressWidth::TwoBytes
        } else {
            MemAddressWidth::OneByte
        }
    }

    /// Number of address bytes on the wire
    pub fn byte_len(self) -> usize {
        match self {
            MemAddressWidth::OneByte => 1,
            MemAddressWidth::TwoBytes => 2,
        }
    }

    /// Encode a memory address in wire order
    ///
    /// Returns the filled prefix of `buf`. A one byte address keeps the low byte.
    pub fn encode(self, mem_address: u16, buf: &mut [u8; 2]) -> &[u8] {
        match self {
            MemAddressWidth::OneByte => {
                buf[0] = mem_address as u8;
                &buf[..1]
            }
            MemAddressWidth::TwoBytes => {
                *buf = mem_address.to_be_bytes();
                &buf[..]
            }
        }
    }
}

/// Error from I2C operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum I2cError {
    /// Peripheral is busy with another transfer
    Busy,
    /// Bus error
    Bus,
    /// Arbitration lost
    ArbitrationLost,
    /// NACK received
    Nack,
    /// Timeout
    Timeout,
    /// Overrun
    Overrun,
    /// Other error
    Other,
}

/// I2C master peripheral
///
/// Implemented by chip-specific HALs. The interrupt-driven calls
/// ([`start_transmit`](Self::start_transmit), [`start_receive`](Self::start_receive))
/// only start a transfer; completion is observed through [`state`](Self::state)
/// returning to [`BusState::Ready`].
pub trait I2cPeripheral {
    /// Configure the peripheral (timing, filters, interrupt enables)
    fn init(&mut self, config: &I2cConfig);

    /// Current state of the peripheral state machine
    fn state(&self) -> BusState;

    /// Start an interrupt-driven transmit
    ///
    /// The peripheral copies `data` into its own transfer buffer.
    fn start_transmit(&mut self, wire_address: u8, data: &[u8]) -> Result<(), I2cError>;

    /// Start an interrupt-driven receive of `len` bytes
    fn start_receive(&mut self, wire_address: u8, len: usize) -> Result<(), I2cError>;

    /// Data from the last completed receive
    fn received(&self) -> &[u8];

    /// Check if a device acknowledges its address
    ///
    /// # Arguments
    /// * `trials` - Number of address attempts
    /// * `timeout_ms` - Timeout for each attempt
    fn is_device_ready(
        &mut self,
        wire_address: u8,
        trials: u32,
        timeout_ms: u32,
    ) -> Result<(), I2cError>;

    /// Blocking memory-addressed read
    fn mem_read(
        &mut self,
        wire_address: u8,
        mem_address: u16,
        width: MemAddressWidth,
        buf: &mut [u8],
        timeout_ms: u32,
    ) -> Result<(), I2cError>;

    /// Blocking memory-addressed write
    fn mem_write(
        &mut self,
        wire_address: u8,
        mem_address: u16,
        width: MemAddressWidth,
        data: &[u8],
        timeout_ms: u32,
    ) -> Result<(), I2cError>;
}
