//! Bus configuration and pin descriptors
//!
//! Resolved once at startup. The presets mirror the board pin maps for each
//! I2C instance; boards with a different routing build the struct directly.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default TIMINGR value (100 kHz from a 54 MHz kernel clock)
pub const DEFAULT_TIMING: u32 = 0x2030_3E5D;

/// Alternate function routing the I2C instances to their pins
pub const I2C_ALTERNATE_FUNCTION: u8 = 4;

/// I2C peripheral instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum I2cPort {
    I2c1,
    I2c2,
    I2c3,
    I2c4,
}

/// GPIO port holding the bus pins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum GpioPort {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
}

/// I2C bus configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct I2cConfig {
    /// Peripheral instance
    pub port: I2cPort,
    /// GPIO port of SCL and SDA
    pub gpio: GpioPort,
    /// SCL pin number
    pub scl_pin: u8,
    /// SDA pin number
    pub sda_pin: u8,
    /// Alternate function code for both pins
    pub alternate_function: u8,
    /// Use the fast-mode (400 kHz) peripheral
    pub fast_mode: bool,
    /// Raw timing register value
    pub timing: u32,
}

impl Default for I2cConfig {
    fn default() -> Self {
        Self::for_port(I2cPort::I2c1)
    }
}

impl I2cConfig {
    /// Standard mode (100 kHz)
    pub const STANDARD_HZ: u32 = 100_000;

    /// Fast mode (400 kHz)
    pub const FAST_HZ: u32 = 400_000;

    /// Board pin map for an I2C instance
    pub const fn for_port(port: I2cPort) -> Self {
        let (gpio, scl_pin, sda_pin) = match port {
            I2cPort::I2c1 => (GpioPort::B, 8, 9),
            I2cPort::I2c2 => (GpioPort::B, 10, 11),
            I2cPort::I2c3 => (GpioPort::H, 7, 8),
            I2cPort::I2c4 => (GpioPort::D, 12, 13),
        };

        Self {
            port,
            gpio,
            scl_pin,
            sda_pin,
            alternate_function: I2C_ALTERNATE_FUNCTION,
            fast_mode: false,
            timing: DEFAULT_TIMING,
        }
    }

    /// Use the alternate I2C1 routing (PB6/PB7)
    ///
    /// Has no effect on the other instances.
    pub const fn alt_pinmap(mut self) -> Self {
        if matches!(self.port, I2cPort::I2c1) {
            self.scl_pin = 6;
            self.sda_pin = 7;
        }
        self
    }

    /// Select fast mode
    pub const fn with_fast_mode(mut self, fast_mode: bool) -> Self {
        self.fast_mode = fast_mode;
        self
    }

    /// Nominal SCL frequency in Hz
    pub const fn frequency(&self) -> u32 {
        if self.fast_mode {
            Self::FAST_HZ
        } else {
            Self::STANDARD_HZ
        }
    }

    /// Pin descriptors for SCL and SDA, in that order
    pub const fn pins(&self) -> [PeriphPin; 2] {
        [
            PeriphPin {
                function: PinFunction::Scl,
                group: PinGroup::I2c,
                port: self.gpio,
                pin: self.scl_pin,
                open_drain: true,
            },
            PeriphPin {
                function: PinFunction::Sda,
                group: PinGroup::I2c,
                port: self.gpio,
                pin: self.sda_pin,
                open_drain: true,
            },
        ]
    }
}

/// Function of a peripheral pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinFunction {
    /// Clock output
    Scl,
    /// Bidirectional data
    Sda,
}

/// Pin group for the platform registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinGroup {
    I2c,
}

/// Pin claimed by a peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeriphPin {
    pub function: PinFunction,
    pub group: PinGroup,
    pub port: GpioPort,
    pub pin: u8,
    pub open_drain: bool,
}

/// Platform registry of pins claimed by peripherals
///
/// Used for reporting only; registering a pin does not configure it.
pub trait PinRegistry {
    fn register_pin(&mut self, pin: &PeriphPin);
}
