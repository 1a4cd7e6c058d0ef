//! Trinamic stepper drivers

pub mod i2c_bridge;
pub mod tmc2130;

pub use i2c_bridge::{TmcI2cBridge, BRIDGE_TIMEOUT_MS, I2C_BRIDGE_ADDRESS};
pub use tmc2130::{DrvStatus, Tmc2130, Tmc2130Config, Tmc2130Error};
