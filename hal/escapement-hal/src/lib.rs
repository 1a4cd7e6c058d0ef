//! Escapement Hardware Abstraction Layer
//!
//! This crate defines the I2C peripheral abstraction that chip-specific
//! HALs implement. The transaction core in `escapement-core` only ever talks
//! to the bus through these traits.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │  Storage, keypad, Trinamic bridge         │
//! └───────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌───────────────────────────────────────────┐
//! │  escapement-core (BusController)          │
//! └───────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌───────────────────────────────────────────┐
//! │  escapement-hal (this crate - traits)     │
//! └───────────────────────────────────────────┘
//!                     │
//!                     ▼
//!            chip-specific peripheral
//! ```
//!
//! # Traits
//!
//! - [`i2c::I2cPeripheral`] - Interrupt-driven I2C master
//! - [`config::PinRegistry`] - Platform pin bookkeeping
//!
//! With the `sim` feature, [`sim::SimBus`] and [`sim::SimDelay`] provide a
//! host-side peripheral for tests.

#![no_std]
#![deny(unsafe_code)]

pub mod config;
pub mod i2c;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

// Re-export key types at crate root for convenience
pub use config::{I2cConfig, I2cPort, PeriphPin, PinRegistry};
pub use i2c::{wire_address, BusState, I2cError, I2cPeripheral, MemAddressWidth};
