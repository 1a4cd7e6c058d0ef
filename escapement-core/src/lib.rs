//! Single-bus I2C transaction core
//!
//! This crate owns the one I2C master peripheral of the board and serializes
//! access to it for every bus client:
//!
//! - Bus state tracking and the abortable wait ([`BusController::wait_ready`])
//! - Addressed transmit/receive and device probing
//! - Interrupt-driven keycode reads for an I2C keypad
//! - Blocking memory-addressed primitives used by the storage and Trinamic
//!   register protocols in `escapement-drivers`
//! - Trinamic register traits shared by stepper drivers and their transports
//!
//! The controller is created once at startup and handed to every consumer by
//! reference; nothing here is a global.

#![no_std]
#![deny(unsafe_code)]

#[macro_use]
mod fmt;

pub mod bus;
pub mod error;
pub mod keypad;
pub mod traits;

pub use bus::{AliveFn, BusController};
pub use error::TransferError;
pub use keypad::{Completion, KeycodeCallback};
