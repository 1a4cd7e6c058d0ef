//! I2C bus client implementations
//!
//! This crate provides the protocols that ride on the shared bus owned by
//! `escapement-core`:
//!
//! - Register-mapped storage transfers for EEPROM and FRAM ([`nvs`])
//! - Paged storage access on top of them ([`nvs::eeprom`])
//! - Trinamic register bridge over I2C ([`stepper::i2c_bridge`])
//! - TMC2130 stepper driver over any register transport ([`stepper::tmc2130`])

#![no_std]
#![deny(unsafe_code)]

#[macro_use]
mod fmt;

pub mod nvs;
pub mod stepper;
