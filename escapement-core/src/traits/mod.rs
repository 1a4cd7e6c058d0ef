//! Driver-facing traits
//!
//! These traits define the interface between register-level stepper driver
//! logic and the transports that carry it.

pub mod tmc;

pub use tmc::{
    TmcAddress, TmcAddressMap, TmcDatagram, TmcRegisterIo, TmcStatus, UNSUPPORTED_REGISTER,
};
