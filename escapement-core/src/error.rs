//! Transaction errors

use escapement_hal::I2cError;

/// Why an engine operation did not go through
///
/// An aborted wait leaves the bus untouched by us, but its state is unknown:
/// another transfer may still be in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferError {
    /// The liveness callback stopped the wait for the bus
    Aborted,
    /// The peripheral refused to start the transfer
    Start(I2cError),
}

impl From<I2cError> for TransferError {
    fn from(e: I2cError) -> Self {
        TransferError::Start(e)
    }
}
