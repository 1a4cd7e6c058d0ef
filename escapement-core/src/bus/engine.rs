//! Transaction engine
//!
//! Addressed transmit/receive, the probe, and the blocking
//! memory-addressed primitives the register protocols are built on.
//! Callers always pass 7-bit addresses; the shift into the framing byte
//! happens here.

use embassy_sync::blocking_mutex::raw::RawMutex;
use escapement_hal::{wire_address, I2cError, I2cPeripheral, MemAddressWidth};

use super::BusController;
use crate::error::TransferError;

/// Address attempts made by [`BusController::probe`]
pub const PROBE_TRIALS: u32 = 4;

/// Timeout per probe attempt in milliseconds
pub const PROBE_TIMEOUT_MS: u32 = 10;

impl<M: RawMutex, P: I2cPeripheral> BusController<M, P> {
    /// Check if a device answers at `address`
    ///
    /// Returns `false` if the wait for the bus is abandoned.
    pub fn probe(&self, address: u8) -> bool {
        if self.await_idle().is_err() {
            return false;
        }

        let found = self
            .with_peripheral(|p| {
                p.is_device_ready(wire_address(address), PROBE_TRIALS, PROBE_TIMEOUT_MS)
            })
            .is_ok();

        if !found {
            debug!("no device at {=u8:#x}", address);
        }
        found
    }

    /// Transmit `data` to `address`
    ///
    /// With `block` set, returns once the transfer has completed, otherwise
    /// as soon as it has started.
    pub fn send(&self, address: u8, data: &[u8], block: bool) -> Result<(), TransferError> {
        self.await_idle()?;

        self.with_peripheral(|p| p.start_transmit(wire_address(address), data))
            .map_err(|e| Self::start_failed(address, e))?;

        if block {
            self.await_idle()?;
        }
        Ok(())
    }

    /// Receive `buf.len()` bytes from `address`
    ///
    /// With `block` set, `buf` is filled before returning. Otherwise the
    /// call returns once the receive has started and the data is collected
    /// with [`take_received`](Self::take_received) after the bus is idle again.
    pub fn receive(&self, address: u8, buf: &mut [u8], block: bool) -> Result<(), TransferError> {
        self.await_idle()?;

        self.with_peripheral(|p| p.start_receive(wire_address(address), buf.len()))
            .map_err(|e| Self::start_failed(address, e))?;

        if block {
            self.await_idle()?;
            self.take_received(buf);
        }
        Ok(())
    }

    /// Copy the data of the last completed receive into `buf`
    ///
    /// Returns the number of bytes copied.
    pub fn take_received(&self, buf: &mut [u8]) -> usize {
        self.with_peripheral(|p| {
            let data = p.received();
            let len = data.len().min(buf.len());
            buf[..len].copy_from_slice(&data[..len]);
            len
        })
    }

    /// Blocking memory-addressed read
    ///
    /// Does not wait for the bus; the caller decides how to wait.
    pub fn mem_read(
        &self,
        address: u8,
        mem_address: u16,
        width: MemAddressWidth,
        buf: &mut [u8],
        timeout_ms: u32,
    ) -> Result<(), I2cError> {
        self.with_peripheral(|p| {
            p.mem_read(wire_address(address), mem_address, width, buf, timeout_ms)
        })
    }

    /// Blocking memory-addressed write
    ///
    /// Does not wait for the bus; the caller decides how to wait.
    pub fn mem_write(
        &self,
        address: u8,
        mem_address: u16,
        width: MemAddressWidth,
        data: &[u8],
        timeout_ms: u32,
    ) -> Result<(), I2cError> {
        self.with_peripheral(|p| {
            p.mem_write(wire_address(address), mem_address, width, data, timeout_ms)
        })
    }

    fn start_failed(address: u8, e: I2cError) -> TransferError {
        debug!("transfer to {=u8:#x} not started: {:?}", address, e);
        TransferError::Start(e)
    }
}
