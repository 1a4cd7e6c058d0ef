//! Simulated I2C peripheral for host tests
//!
//! [`SimBus`] behaves like an interrupt-driven peripheral: a started
//! transfer keeps the bus busy for a configurable number of state polls,
//! then drops back to ready. Devices are plain memory arrays with an
//! optional queue of bytes returned by interrupt-driven receives.
//! Every transfer is recorded in a frame log.

use core::cell::Cell;

use embedded_hal::delay::DelayNs;
use heapless::{Deque, Vec};

use crate::config::I2cConfig;
use crate::i2c::{BusState, I2cError, I2cPeripheral, MemAddressWidth};

/// Memory size of each simulated device
pub const SIM_MEMORY_SIZE: usize = 2048;

/// Maximum number of simulated devices
pub const MAX_SIM_DEVICES: usize = 4;

/// Maximum number of logged frames
pub const MAX_SIM_FRAMES: usize = 32;

/// Maximum logged payload per frame
pub const MAX_FRAME_DATA: usize = 64;

/// Kind of a logged transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Transmit,
    Receive,
    MemRead,
    MemWrite,
}

/// A transfer seen by the simulated peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimFrame {
    pub kind: FrameKind,
    pub wire_address: u8,
    pub mem_address: Option<u16>,
    pub width: Option<MemAddressWidth>,
    /// Bytes written, or number of bytes requested for reads
    pub data: Vec<u8, MAX_FRAME_DATA>,
    pub len: usize,
}

/// A simulated target device
pub struct SimDevice {
    address: u8,
    memory: [u8; SIM_MEMORY_SIZE],
    rx_queue: Deque<u8, 16>,
}

impl SimDevice {
    fn new(address: u8) -> Self {
        Self {
            address,
            memory: [0; SIM_MEMORY_SIZE],
            rx_queue: Deque::new(),
        }
    }

    fn index(mem_address: u16, width: MemAddressWidth, offset: usize) -> usize {
        let base = match width {
            MemAddressWidth::OneByte => (mem_address & 0xFF) as usize,
            MemAddressWidth::TwoBytes => mem_address as usize,
        };
        (base + offset) % SIM_MEMORY_SIZE
    }
}

/// Simulated interrupt-driven I2C peripheral
pub struct SimBus {
    state: Cell<BusState>,
    busy_polls: Cell<u32>,
    transfer_polls: u32,
    start_error: Option<I2cError>,
    ack_latency_ms: u32,
    devices: Vec<SimDevice, MAX_SIM_DEVICES>,
    rx: Vec<u8, MAX_FRAME_DATA>,
    frames: Vec<SimFrame, MAX_SIM_FRAMES>,
    init_count: u32,
    probe_attempts: u32,
    last_probe: Option<(u8, u32, u32)>,
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBus {
    /// Create a bus in the reset state with no devices
    pub fn new() -> Self {
        Self {
            state: Cell::new(BusState::Reset),
            busy_polls: Cell::new(0),
            transfer_polls: 0,
            start_error: None,
            ack_latency_ms: 0,
            devices: Vec::new(),
            rx: Vec::new(),
            frames: Vec::new(),
            init_count: 0,
            probe_attempts: 0,
            last_probe: None,
        }
    }

    /// Create a ready bus, as if already initialized
    pub fn ready() -> Self {
        let bus = Self::new();
        bus.state.set(BusState::Ready);
        bus
    }

    /// Attach a device at a 7-bit address
    pub fn add_device(&mut self, address: u8) -> &mut Self {
        if self.device_mut(address).is_none() {
            let _ = self.devices.push(SimDevice::new(address));
        }
        self
    }

    /// Number of state polls an interrupt-driven transfer stays busy
    pub fn set_transfer_polls(&mut self, polls: u32) {
        self.transfer_polls = polls;
    }

    /// Make the next transfer starts fail with `error` (None clears)
    pub fn set_start_error(&mut self, error: Option<I2cError>) {
        self.start_error = error;
    }

    /// Time a device takes to acknowledge a memory-addressed transfer
    pub fn set_ack_latency_ms(&mut self, latency_ms: u32) {
        self.ack_latency_ms = latency_ms;
    }

    /// Occupy the bus for `polls` state reads, as if another transfer were in flight
    pub fn hold_busy(&self, polls: u32) {
        self.state.set(BusState::BusyTx);
        self.busy_polls.set(polls);
    }

    /// Finish any in-flight transfer immediately
    pub fn complete(&self) {
        self.busy_polls.set(0);
        if matches!(self.state.get(), BusState::BusyTx | BusState::BusyRx) {
            self.state.set(BusState::Ready);
        }
    }

    /// Queue bytes returned by interrupt-driven receives from a device
    pub fn queue_rx(&mut self, address: u8, bytes: &[u8]) {
        if let Some(dev) = self.device_mut(address) {
            for &b in bytes {
                let _ = dev.rx_queue.push_back(b);
            }
        }
    }

    /// Preload device memory
    pub fn load_memory(&mut self, address: u8, mem_address: usize, bytes: &[u8]) {
        if let Some(dev) = self.device_mut(address) {
            for (i, &b) in bytes.iter().enumerate() {
                dev.memory[(mem_address + i) % SIM_MEMORY_SIZE] = b;
            }
        }
    }

    /// Device memory contents
    pub fn memory(&self, address: u8) -> Option<&[u8]> {
        self.devices
            .iter()
            .find(|d| d.address == address)
            .map(|d| &d.memory[..])
    }

    /// Logged frames, oldest first
    pub fn frames(&self) -> &[SimFrame] {
        &self.frames
    }

    /// Most recent logged frame
    pub fn last_frame(&self) -> Option<&SimFrame> {
        self.frames.last()
    }

    /// Number of `init` calls
    pub fn init_count(&self) -> u32 {
        self.init_count
    }

    /// Number of address-acknowledge checks
    pub fn probe_attempts(&self) -> u32 {
        self.probe_attempts
    }

    /// Arguments of the last address-acknowledge check
    pub fn last_probe(&self) -> Option<(u8, u32, u32)> {
        self.last_probe
    }

    fn device_mut(&mut self, address: u8) -> Option<&mut SimDevice> {
        self.devices.iter_mut().find(|d| d.address == address)
    }

    fn has_device(&self, wire_address: u8) -> bool {
        self.devices.iter().any(|d| d.address == wire_address >> 1)
    }

    fn log(&mut self, frame: SimFrame) {
        if self.frames.is_full() {
            self.frames.remove(0);
        }
        let _ = self.frames.push(frame);
    }

    fn frame(
        kind: FrameKind,
        wire_address: u8,
        mem: Option<(u16, MemAddressWidth)>,
        data: &[u8],
        len: usize,
    ) -> SimFrame {
        let mut logged = Vec::new();
        let _ = logged.extend_from_slice(&data[..data.len().min(MAX_FRAME_DATA)]);
        SimFrame {
            kind,
            wire_address,
            mem_address: mem.map(|(a, _)| a),
            width: mem.map(|(_, w)| w),
            data: logged,
            len,
        }
    }

    fn start(&mut self, state: BusState) -> Result<(), I2cError> {
        if let Some(err) = self.start_error {
            return Err(err);
        }
        if self.state.get() != BusState::Ready {
            return Err(I2cError::Busy);
        }
        if self.transfer_polls > 0 {
            self.state.set(state);
            self.busy_polls.set(self.transfer_polls);
        }
        Ok(())
    }

    fn check_blocking(&self, wire_address: u8, timeout_ms: u32) -> Result<(), I2cError> {
        if self.state.get() != BusState::Ready {
            return Err(I2cError::Busy);
        }
        if !self.has_device(wire_address) {
            return Err(I2cError::Nack);
        }
        if self.ack_latency_ms > timeout_ms {
            return Err(I2cError::Timeout);
        }
        Ok(())
    }
}

impl I2cPeripheral for SimBus {
    fn init(&mut self, _config: &I2cConfig) {
        self.init_count += 1;
        self.state.set(BusState::Ready);
    }

    fn state(&self) -> BusState {
        let state = self.state.get();
        if matches!(state, BusState::BusyTx | BusState::BusyRx) {
            let polls = self.busy_polls.get();
            if polls == 0 {
                self.state.set(BusState::Ready);
                return BusState::Ready;
            }
            self.busy_polls.set(polls - 1);
        }
        state
    }

    fn start_transmit(&mut self, wire_address: u8, data: &[u8]) -> Result<(), I2cError> {
        self.start(BusState::BusyTx)?;
        let frame = Self::frame(FrameKind::Transmit, wire_address, None, data, data.len());
        self.log(frame);
        Ok(())
    }

    fn start_receive(&mut self, wire_address: u8, len: usize) -> Result<(), I2cError> {
        self.start(BusState::BusyRx)?;

        self.rx.clear();
        let address = wire_address >> 1;
        for _ in 0..len.min(MAX_FRAME_DATA) {
            let byte = self
                .device_mut(address)
                .and_then(|d| d.rx_queue.pop_front())
                .unwrap_or(0);
            let _ = self.rx.push(byte);
        }

        let frame = Self::frame(FrameKind::Receive, wire_address, None, &[], len);
        self.log(frame);
        Ok(())
    }

    fn received(&self) -> &[u8] {
        &self.rx
    }

    fn is_device_ready(
        &mut self,
        wire_address: u8,
        trials: u32,
        timeout_ms: u32,
    ) -> Result<(), I2cError> {
        self.probe_attempts += 1;
        self.last_probe = Some((wire_address, trials, timeout_ms));
        if self.state.get() != BusState::Ready {
            return Err(I2cError::Busy);
        }
        if self.has_device(wire_address) {
            Ok(())
        } else {
            Err(I2cError::Nack)
        }
    }

    fn mem_read(
        &mut self,
        wire_address: u8,
        mem_address: u16,
        width: MemAddressWidth,
        buf: &mut [u8],
        timeout_ms: u32,
    ) -> Result<(), I2cError> {
        let frame = Self::frame(
            FrameKind::MemRead,
            wire_address,
            Some((mem_address, width)),
            &[],
            buf.len(),
        );
        self.log(frame);
        self.check_blocking(wire_address, timeout_ms)?;

        if let Some(dev) = self.device_mut(wire_address >> 1) {
            for (i, b) in buf.iter_mut().enumerate() {
                *b = dev.memory[SimDevice::index(mem_address, width, i)];
            }
        }
        Ok(())
    }

    fn mem_write(
        &mut self,
        wire_address: u8,
        mem_address: u16,
        width: MemAddressWidth,
        data: &[u8],
        timeout_ms: u32,
    ) -> Result<(), I2cError> {
        let frame = Self::frame(
            FrameKind::MemWrite,
            wire_address,
            Some((mem_address, width)),
            data,
            data.len(),
        );
        self.log(frame);
        self.check_blocking(wire_address, timeout_ms)?;

        if let Some(dev) = self.device_mut(wire_address >> 1) {
            for (i, &b) in data.iter().enumerate() {
                dev.memory[SimDevice::index(mem_address, width, i)] = b;
            }
        }
        Ok(())
    }
}

/// Delay that only accumulates the requested time
#[derive(Debug, Default)]
pub struct SimDelay {
    elapsed_ns: u64,
}

impl SimDelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total requested delay in milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ns / 1_000_000
    }
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += u64::from(ns);
    }
}
