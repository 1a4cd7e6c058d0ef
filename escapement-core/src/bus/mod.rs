//! Shared bus controller
//!
//! [`BusController`] is the sole owner of the I2C peripheral. Every consumer
//! (storage, keypad, Trinamic bridge) holds a shared reference to the one
//! controller created at startup, and the interrupt handlers reach it the
//! same way.
//!
//! Only one transaction may be in flight at a time. Nothing is queued: a
//! caller that starts a non-blocking transfer must not start another one
//! before it knows the first has finished.
//!
//! # Waiting
//!
//! There are two ways the controller waits for the bus:
//!
//! - [`wait_ready`](BusController::wait_ready) polls the peripheral state and
//!   calls a liveness callback on every iteration. The callback is where the
//!   rest of the firmware gets serviced; returning `false` abandons the wait.
//!   Pending keycode completions are dispatched on each iteration as well.
//! - Storage transfers spin on [`is_ready`](BusController::is_ready) without
//!   any way out.

mod engine;
mod tracker;

use core::cell::{Cell, RefCell};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use escapement_hal::{I2cConfig, I2cPeripheral, PinRegistry};

use crate::keypad::KeycodeSlot;

pub use engine::{PROBE_TIMEOUT_MS, PROBE_TRIALS};

/// Liveness callback consulted by abortable waits
///
/// Returns `false` when the caller must stop waiting.
pub type AliveFn = fn() -> bool;

/// Owner of the single I2C bus
///
/// `M` must be usable from the context the interrupt hooks run in; on a
/// single-core MCU that is `CriticalSectionRawMutex`. The peripheral lock is
/// held for the whole of every call into the peripheral, and the blocking
/// memory-addressed transfers run for up to their timeout (100 ms for
/// storage and the Trinamic bridge). With a critical-section mutex,
/// interrupts stay masked for that long. Interrupt-driven transfers only
/// hold it while starting.
pub struct BusController<M: RawMutex, P> {
    peripheral: Mutex<M, RefCell<P>>,
    config: I2cConfig,
    initialized: Mutex<M, Cell<bool>>,
    alive: AliveFn,
    pub(crate) keypad: KeycodeSlot<M>,
}

impl<M: RawMutex, P: I2cPeripheral> BusController<M, P> {
    /// Create the controller
    ///
    /// The peripheral is not touched until [`init`](Self::init).
    pub const fn new(peripheral: P, config: I2cConfig, alive: AliveFn) -> Self {
        Self {
            peripheral: Mutex::new(RefCell::new(peripheral)),
            config,
            initialized: Mutex::new(Cell::new(false)),
            alive,
            keypad: KeycodeSlot::new(),
        }
    }

    /// Initialize the peripheral and announce the bus pins
    ///
    /// Only the first call has any effect.
    pub fn init(&self, pins: &mut impl PinRegistry) {
        if self.initialized.lock(|done| done.replace(true)) {
            return;
        }

        self.with_peripheral(|p| p.init(&self.config));
        for pin in self.config.pins().iter() {
            pins.register_pin(pin);
        }

        debug!(
            "I2C bus up: SCL {}, SDA {}, {} Hz",
            self.config.scl_pin,
            self.config.sda_pin,
            self.config.frequency()
        );
    }

    /// Check if [`init`](Self::init) has run
    pub fn is_initialized(&self) -> bool {
        self.initialized.lock(|done| done.get())
    }

    /// Bus configuration
    pub fn config(&self) -> &I2cConfig {
        &self.config
    }

    /// Run `f` with exclusive access to the peripheral
    ///
    /// Interrupt handlers use this to drive the peripheral's own state
    /// machine before reporting completion. The lock is held until `f`
    /// returns, so `f` must not block longer than interrupts may be held
    /// off.
    pub fn with_peripheral<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        self.peripheral.lock(|cell| f(&mut cell.borrow_mut()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use escapement_hal::config::{PeriphPin, PinFunction};
    use escapement_hal::sim::SimBus;

    pub(crate) type TestBus = BusController<NoopRawMutex, SimBus>;

    pub(crate) fn keep_waiting() -> bool {
        true
    }

    pub(crate) fn controller(sim: SimBus) -> TestBus {
        BusController::new(sim, I2cConfig::default(), keep_waiting)
    }

    #[derive(Default)]
    struct Pins {
        registered: [Option<PeriphPin>; 4],
        count: usize,
    }

    impl PinRegistry for Pins {
        fn register_pin(&mut self, pin: &PeriphPin) {
            if self.count < self.registered.len() {
                self.registered[self.count] = Some(*pin);
            }
            self.count += 1;
        }
    }

    #[test]
    fn test_init_is_idempotent() {
        let bus = controller(SimBus::new());
        let mut pins = Pins::default();

        assert!(!bus.is_initialized());
        assert!(!bus.is_ready());

        bus.init(&mut pins);
        bus.init(&mut pins);

        assert!(bus.is_initialized());
        assert!(bus.is_ready());
        assert_eq!(bus.with_peripheral(|sim| sim.init_count()), 1);
        assert_eq!(pins.count, 2);
    }

    #[test]
    fn test_init_registers_scl_and_sda() {
        let bus = controller(SimBus::new());
        let mut pins = Pins::default();
        bus.init(&mut pins);

        let scl = pins.registered[0].unwrap();
        let sda = pins.registered[1].unwrap();
        assert_eq!(scl.function, PinFunction::Scl);
        assert_eq!(scl.pin, bus.config().scl_pin);
        assert_eq!(sda.function, PinFunction::Sda);
        assert_eq!(sda.pin, bus.config().sda_pin);
    }
}
