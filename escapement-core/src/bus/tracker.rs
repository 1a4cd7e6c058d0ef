//! Bus readiness and the abortable wait

use embassy_sync::blocking_mutex::raw::RawMutex;
use escapement_hal::{BusState, I2cPeripheral};

use super::BusController;
use crate::error::TransferError;

impl<M: RawMutex, P: I2cPeripheral> BusController<M, P> {
    /// Current peripheral state
    pub fn state(&self) -> BusState {
        self.with_peripheral(|p| p.state())
    }

    /// Check if the bus is idle
    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Wait for the bus to become idle
    ///
    /// `alive` is called once per iteration while the bus is busy. Returns
    /// `false` as soon as it does, `true` once the bus is idle. Keycode
    /// completions are dispatched on every iteration.
    pub fn wait_ready(&self, mut alive: impl FnMut() -> bool) -> bool {
        loop {
            self.dispatch_keycode();

            if self.is_ready() {
                return true;
            }

            if !alive() {
                trace!("bus wait abandoned");
                return false;
            }
        }
    }

    /// [`wait_ready`](Self::wait_ready) with the controller's liveness callback
    pub(crate) fn await_idle(&self) -> Result<(), TransferError> {
        if self.wait_ready(self.alive) {
            Ok(())
        } else {
            Err(TransferError::Aborted)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::bus::tests::controller;
    use escapement_hal::sim::SimBus;
    use escapement_hal::BusState;
    use proptest::prelude::*;

    #[test]
    fn test_ready_when_idle() {
        let bus = controller(SimBus::ready());
        assert!(bus.is_ready());

        let mut calls = 0;
        assert!(bus.wait_ready(|| {
            calls += 1;
            true
        }));
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_not_ready_before_init() {
        let bus = controller(SimBus::new());
        assert_eq!(bus.state(), BusState::Reset);
        assert!(!bus.is_ready());
    }

    #[test]
    fn test_wait_calls_alive_while_busy() {
        let bus = controller(SimBus::ready());
        bus.with_peripheral(|sim| sim.hold_busy(3));

        let mut calls = 0;
        assert!(bus.wait_ready(|| {
            calls += 1;
            true
        }));
        assert_eq!(calls, 3);
        assert!(bus.is_ready());
    }

    #[test]
    fn test_wait_aborts_when_alive_says_stop() {
        let bus = controller(SimBus::ready());
        bus.with_peripheral(|sim| sim.hold_busy(100));

        let mut calls = 0;
        assert!(!bus.wait_ready(|| {
            calls += 1;
            calls < 2
        }));
        assert_eq!(calls, 2);
        assert!(!bus.is_ready());
    }

    proptest! {
        #[test]
        fn prop_wait_fails_only_if_alive_stops_first(busy in 0u32..20, stop_after in 1u32..20) {
            let bus = controller(SimBus::ready());
            bus.with_peripheral(|sim| sim.hold_busy(busy));

            let mut calls = 0;
            let ready = bus.wait_ready(|| {
                calls += 1;
                calls < stop_after
            });

            // `alive` runs once per busy poll; it stops on call `stop_after`
            prop_assert_eq!(ready, stop_after > busy);
        }
    }
}
