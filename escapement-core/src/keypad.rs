//! Keycode reader
//!
//! A keypad on the bus is read one byte at a time. [`BusController::request_keycode`]
//! arms a single-slot request and starts an interrupt-driven 1-byte receive.
//! The receive-complete interrupt calls [`BusController::on_receive_complete`],
//! which only posts a completion event. The registered callback runs later,
//! outside interrupt context, when the event is drained by
//! [`BusController::dispatch_keycode`] (also done on every iteration of
//! [`BusController::wait_ready`]).
//!
//! A zero byte means "no key": it does not fire the callback and the request
//! stays pending until a non-zero byte arrives or a new request replaces it.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use escapement_hal::{wire_address, I2cPeripheral};

use crate::bus::BusController;
use crate::error::TransferError;

/// Called with a non-zero keycode, at most once per request
pub type KeycodeCallback = fn(u8);

/// Completion event posted from the interrupt path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Completion {
    /// Keycode slot contents when the receive finished
    pub code: u8,
    /// Transfer finished without a bus error
    pub ok: bool,
}

#[derive(Clone, Copy)]
struct Request {
    callback: Option<KeycodeCallback>,
    code: u8,
    // Next receive completion fills `code`
    armed: bool,
}

impl Request {
    const IDLE: Self = Self {
        callback: None,
        code: 0,
        armed: false,
    };
}

/// Single outstanding keycode request plus its completion handoff
pub(crate) struct KeycodeSlot<M: RawMutex> {
    request: Mutex<M, Cell<Request>>,
    completions: Signal<M, Completion>,
}

impl<M: RawMutex> KeycodeSlot<M> {
    pub(crate) const fn new() -> Self {
        Self {
            request: Mutex::new(Cell::new(Request::IDLE)),
            completions: Signal::new(),
        }
    }

    fn update<R>(&self, f: impl FnOnce(&mut Request) -> R) -> R {
        self.request.lock(|cell| {
            let mut request = cell.get();
            let result = f(&mut request);
            cell.set(request);
            result
        })
    }
}

impl<M: RawMutex, P: I2cPeripheral> BusController<M, P> {
    /// Request one keycode from the keypad at `address`
    ///
    /// Replaces any pending request. A completion already posted for the
    /// previous request is delivered to the previous callback first. Does
    /// not wait for the bus: if another transfer is in flight the receive is
    /// refused and the error returned, but the callback stays registered.
    pub fn request_keycode(
        &self,
        address: u8,
        callback: KeycodeCallback,
    ) -> Result<(), TransferError> {
        self.dispatch_keycode();

        self.keypad.update(|request| {
            *request = Request {
                callback: Some(callback),
                code: 0,
                armed: true,
            }
        });

        self.with_peripheral(|p| p.start_receive(wire_address(address), 1))
            .map_err(|e| {
                self.keypad.update(|request| request.armed = false);
                debug!("keycode request to {=u8:#x} not started: {:?}", address, e);
                TransferError::Start(e)
            })
    }

    /// Receive-complete interrupt hook
    ///
    /// Must be called after every completed interrupt-driven receive.
    pub fn on_receive_complete(&self) {
        let byte = self.with_peripheral(|p| p.received().first().copied());

        let code = self.keypad.update(|request| {
            if request.armed {
                request.code = byte.unwrap_or(0);
                request.armed = false;
            }
            request.code
        });

        self.keypad.completions.signal(Completion { code, ok: true });
    }

    /// Transfer-error interrupt hook
    ///
    /// A failed transfer never fires the keycode callback.
    pub fn on_transfer_error(&self) {
        self.keypad.update(|request| request.armed = false);
        self.keypad
            .completions
            .signal(Completion { code: 0, ok: false });
    }

    /// Deliver a posted completion to the pending keycode callback
    ///
    /// Returns `true` if the callback was invoked.
    pub fn dispatch_keycode(&self) -> bool {
        let Some(done) = self.keypad.completions.try_take() else {
            return false;
        };

        if !done.ok {
            trace!("keycode receive failed");
            return false;
        }

        let callback = self.keypad.update(|request| match request.callback {
            Some(callback) if done.code != 0 => {
                request.callback = None;
                Some(callback)
            }
            _ => None,
        });

        match callback {
            Some(callback) => {
                callback(done.code);
                true
            }
            None => false,
        }
    }

    /// Check if a keycode callback is still waiting for a key
    pub fn keycode_pending(&self) -> bool {
        self.keypad.update(|request| request.callback.is_some())
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use core::cell::RefCell;
    use std::vec::Vec;

    use crate::bus::tests::controller;
    use crate::error::TransferError;
    use escapement_hal::sim::SimBus;
    use escapement_hal::I2cError;

    const KEYPAD: u8 = 0x49;

    std::thread_local! {
        static FIRST: RefCell<Vec<u8>> = const { RefCell::new(Vec::new()) };
        static SECOND: RefCell<Vec<u8>> = const { RefCell::new(Vec::new()) };
    }

    fn first(code: u8) {
        FIRST.with(|keys| keys.borrow_mut().push(code));
    }

    fn second(code: u8) {
        SECOND.with(|keys| keys.borrow_mut().push(code));
    }

    fn first_keys() -> Vec<u8> {
        FIRST.with(|keys| keys.borrow().clone())
    }

    fn second_keys() -> Vec<u8> {
        SECOND.with(|keys| keys.borrow().clone())
    }

    fn keypad_bus(keys: &[u8]) -> crate::bus::tests::TestBus {
        let mut sim = SimBus::ready();
        sim.add_device(KEYPAD);
        sim.queue_rx(KEYPAD, keys);
        sim.set_transfer_polls(1);
        controller(sim)
    }

    #[test]
    fn test_keycode_fires_once() {
        let bus = keypad_bus(&[b'A']);

        bus.request_keycode(KEYPAD, first).unwrap();
        assert!(bus.keycode_pending());

        let frame = bus.with_peripheral(|sim| sim.last_frame().cloned()).unwrap();
        assert_eq!(frame.wire_address, KEYPAD << 1);
        assert_eq!(frame.len, 1);

        // Interrupt posts the completion, callback runs on drain
        bus.with_peripheral(|sim| sim.complete());
        bus.on_receive_complete();
        assert!(first_keys().is_empty());

        assert!(bus.dispatch_keycode());
        assert_eq!(first_keys(), [b'A']);
        assert!(!bus.keycode_pending());

        // Unrelated completion, no new request
        bus.on_receive_complete();
        assert!(!bus.dispatch_keycode());
        assert_eq!(first_keys(), [b'A']);
    }

    #[test]
    fn test_zero_keycode_keeps_request_pending() {
        let bus = keypad_bus(&[0x00]);

        bus.request_keycode(KEYPAD, first).unwrap();
        bus.with_peripheral(|sim| sim.complete());
        bus.on_receive_complete();

        assert!(!bus.dispatch_keycode());
        assert!(first_keys().is_empty());
        assert!(bus.keycode_pending());
    }

    #[test]
    fn test_new_request_overwrites_pending_slot() {
        let bus = keypad_bus(&[0x00, b'7']);

        bus.request_keycode(KEYPAD, first).unwrap();
        bus.with_peripheral(|sim| sim.complete());
        bus.on_receive_complete();
        assert!(!bus.dispatch_keycode());

        bus.request_keycode(KEYPAD, second).unwrap();
        bus.with_peripheral(|sim| sim.complete());
        bus.on_receive_complete();
        assert!(bus.dispatch_keycode());

        assert!(first_keys().is_empty());
        assert_eq!(second_keys(), [b'7']);
    }

    #[test]
    fn test_rerequest_before_drain_delivers_to_first_callback() {
        let bus = keypad_bus(&[b'A', b'B']);

        bus.request_keycode(KEYPAD, first).unwrap();
        bus.with_peripheral(|sim| sim.complete());
        bus.on_receive_complete();

        // Main loop has not drained yet
        bus.request_keycode(KEYPAD, second).unwrap();
        assert_eq!(first_keys(), [b'A']);
        assert!(!bus.dispatch_keycode());

        bus.with_peripheral(|sim| sim.complete());
        bus.on_receive_complete();
        assert!(bus.dispatch_keycode());

        assert_eq!(first_keys(), [b'A']);
        assert_eq!(second_keys(), [b'B']);
    }

    #[test]
    fn test_wait_ready_drains_completions() {
        let bus = keypad_bus(&[b'5']);

        bus.request_keycode(KEYPAD, first).unwrap();
        bus.on_receive_complete();

        assert!(bus.wait_ready(|| true));
        assert_eq!(first_keys(), [b'5']);
    }

    #[test]
    fn test_failed_receive_does_not_fire() {
        let bus = keypad_bus(&[b'9']);

        bus.request_keycode(KEYPAD, first).unwrap();
        bus.with_peripheral(|sim| sim.complete());
        bus.on_transfer_error();

        assert!(!bus.dispatch_keycode());
        assert!(first_keys().is_empty());
        assert!(bus.keycode_pending());
    }

    #[test]
    fn test_request_while_busy_is_refused() {
        let bus = keypad_bus(&[b'1']);
        bus.with_peripheral(|sim| sim.hold_busy(10));

        assert_eq!(
            bus.request_keycode(KEYPAD, first),
            Err(TransferError::Start(I2cError::Busy))
        );
        assert!(bus.keycode_pending());

        // A completion of the in-flight transfer does not count as a key
        bus.with_peripheral(|sim| sim.complete());
        bus.on_receive_complete();
        assert!(!bus.dispatch_keycode());
        assert!(first_keys().is_empty());
    }
}
