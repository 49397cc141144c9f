//! Shared mock collaborators for the unit tests.
//!
//! The script-driven serial mock answers AT commands the way the module
//! firmware would: a scripted response is injected into the receive
//! stream the moment the transmitted bytes end with the expected command.
//! The clock advances a fixed step per reading so every deadline loop
//! terminates, and accounts busy-wait delays separately so tests can
//! assert the settling delay was observed.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;

use crate::hal::{InterruptController, Monotonic, SerialConfig, SerialPort};

#[derive(Default)]
struct SerialState {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    script: VecDeque<(Vec<u8>, Vec<u8>)>,
    configured: Option<SerialConfig>,
}

/// A mock UART with shared handles: the stack owns one handle, the test
/// keeps another to feed bytes and inspect traffic.
#[derive(Clone, Default)]
pub struct SharedSerial(Rc<RefCell<SerialState>>);

impl SharedSerial {
    pub fn new() -> Self {
        Self::default()
    }

    /// Another handle to the same port.
    pub fn handle(&self) -> Self {
        self.clone()
    }

    /// Makes `bytes` available on the receive side.
    pub fn feed(&self, bytes: &[u8]) {
        self.0.borrow_mut().rx.extend(bytes.iter().copied());
    }

    /// Scripts a response: once the transmitted bytes end with `cmd`,
    /// `response` appears on the receive side. Scripts fire in order.
    pub fn expect(&self, cmd: &[u8], response: &[u8]) {
        self.0
            .borrow_mut()
            .script
            .push_back((cmd.to_vec(), response.to_vec()));
    }

    /// Everything transmitted so far.
    pub fn written(&self) -> Vec<u8> {
        self.0.borrow().tx.clone()
    }

    /// Forgets transmitted bytes (script matching restarts clean too).
    pub fn clear_written(&self) {
        self.0.borrow_mut().tx.clear();
    }

    /// The line settings the stack applied, if any.
    pub fn configured(&self) -> Option<SerialConfig> {
        self.0.borrow().configured
    }
}

impl SerialPort for SharedSerial {
    type Error = core::convert::Infallible;

    fn configure(&mut self, config: &SerialConfig) {
        self.0.borrow_mut().configured = Some(*config);
    }

    fn write(&mut self, byte: u8) -> nb::Result<(), Self::Error> {
        let mut state = self.0.borrow_mut();
        state.tx.push(byte);
        let fire = match state.script.front() {
            Some((cmd, _)) => state.tx.ends_with(cmd),
            None => false,
        };
        if fire {
            let (_, response) = state.script.pop_front().unwrap();
            state.rx.extend(response);
        }
        Ok(())
    }

    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        self.0
            .borrow_mut()
            .rx
            .pop_front()
            .ok_or(nb::Error::WouldBlock)
    }
}

struct ClockState {
    t_us: u64,
    step_us: u64,
    delayed_ns: u64,
}

/// A mock monotonic clock with shared handles.
///
/// Each reading advances time by a fixed step so bounded busy-wait loops
/// run to their deadlines; busy-wait delays advance time by the full
/// requested amount and are accounted separately.
#[derive(Clone)]
pub struct SharedClock(Rc<RefCell<ClockState>>);

impl SharedClock {
    pub fn new(step_us: u64) -> Self {
        Self(Rc::new(RefCell::new(ClockState {
            t_us: 0,
            step_us,
            delayed_ns: 0,
        })))
    }

    /// Another handle to the same clock.
    pub fn handle(&self) -> Self {
        self.clone()
    }

    /// Jumps time forward.
    pub fn advance_us(&self, us: u64) {
        self.0.borrow_mut().t_us += us;
    }

    /// Total milliseconds spent in busy-wait delays.
    pub fn delayed_ms(&self) -> u64 {
        self.0.borrow().delayed_ns / 1_000_000
    }
}

impl Monotonic for SharedClock {
    fn now_us(&mut self) -> u64 {
        let mut state = self.0.borrow_mut();
        let t = state.t_us;
        state.t_us += state.step_us;
        t
    }
}

impl DelayNs for SharedClock {
    fn delay_ns(&mut self, ns: u32) {
        let mut state = self.0.borrow_mut();
        state.t_us += u64::from(ns) / 1_000;
        state.delayed_ns += u64::from(ns);
    }
}

/// A mock interrupt controller counting the calls it receives.
#[derive(Debug, Default)]
pub struct MockIrq {
    pub cleared: u32,
    pub enabled: u32,
}

impl InterruptController for MockIrq {
    fn clear_pending(&mut self) {
        self.cleared += 1;
    }

    fn enable_source(&mut self) {
        self.enabled += 1;
    }
}
