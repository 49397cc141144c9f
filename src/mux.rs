//! Framing layer: typed, multiplexed messages over the transport.
//!
//! [`MuxLink`] owns a [`BtModem`], the receive state machine, a table of
//! per-command handlers and an application context. Incoming bytes reach
//! it through the transport's trigger mechanism: at initialization the
//! link registers its drain routine for every one of its control bytes
//! *and* as the fallback trigger, so the state machine is fed both the
//! moment a control byte arrives and at least once per bounded run of
//! plain payload bytes.
//!
//! Outgoing messages go through the [`frame`](crate::frame) encoder
//! straight into blocking raw-byte sends. `send` and `ping` first run the
//! reconnect loop, so a dropped link heals transparently when it can, and
//! surfaces [`Error::NotConnected`] when it cannot.
//!
//! The drain routine is deliberately executed inside the receive
//! interrupt (low latency, no separate task). It is explicitly
//! non-reentrant: on platforms with nested interrupts, a second entry
//! returns immediately rather than corrupting the state machine.

use embedded_hal::delay::DelayNs;

use crate::consts::{
    CTRL_ECHO, CTRL_END, CTRL_PING, CTRL_PREFIX, CTRL_START, DRAIN_BATCH_LEN, MAX_PAYLOAD_LEN,
    RECONNECT_POLL_INTERVAL_MS, RECONNECT_RETRIES, RECONNECT_WAIT_MS,
};
use crate::error::Error;
use crate::frame::{self, Decoder, Step};
use crate::hal::{InterruptController, Monotonic, SerialPort};
use crate::modem::{BtModem, PeerAddr, Role};

/// A message handler: receives the application context and the payload.
///
/// The payload is ephemeral: it lives until the handler returns, and a
/// handler that needs it afterwards must copy it.
pub type Handler<A> = fn(&mut A, &[u8]);

/// Per-command-id handler registry.
struct HandlerTable<A> {
    entries: [Option<Handler<A>>; 256],
}

impl<A> HandlerTable<A> {
    const EMPTY: Option<Handler<A>> = None;

    const fn new() -> Self {
        Self {
            entries: [Self::EMPTY; 256],
        }
    }

    fn register(&mut self, cmd: u8, f: Handler<A>) -> Result<(), Error> {
        // the prefix id is permanently taken by the wire protocol
        if cmd == CTRL_PREFIX {
            return Err(Error::DuplicateRegistration);
        }
        let slot = &mut self.entries[cmd as usize];
        if slot.is_some() {
            return Err(Error::DuplicateRegistration);
        }
        *slot = Some(f);
        Ok(())
    }

    fn lookup(&self, cmd: u8) -> Option<Handler<A>> {
        self.entries[cmd as usize]
    }
}

/// The framing layer: one instance per link.
///
/// `A` is the application context handed to message handlers; handlers
/// record into it, and the application inspects it via
/// [`app`](MuxLink::app)/[`app_mut`](MuxLink::app_mut).
pub struct MuxLink<S, C, A> {
    modem: BtModem<S, C, Self>,
    handlers: HandlerTable<A>,
    app: A,
    decoder: Decoder,
    role: Role,
    peer: PeerAddr,
    last_ping_us: Option<u64>,
    last_echo_us: Option<u64>,
    draining: bool,
}

impl<S, C, A> core::fmt::Debug for MuxLink<S, C, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MuxLink")
            .field("role", &self.role)
            .field("peer", &self.peer)
            .field("last_ping_us", &self.last_ping_us)
            .field("last_echo_us", &self.last_echo_us)
            .field("draining", &self.draining)
            .finish_non_exhaustive()
    }
}

impl<S, C, A> MuxLink<S, C, A>
where
    S: SerialPort,
    C: Monotonic + DelayNs,
{
    /// The bytes whose arrival must wake the drain routine immediately.
    const CONTROL_BYTES: [u8; 5] = [CTRL_PREFIX, CTRL_START, CTRL_END, CTRL_PING, CTRL_ECHO];

    /// Brings up the whole stack: transport initialization, drain-trigger
    /// registration, and an initial connection attempt.
    ///
    /// The connection attempt is allowed to fail; the first `send` or
    /// `ping` runs the reconnect loop again.
    pub fn init(
        serial: S,
        clock: C,
        irq: &mut impl InterruptController,
        role: Role,
        peer: PeerAddr,
        app: A,
    ) -> Result<Self, Error> {
        let mut modem: BtModem<S, C, Self> = BtModem::init(serial, clock, irq, role, peer);
        for &byte in &Self::CONTROL_BYTES {
            modem.register_trigger(byte, Self::drain_trigger)?;
        }
        modem.register_fallback_trigger(Self::drain_trigger);

        let mut link = Self {
            modem,
            handlers: HandlerTable::new(),
            app,
            decoder: Decoder::new(),
            role,
            peer,
            last_ping_us: None,
            last_echo_us: None,
            draining: false,
        };
        let _ = link.ensure_connected();
        Ok(link)
    }

    /// Associates `f` with a command id.
    ///
    /// Each id takes at most one handler, and the escape-prefix id is
    /// reserved by the wire protocol; both violations report
    /// [`Error::DuplicateRegistration`].
    pub fn register_handler(&mut self, cmd: u8, f: Handler<A>) -> Result<(), Error> {
        self.handlers.register(cmd, f)
    }

    /// Sends one message to the peer.
    ///
    /// Ensures the link is up first (reconnecting within bounded retries
    /// if it is not), then transmits the framed message. `Ok` means the
    /// bytes left this board; delivery is not confirmed at this layer.
    pub fn send(&mut self, cmd: u8, payload: &[u8]) -> Result<(), Error> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(Error::PayloadTooLarge);
        }
        self.ensure_connected()?;
        let modem = &mut self.modem;
        frame::encode(cmd, payload, &mut |byte| modem.send_raw_byte(byte));
        Ok(())
    }

    /// Sends a liveness probe and records when it left.
    ///
    /// The peer answers with an echo, whose arrival time is recorded in
    /// [`last_echo_us`](MuxLink::last_echo_us). Nothing in this crate acts
    /// on the gap between the two; they are observational.
    pub fn ping(&mut self) -> Result<(), Error> {
        self.ensure_connected()?;
        self.last_ping_us = Some(self.modem.now_us());
        self.modem.send_raw_bytes(&[CTRL_PREFIX, CTRL_PING]);
        Ok(())
    }

    /// Makes sure the link is up, reconnecting if necessary.
    ///
    /// Each attempt issues the connect sequence and then polls the
    /// connection state at short fixed intervals for a bounded wait.
    /// Returns as soon as the link is up; [`Error::NotConnected`] once
    /// the retries are exhausted.
    pub fn ensure_connected(&mut self) -> Result<(), Error> {
        for _ in 0..RECONNECT_RETRIES {
            if self.modem.is_connected() {
                return Ok(());
            }
            let _ = self.modem.connect(self.role, &self.peer);

            let mut waited_ms = 0;
            while waited_ms < RECONNECT_WAIT_MS {
                if self.modem.is_connected() {
                    return Ok(());
                }
                self.modem.delay_ms(RECONNECT_POLL_INTERVAL_MS);
                waited_ms += RECONNECT_POLL_INTERVAL_MS;
            }
            debug_log!("connect attempt failed; retrying");
        }
        Err(Error::NotConnected)
    }

    /// The interrupt service entry: the platform receive ISR calls this
    /// (usually through the [`isr`](crate::isr) glue).
    ///
    /// Pumps hardware bytes one at a time through the transport's accept
    /// path and invokes whatever the trigger table decides; for this
    /// link's own control bytes and for the fallback, that is the drain
    /// routine.
    pub fn service_interrupt(&mut self) {
        while let Some(decision) = self.modem.isr_step() {
            if let Some(f) = decision {
                f(self);
            }
        }
    }

    /// When the last liveness probe was sent, in monotonic microseconds.
    pub fn last_ping_us(&self) -> Option<u64> {
        self.last_ping_us
    }

    /// When the last echo reply arrived, in monotonic microseconds.
    pub fn last_echo_us(&self) -> Option<u64> {
        self.last_echo_us
    }

    /// The application context handlers record into.
    pub fn app(&self) -> &A {
        &self.app
    }

    /// Mutable access to the application context.
    pub fn app_mut(&mut self) -> &mut A {
        &mut self.app
    }

    /// Read access to the underlying transport.
    pub fn modem(&self) -> &BtModem<S, C, Self> {
        &self.modem
    }

    fn drain_trigger(link: &mut Self) {
        link.drain();
    }

    /// Dequeues everything the transport has and feeds it through the
    /// state machine. Non-reentrant by design: a nested entry (nested
    /// interrupt platforms) returns immediately.
    fn drain(&mut self) {
        if self.draining {
            return;
        }
        self.draining = true;
        let mut batch = [0u8; DRAIN_BATCH_LEN];
        while self.modem.has_data() {
            let n = self.modem.read(&mut batch);
            for &byte in &batch[..n] {
                self.process_byte(byte);
            }
        }
        self.draining = false;
    }

    fn process_byte(&mut self, byte: u8) {
        match self.decoder.feed(byte) {
            Step::Pending => {}
            Step::Complete => self.dispatch(),
            Step::Ping => {
                self.modem.send_raw_bytes(&[CTRL_PREFIX, CTRL_ECHO]);
            }
            Step::Echo => {
                self.last_echo_us = Some(self.modem.now_us());
            }
        }
    }

    fn dispatch(&mut self) {
        let (cmd, _) = self.decoder.message();
        let Some(f) = self.handlers.lookup(cmd) else {
            // no handler registered: the message is dropped
            return;
        };
        let (_, payload) = self.decoder.message();
        f(&mut self.app, payload);
    }
}
