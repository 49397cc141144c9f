//! Transport layer: ownership of the physical link to the Bluetooth module.
//!
//! [`BtModem`] owns the serial port, the monotonic clock, the receive byte
//! queue, the trigger table, and the module's connection lifecycle:
//!
//! - **Connection state** is never a free-standing flag: it is derived by
//!   scanning a trailing window of everything ever received for the
//!   firmware's `OK+CONN` / `OK+LOST` notifications, with a grace-window
//!   rule to tell a bare `OK+CONN` apart from the extended notices
//!   (`OK+CONNA`, `OK+CONNE`, `OK+CONNF`) that share its first seven bytes.
//! - **Command transactions** are synchronous and retried: send the AT
//!   command, collect everything that arrives inside the response window,
//!   succeed iff the first two bytes were `OK`. At most one transaction is
//!   ever outstanding.
//! - **Roles**: a Primary initiates the connection to a known peer
//!   address; a Subordinate only accepts. The module's configured role is
//!   re-asserted only when it differs from what was last confirmed, and a
//!   role command is always followed by the mandatory settling delay.
//!
//! ## Receive paths
//!
//! The interrupt path is [`isr_step`](BtModem::isr_step): accept one
//! hardware byte (sentinel scan + enqueue) and return the trigger-table
//! decision for the owning context to invoke. The main line has
//! [`poll`](BtModem::poll), the same accept path minus trigger dispatch;
//! every blocking wait in this module polls, so the stack makes progress
//! even while the receive interrupt is masked (which it is whenever the
//! application holds the link through a critical section, see
//! [`isr`](crate::isr)). On hardware both paths feed the same queue and
//! scanner; bytes are processed strictly in arrival order either way.

use embedded_hal::delay::DelayNs;
use heapless::Vec;

use crate::consts::{
    AT_COMMAND_BUF_LEN, AT_RESPONSE_BUF_LEN, COMMAND_RETRIES, CONNECT_GRACE_US,
    CONNECT_VARIANT_SUFFIXES, CONNECTED_SENTINEL, LOST_SENTINEL, PEER_ADDR_LEN,
    RESPONSE_TIMEOUT_US, ROLE_SETTLE_DELAY_MS, RX_QUEUE_LEN, SENTINEL_WINDOW_LEN,
};
use crate::error::Error;
use crate::hal::{InterruptController, Monotonic, SerialConfig, SerialPort};
use crate::queue::ByteQueue;
use crate::trigger::{Trigger, TriggerTable};

/// Link role of this board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Role {
    /// Waits for the peer to connect. (Module documentation: "slave".)
    Subordinate = 0,
    /// Initiates the connection to a known peer address. (Module
    /// documentation: "master".)
    Primary = 1,
}

impl Role {
    fn set_command(self) -> &'static [u8] {
        match self {
            Role::Subordinate => b"AT+ROLE0",
            Role::Primary => b"AT+ROLE1",
        }
    }

    fn set_confirmation(self) -> &'static [u8] {
        match self {
            Role::Subordinate => b"OK+Set:0",
            Role::Primary => b"OK+Set:1",
        }
    }
}

/// A peer module address: 12 ASCII hex characters, as consumed by the
/// module's connect command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddr([u8; PEER_ADDR_LEN]);

impl PeerAddr {
    /// Wraps a raw 12-character address.
    pub const fn new(addr: [u8; PEER_ADDR_LEN]) -> Self {
        Self(addr)
    }

    /// The address bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8; PEER_ADDR_LEN]> for PeerAddr {
    fn from(addr: &[u8; PEER_ADDR_LEN]) -> Self {
        Self(*addr)
    }
}

/// Derives the connection state from the trailing receive history.
///
/// The window is logically always full: it starts zero-filled with the
/// byte count pre-advanced past it, so the tail arithmetic never has to
/// special-case a short history.
#[derive(Debug)]
struct SentinelScanner {
    window: [u8; SENTINEL_WINDOW_LEN],
    nbytes: u64,
    connected: bool,
    last_rx_us: u64,
}

impl SentinelScanner {
    const fn new() -> Self {
        Self {
            window: [0; SENTINEL_WINDOW_LEN],
            nbytes: SENTINEL_WINDOW_LEN as u64,
            connected: false,
            last_rx_us: 0,
        }
    }

    /// Records one received byte and re-evaluates the connection state.
    fn accept(&mut self, byte: u8, now_us: u64) {
        self.window[(self.nbytes % SENTINEL_WINDOW_LEN as u64) as usize] = byte;
        self.nbytes += 1;

        if self.connect_accepted(byte, now_us) {
            self.connected = true;
        } else if self.tail_matches(0, LOST_SENTINEL) {
            self.connected = false;
        }

        self.last_rx_us = now_us;
    }

    /// The disambiguation rule for `OK+CONN`.
    ///
    /// `OK+CONNA`, `OK+CONNE` and `OK+CONNF` are distinct notices that do
    /// not mean a link came up, so a continuation byte arriving hot on the
    /// heels of a candidate match rejects it. The same byte arriving after
    /// the grace window is unrelated traffic, and the candidate stands.
    fn connect_accepted(&self, byte: u8, now_us: u64) -> bool {
        if CONNECT_VARIANT_SUFFIXES.contains(&byte)
            && now_us.wrapping_sub(self.last_rx_us) < CONNECT_GRACE_US
        {
            return false;
        }
        // does the history *before* this byte end with the sentinel?
        self.tail_matches(1, CONNECTED_SENTINEL)
    }

    /// Current state, upgrading a pending bare `OK+CONN` whose grace
    /// window has elapsed with no further byte.
    fn is_connected(&mut self, now_us: u64) -> bool {
        if !self.connected
            && now_us.wrapping_sub(self.last_rx_us) > CONNECT_GRACE_US
            && self.tail_matches(0, CONNECTED_SENTINEL)
        {
            self.connected = true;
        }
        self.connected
    }

    /// Whether the last `needle.len()` bytes of the history, ignoring the
    /// `skip_last` most recent, equal `needle`.
    fn tail_matches(&self, skip_last: usize, needle: &[u8]) -> bool {
        let considered = self.nbytes - skip_last as u64;
        if considered < needle.len() as u64 {
            return false;
        }
        let n = SENTINEL_WINDOW_LEN as u64;
        let base = considered - needle.len() as u64;
        needle
            .iter()
            .enumerate()
            .all(|(i, &c)| self.window[((base + i as u64) % n) as usize] == c)
    }
}

/// The transport layer: one instance per physical link.
///
/// `T` is the context type trigger callbacks receive: the struct that
/// embeds this modem (see [`mux::MuxLink`](crate::mux::MuxLink)).
pub struct BtModem<S, C, T> {
    serial: S,
    clock: C,
    queue: ByteQueue<RX_QUEUE_LEN>,
    scanner: SentinelScanner,
    triggers: TriggerTable<T>,
    role: Role,
    peer: PeerAddr,
    /// Role the module firmware last confirmed with `OK+Set`, if any.
    confirmed_role: Option<Role>,
}

impl<S, C, T> core::fmt::Debug for BtModem<S, C, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BtModem")
            .field("role", &self.role)
            .field("peer", &self.peer)
            .field("confirmed_role", &self.confirmed_role)
            .field("connected", &self.scanner.connected)
            .field("rx_pending", &self.queue.len())
            .field("rx_dropped", &self.queue.dropped())
            .finish_non_exhaustive()
    }
}

impl<S, C, T> BtModem<S, C, T>
where
    S: SerialPort,
    C: Monotonic + DelayNs,
{
    /// Setup sequence issued once at initialization: close any stale link,
    /// soft-reset the module, enable the connect/disconnect notifications
    /// the sentinel scanner depends on.
    const SETUP_COMMANDS: [&'static [u8]; 3] = [b"AT", b"AT+RESET", b"AT+NOTI1"];

    /// Brings up the physical link and the module.
    ///
    /// Configures the port for the module's power-on line settings, clears
    /// pending receive-interrupt state and enables the source, then issues
    /// the setup command sequence. Setup command failures are tolerated;
    /// the module may still be mid-boot, and later transactions retry.
    ///
    /// Construction *is* initialization: a link context exists at most
    /// once, and the [`isr`](crate::isr) glue asserts its slot was empty
    /// when one is installed.
    pub fn init(
        mut serial: S,
        clock: C,
        irq: &mut impl InterruptController,
        role: Role,
        peer: PeerAddr,
    ) -> Self {
        serial.configure(&SerialConfig::default());
        // clear before enable so a stale byte cannot fire the handler
        // into a half-built stack
        irq.clear_pending();
        irq.enable_source();

        let mut modem = Self {
            serial,
            clock,
            queue: ByteQueue::new(),
            scanner: SentinelScanner::new(),
            triggers: TriggerTable::new(),
            role,
            peer,
            confirmed_role: None,
        };
        for cmd in Self::SETUP_COMMANDS {
            if modem.send_command(cmd).is_err() {
                debug_log!("setup command got no OK; continuing");
            }
        }
        modem
    }

    /// Sends an AT command transactionally, discarding the response text.
    ///
    /// Retries up to [`COMMAND_RETRIES`] times, resending the full command
    /// each time; `Err(Timeout)` once retries exhaust. All bytes arriving
    /// during the wait are drained and interpreted, so connection state
    /// updates as a byproduct.
    pub fn send_command(&mut self, cmd: &[u8]) -> Result<(), Error> {
        self.send_command_capture(cmd, &mut []).map(|_| ())
    }

    /// Like [`send_command`](BtModem::send_command), but copies response
    /// bytes into `response`, returning how many were captured.
    ///
    /// Bytes beyond the buffer's length are still consumed and counted
    /// toward the `OK` check, just not stored.
    pub fn send_command_capture(
        &mut self,
        cmd: &[u8],
        response: &mut [u8],
    ) -> Result<usize, Error> {
        for attempt in 0..COMMAND_RETRIES {
            self.send_raw_bytes(cmd);
            if let Some(len) = self.wait_response(response) {
                return Ok(len);
            }
            debug_log!("command attempt {} got no OK", attempt);
        }
        Err(Error::Timeout)
    }

    /// Collects response bytes for the full response window.
    ///
    /// Returns how many bytes were captured if at least two bytes arrived
    /// and the first two were `O`,`K`; `None` otherwise. The window always
    /// runs to its deadline, since response length is not known up front, and
    /// the module terminates nothing.
    fn wait_response(&mut self, capture: &mut [u8]) -> Option<usize> {
        let mut nbytes = 0usize;
        let mut ok = true;

        let start = self.clock.now_us();
        while self.clock.now_us().wrapping_sub(start) < RESPONSE_TIMEOUT_US {
            self.poll();
            let Some(byte) = self.queue.dequeue() else {
                continue;
            };
            if (nbytes == 0 && byte != b'O') || (nbytes == 1 && byte != b'K') {
                ok = false;
            }
            if nbytes < capture.len() {
                capture[nbytes] = byte;
            }
            nbytes += 1;
        }

        (nbytes >= 2 && ok).then_some(nbytes.min(capture.len()))
    }

    /// Transmits one byte, busy-waiting until the transmitter is ready.
    pub fn send_raw_byte(&mut self, byte: u8) {
        // memory-mapped UART writes do not fail; mirror that contract
        let _ = nb::block!(self.serial.write(byte));
    }

    /// Transmits a buffer byte by byte. No length limit; the caller paces
    /// the link.
    pub fn send_raw_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.send_raw_byte(byte);
        }
    }

    /// Non-blocking drain of queued bytes into `buf`.
    ///
    /// Returns how many bytes were written; `0` immediately when nothing
    /// is queued.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        self.poll();
        let mut n = 0;
        while n < buf.len() {
            match self.queue.dequeue() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        n
    }

    /// Whether any received bytes are waiting to be read.
    pub fn has_data(&mut self) -> bool {
        self.poll();
        !self.queue.is_empty()
    }

    /// Whether a link to the peer is currently up.
    pub fn is_connected(&mut self) -> bool {
        self.poll();
        let now = self.clock.now_us();
        self.scanner.is_connected(now)
    }

    /// Establishes (or re-establishes) a link in the given role.
    ///
    /// Asserts the role on the module if it differs from what was last
    /// confirmed (closing any open link first, then observing the
    /// mandatory settling delay). A Primary then erases the module's bond
    /// list, clears stale state and issues the connect command; a
    /// Subordinate does nothing further; it is addressed by the peer.
    ///
    /// Success of the connect itself is signalled asynchronously by the
    /// `OK+CONN` notification, not by this call: poll
    /// [`is_connected`](BtModem::is_connected) afterwards.
    pub fn connect(&mut self, role: Role, peer: &PeerAddr) -> Result<(), Error> {
        self.role = role;
        self.peer = *peer;

        self.ensure_role()?;

        if self.role == Role::Primary {
            // state clearing; failures tolerated, the commands are
            // harmless when there is nothing to clear
            let _ = self.send_command(b"AT+ERASE");
            let _ = self.send_command(b"AT+CLEAR");

            let mut cmd: Vec<u8, AT_COMMAND_BUF_LEN> = Vec::new();
            let _ = cmd.extend_from_slice(b"AT+CON");
            let _ = cmd.extend_from_slice(self.peer.as_bytes());
            let _ = self.send_command(&cmd);
        }
        Ok(())
    }

    /// Asserts the desired role on the module if not already confirmed.
    fn ensure_role(&mut self) -> Result<(), Error> {
        if self.confirmed_role == Some(self.role) {
            return Ok(());
        }

        // a role change is refused while a link is open; `AT` closes it
        let _ = self.send_command(b"AT");

        let mut response = [0u8; AT_RESPONSE_BUF_LEN];
        let result = self.send_command_capture(self.role.set_command(), &mut response);

        // the module ignores anything sent too soon after a role command;
        // see ROLE_SETTLE_DELAY_MS
        self.clock.delay_ms(ROLE_SETTLE_DELAY_MS);

        let len = result?;
        if &response[..len] != self.role.set_confirmation() {
            return Err(Error::Timeout);
        }
        self.confirmed_role = Some(self.role);
        Ok(())
    }

    /// Registers `f` to fire from the interrupt path whenever `byte` is
    /// received. A byte value has at most one callback.
    pub fn register_trigger(&mut self, byte: u8, f: Trigger<T>) -> Result<(), Error> {
        self.triggers.register(byte, f)
    }

    /// Removes the trigger for `byte`, if any.
    pub fn unregister_trigger(&mut self, byte: u8) {
        self.triggers.unregister(byte);
    }

    /// Installs the fallback trigger, fired after a bounded run of bytes
    /// with no ordinary trigger (see
    /// [`MAX_BYTES_WITHOUT_TRIGGER`](crate::consts::MAX_BYTES_WITHOUT_TRIGGER)).
    pub fn register_fallback_trigger(&mut self, f: Trigger<T>) {
        self.triggers.register_fallback(f);
    }

    /// One step of the interrupt path.
    ///
    /// Accepts one hardware byte if available (sentinel scan, enqueue,
    /// trigger accounting) and reports the decision: `None` when no byte
    /// was waiting, `Some(None)` for a byte with nothing to invoke,
    /// `Some(Some(f))` when the owning context must now invoke `f`.
    pub fn isr_step(&mut self) -> Option<Option<Trigger<T>>> {
        let byte = self.serial.read().ok()?;
        self.accept(byte);
        Some(self.triggers.on_byte(byte))
    }

    /// Drains all currently available hardware bytes through the accept
    /// path, without trigger dispatch.
    ///
    /// Every blocking wait calls this, so receive progress never depends
    /// on interrupt delivery.
    pub fn poll(&mut self) {
        while let Ok(byte) = self.serial.read() {
            self.accept(byte);
        }
    }

    fn accept(&mut self, byte: u8) {
        let now = self.clock.now_us();
        self.scanner.accept(byte, now);
        if !self.queue.enqueue(byte) {
            debug_log!("receive queue full; byte dropped");
        }
    }

    /// Number of received bytes currently queued.
    pub fn rx_pending(&self) -> usize {
        self.queue.len()
    }

    /// Total received bytes dropped to queue overflow.
    pub fn rx_dropped(&self) -> u32 {
        self.queue.dropped()
    }

    /// Current monotonic time in microseconds.
    pub fn now_us(&mut self) -> u64 {
        self.clock.now_us()
    }

    /// Busy-waits for `ms` milliseconds.
    pub fn delay_ms(&mut self, ms: u32) {
        self.clock.delay_ms(ms);
    }
}
