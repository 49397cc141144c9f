//! Constants used across the transport and framing layers.
//!
//! This module defines the wire-protocol byte values, the AT-dialect
//! sentinel strings, and the timing/retry/buffer constants shared by the
//! [`modem`](crate::modem), [`frame`](crate::frame) and [`mux`](crate::mux)
//! modules.
//!
//! ## Key Concepts
//!
//! - **Control bytes**: the framing layer reserves a single escape prefix;
//!   every control sequence is the prefix followed by one code byte.
//! - **Sentinels**: strings the module firmware emits out-of-band to signal
//!   link state (`OK+CONN`, `OK+LOST`), detected by scanning recent receive
//!   history.
//! - **Timing bounds**: every blocking wait in the stack is bounded by one
//!   of the timeout constants below; none of them is cancellable mid-wait.
//! - **Buffer sizing**: capacities are fixed at compile time; the receive
//!   queue drops bytes when full (bounded by the fallback-trigger drain
//!   policy, see [`MAX_BYTES_WITHOUT_TRIGGER`]).

/// Escape prefix byte. Begins every control sequence on the wire.
///
/// Also the one value excluded from the command-id domain: a command id
/// equal to the prefix could never appear unescaped after a start sequence.
pub const CTRL_PREFIX: u8 = b'&';

/// Control code for the start of a message (follows [`CTRL_PREFIX`]).
pub const CTRL_START: u8 = b'J';

/// Control code for the end of a message. Receiving it completes and
/// dispatches the in-progress message.
pub const CTRL_END: u8 = b'X';

/// Control code for a liveness probe. The receiver replies with
/// [`CTRL_ECHO`] immediately.
pub const CTRL_PING: u8 = b'P';

/// Control code answering a [`CTRL_PING`].
pub const CTRL_ECHO: u8 = b'E';

/// Stuffing marker: a no-op control code the receiver discards.
///
/// Inserted between `A`/`T` and `O`/`K` payload pairs so the raw stream
/// never contains the substrings `AT` or `OK`, which the module firmware
/// would otherwise interpret as its own command/response syntax.
pub const CTRL_STUFFING: u8 = b'_';

/// Maximum length in bytes of a single message payload.
///
/// Exceeding this bound on the receive side is a contract violation
/// between the two boards and is treated as fatal, not recoverable.
pub const MAX_PAYLOAD_LEN: usize = 4096;

/// Sentinel emitted by the module firmware when a link is established.
///
/// The firmware also emits extended variants that begin with the same
/// seven bytes (see [`CONNECT_VARIANT_SUFFIXES`]); a bare match is only
/// accepted after the disambiguation rule in [`modem`](crate::modem) has
/// been applied.
pub const CONNECTED_SENTINEL: &[u8] = b"OK+CONN";

/// Sentinel emitted by the module firmware when the link drops.
pub const LOST_SENTINEL: &[u8] = b"OK+LOST";

/// Continuation bytes that turn [`CONNECTED_SENTINEL`] into an extended
/// notice (`OK+CONNA`, `OK+CONNE`, `OK+CONNF`) which does *not* indicate an
/// established link.
pub const CONNECT_VARIANT_SUFFIXES: &[u8] = b"AEF";

/// Grace window after a candidate `OK+CONN` match, in microseconds.
///
/// A continuation byte arriving within this window makes the match
/// provisional (possible extended notice); silence longer than this
/// accepts the match as a bare connection notice.
pub const CONNECT_GRACE_US: u64 = 10_000;

/// How long a command transaction waits for its response, in microseconds.
pub const RESPONSE_TIMEOUT_US: u64 = 100_000;

/// How many times a command transaction is attempted before reporting
/// [`Timeout`](crate::Error::Timeout). Each retry resends the full command.
pub const COMMAND_RETRIES: u32 = 3;

/// Settling delay after issuing a role command, in milliseconds.
///
/// Empirically required by the module hardware: commands sent sooner than
/// this after `AT+ROLE` are ignored or corrupted. No documented root cause;
/// found by debugging against real modules. Do not shorten without
/// retesting on hardware.
pub const ROLE_SETTLE_DELAY_MS: u32 = 500;

/// Upper bound on one reconnect attempt's wait for the link to come up,
/// in milliseconds.
pub const RECONNECT_WAIT_MS: u32 = 200;

/// Interval at which the reconnect loop polls the connection state while
/// waiting out [`RECONNECT_WAIT_MS`], in milliseconds.
pub const RECONNECT_POLL_INTERVAL_MS: u32 = 10;

/// How many connect attempts the reconnect loop makes before reporting
/// [`NotConnected`](crate::Error::NotConnected).
pub const RECONNECT_RETRIES: u32 = 5;

/// Maximum run of received bytes with no registered trigger firing before
/// the fallback trigger is invoked.
///
/// This bounds receive-queue growth while a payload happens to contain no
/// control bytes: the drain callback is guaranteed a chance to run at least
/// once per this many bytes.
pub const MAX_BYTES_WITHOUT_TRIGGER: u16 = 32;

/// Capacity in slots of the receive byte queue.
///
/// Must comfortably exceed [`MAX_BYTES_WITHOUT_TRIGGER`] plus the depth of
/// the hardware FIFO, so the fallback drain policy keeps the queue from
/// overflowing under continuous payload traffic.
pub const RX_QUEUE_LEN: usize = 512;

/// Length in bytes of the trailing receive-history window scanned for
/// sentinels. Need only exceed the longest sentinel (7 bytes); sized
/// generously to keep the window arithmetic trivial.
pub const SENTINEL_WINDOW_LEN: usize = 32;

/// Size in bytes of the stack batch buffer the drain routine reads queued
/// bytes into before feeding them through the state machine.
pub const DRAIN_BATCH_LEN: usize = 1024;

/// Baud rate the module speaks at power-on.
pub const MODULE_BAUD_RATE: u32 = 9600;

/// Length in bytes of a module address as used by the connect command
/// (12 ASCII hex characters, no separators).
pub const PEER_ADDR_LEN: usize = 12;

/// Capacity of the scratch buffer used to assemble AT command strings
/// (`AT+CON` plus a [`PEER_ADDR_LEN`]-byte address fits with room to spare).
pub const AT_COMMAND_BUF_LEN: usize = 32;

/// Capacity of the buffer used to capture AT command responses for
/// verification (e.g. `OK+Set:1`).
pub const AT_RESPONSE_BUF_LEN: usize = 256;
