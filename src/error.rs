//! The crate-wide error type.
//!
//! Every fallible operation in the stack reports one of a small, closed set
//! of conditions. Protocol malformation on the wire is deliberately *not*
//! an error: noise on a wireless link is expected, and the receive state
//! machine absorbs it silently (see [`frame`](crate::frame)).

use thiserror::Error;

/// Errors reported by the transport and framing layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Error {
    /// A command transaction exhausted its retries without an `OK` response
    /// arriving before the deadline, or the response did not match the
    /// expected confirmation.
    #[error("timed out waiting for a command response")]
    Timeout,

    /// No link to the peer, and the bounded reconnect loop failed to
    /// establish one.
    #[error("no active connection to the peer")]
    NotConnected,

    /// An outgoing payload exceeds the compile-time maximum message length.
    #[error("payload exceeds the maximum message length")]
    PayloadTooLarge,

    /// A trigger or handler is already registered for this key.
    ///
    /// Also reported when registering a message handler for the escape
    /// prefix byte: that command id is permanently taken by the wire
    /// protocol itself.
    #[error("a callback is already registered for this key")]
    DuplicateRegistration,
}
