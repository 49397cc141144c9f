//! # btmux
//!
//! A portable, no_std Rust driver and message framing layer for AT-command
//! Bluetooth serial-port modules (HM-10 class hardware), for linking two
//! embedded boards over a single half-duplex UART.
//!
//! The stack has two layers:
//! - a **transport layer** ([`modem`]) owning the physical link: module
//!   roles (Primary initiates, Subordinate accepts), connect/disconnect
//!   detection by scanning receive history for the firmware's `OK+CONN` /
//!   `OK+LOST` notifications, AT command/response transactions with retry,
//!   and an interrupt-driven receive path with starvation-bounded trigger
//!   dispatch;
//! - a **framing layer** ([`mux`]) turning the raw byte stream into
//!   discrete command-tagged messages: escaping and content stuffing (so
//!   payloads can never spell `AT` or `OK` at the modem), per-command
//!   handler dispatch, ping/echo liveness and a bounded reconnect loop.
//!
//! ## Crate features
//! | Feature     | Description |
//! |-------------|-------------|
//! | `std`       | Disables `#![no_std]`; used by the host-run unit tests |
//! | `defmt-0-3` | Emits diagnostics through `defmt` |
//! | `log`       | Emits diagnostics through `log` |
//!
//! ## Usage
//!
//! ```ignore
//! use btmux::modem::{PeerAddr, Role};
//! use btmux::mux::MuxLink;
//!
//! let peer = PeerAddr::new(*b"60B6E0EA9373");
//! let mut link = MuxLink::init(uart, clock, &mut irq, Role::Primary, peer, app_state)?;
//! link.register_handler(CMD_MOVE, on_move)?;
//! link.send(CMD_CURSOR, &cursor_bytes)?;
//! ```
//!
//! Hook the UART receive interrupt up through [`isr`] (see that module for
//! the full pattern with a `static` slot).
//!
//! ## Integration Notes
//!
//! - The hardware seams are the three traits in [`hal`]; implement them
//!   once per platform. The clock must also implement
//!   `embedded_hal::delay::DelayNs`.
//! - One link per [`mux::MuxLink`]; a board with two modules uses two
//!   contexts. Initialization constructs the context, and installing it
//!   into an [`isr`] slot twice halts.
//! - All blocking waits (command responses, the role settling delay,
//!   reconnect polling) are bounded busy-waits on the main line; the
//!   receive interrupt path never blocks.
//! - Message payloads are bounded by
//!   [`consts::MAX_PAYLOAD_LEN`](crate::consts::MAX_PAYLOAD_LEN) on both
//!   sides. The bound is part of the contract between the two boards.
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded
//! environments.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(feature = "std"), no_std)]

pub use critical_section;

// diagnostics fan-out; expands to nothing when no logging backend is on
macro_rules! debug_log {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt-0-3")]
        ::defmt::debug!($($arg)*);
        #[cfg(feature = "log")]
        ::log::debug!($($arg)*);
        #[cfg(not(any(feature = "defmt-0-3", feature = "log")))]
        {
            let _ = ($($arg)*,);
        }
    }};
}

pub mod consts;
pub mod error;
pub mod frame;
pub mod hal;
pub mod isr;
pub mod modem;
pub mod mux;
pub mod queue;
pub mod trigger;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::Error;
