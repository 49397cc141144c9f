//! Hardware seams between the stack and the platform.
//!
//! `embedded-hal` 1.0 has no UART or interrupt-controller traits, so this
//! module defines the three collaborators the stack consumes, to be
//! implemented once per platform:
//!
//! - [`SerialPort`]: the byte-level UART the Bluetooth module is wired to.
//! - [`Monotonic`]: a monotonic microsecond tick source. The clock object
//!   handed to the stack must also implement
//!   [`embedded_hal::delay::DelayNs`], which covers the busy-wait delays
//!   (role settling, reconnect polling).
//! - [`InterruptController`]: enable/clear of the UART receive interrupt
//!   source. Installing the actual interrupt *handler* is platform glue
//!   (a vector-table entry or `#[interrupt]` function) that calls into
//!   [`isr`](crate::isr); no trait can usefully abstract that part.
//!
//! The non-blocking byte primitives use [`nb`]: `WouldBlock` on
//! [`SerialPort::read`] means no byte is waiting, `WouldBlock` on
//! [`SerialPort::write`] means the transmit holding register is full.
//! Blocking sends are simply `nb::block!` over `write`.

use crate::consts::MODULE_BAUD_RATE;

/// Byte-level UART access to the Bluetooth module.
pub trait SerialPort {
    /// Hardware error type. Memory-mapped UARTs are typically infallible;
    /// receive-side framing/parity errors may surface here and abort the
    /// current receive pump iteration.
    type Error: core::fmt::Debug;

    /// Apply line settings (baud rate, format). Called once at
    /// initialization with the module's power-on settings.
    fn configure(&mut self, config: &SerialConfig);

    /// Write one byte, or `WouldBlock` while the transmitter is not ready.
    fn write(&mut self, byte: u8) -> nb::Result<(), Self::Error>;

    /// Read one byte, or `WouldBlock` if none is waiting.
    fn read(&mut self) -> nb::Result<u8, Self::Error>;
}

/// Monotonic tick source.
///
/// Ticks are microseconds since some fixed origin (typically boot). All
/// deadlines in the stack are computed as differences of this value; it
/// must never go backwards.
pub trait Monotonic {
    /// Current tick count in microseconds.
    fn now_us(&mut self) -> u64;
}

/// Enable/clear of the UART receive interrupt source.
///
/// Consumed once at initialization: pending state is cleared before the
/// source is enabled so a stale byte cannot fire the handler into an
/// uninitialized stack.
pub trait InterruptController {
    /// Clear any pending interrupt for the receive source.
    fn clear_pending(&mut self);

    /// Enable the receive interrupt source.
    fn enable_source(&mut self);
}

/// UART line settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialConfig {
    /// Baud rate in bits per second.
    pub baudrate: u32,
    /// Number of data bits per frame.
    pub data_bits: DataBits,
    /// Parity mode.
    pub parity: Parity,
    /// Number of stop bits.
    pub stop_bits: StopBits,
}

impl Default for SerialConfig {
    /// The module's power-on line settings: 9600 8N1.
    fn default() -> Self {
        Self {
            baudrate: MODULE_BAUD_RATE,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

/// Number of data bits per UART frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum DataBits {
    /// Seven data bits.
    Seven,
    /// Eight data bits.
    Eight,
}

/// UART parity mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Parity {
    /// No parity bit.
    None,
    /// Even parity.
    Even,
    /// Odd parity.
    Odd,
}

/// Number of UART stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum StopBits {
    /// One stop bit.
    One,
    /// Two stop bits.
    Two,
}
