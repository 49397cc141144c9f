//! Interrupt glue: sharing one link between the main line and the ISR.
//!
//! The link context is a single owned value, but two execution contexts
//! need it: application code on the main line, and the UART receive
//! interrupt. The pattern here is the usual embedded one: a `static`
//! slot holding `Mutex<RefCell<Option<MuxLink<…>>>>`, entered through
//! `critical_section` from both sides:
//!
//! ```ignore
//! btmux::declare_mux_link!(LINK, Uart4, TickClock, GameState);
//!
//! fn main() {
//!     let link = MuxLink::init(uart, clock, &mut irq, role, peer, state)?;
//!     btmux::isr::install(&LINK, link);
//!     btmux::isr::with_link(&LINK, |link| link.send(CMD_MOVE, &payload))?;
//! }
//!
//! #[interrupt]
//! fn UART4() {
//!     btmux::isr::service_irq(&LINK);
//! }
//! ```
//!
//! Because a critical section masks the receive interrupt, any blocking
//! wait performed inside `with_link` (command transactions, reconnects)
//! cannot rely on the ISR; the transport polls the hardware itself during
//! those waits, so nothing stalls. See [`modem`](crate::modem).
//!
//! [`install`] asserts the slot was empty: initializing the same link
//! slot twice is a programming error and halts.

use core::cell::RefCell;

use critical_section::Mutex;
use embedded_hal::delay::DelayNs;

use crate::hal::{Monotonic, SerialPort};
use crate::mux::MuxLink;

/// A shared slot holding the link context, usually a `static`.
pub type LinkSlot<S, C, A> = Mutex<RefCell<Option<MuxLink<S, C, A>>>>;

/// Creates an empty link slot. Usable in `static` initializers.
pub const fn link_slot<S, C, A>() -> LinkSlot<S, C, A> {
    Mutex::new(RefCell::new(None))
}

/// Installs an initialized link into its slot.
///
/// # Panics
///
/// Panics if the slot already holds a link: a link is initialized exactly
/// once.
pub fn install<S, C, A>(slot: &LinkSlot<S, C, A>, link: MuxLink<S, C, A>) {
    critical_section::with(|cs| {
        let mut slot = slot.borrow(cs).borrow_mut();
        assert!(slot.is_none(), "a link is already installed in this slot");
        *slot = Some(link);
    });
}

/// Runs `f` against the installed link, inside a critical section.
///
/// Returns `None` if no link has been installed yet.
pub fn with_link<S, C, A, R>(
    slot: &LinkSlot<S, C, A>,
    f: impl FnOnce(&mut MuxLink<S, C, A>) -> R,
) -> Option<R> {
    critical_section::with(|cs| slot.borrow(cs).borrow_mut().as_mut().map(f))
}

/// Services the receive interrupt: the platform ISR calls this.
///
/// A no-op while no link is installed, so a spurious early interrupt is
/// harmless.
pub fn service_irq<S, C, A>(slot: &LinkSlot<S, C, A>)
where
    S: SerialPort,
    C: Monotonic + DelayNs,
{
    critical_section::with(|cs| {
        if let Some(link) = slot.borrow(cs).borrow_mut().as_mut() {
            link.service_interrupt();
        }
    });
}

/// Declares a `static` link slot for the given serial, clock and
/// application-context types.
///
/// ```ignore
/// btmux::declare_mux_link!(LINK, Uart4, TickClock, GameState);
/// ```
#[macro_export]
macro_rules! declare_mux_link {
    ( $name:ident, $serial:ty, $clock:ty, $app:ty ) => {
        static $name: $crate::isr::LinkSlot<$serial, $clock, $app> =
            $crate::critical_section::Mutex::new(::core::cell::RefCell::new(
                ::core::option::Option::None,
            ));
    };
}
