//! Byte-value trigger dispatch for the receive interrupt path.
//!
//! A trigger maps one byte value to a callback invoked synchronously from
//! the interrupt path the moment that byte is received. The table also
//! carries one *fallback* callback, fired once more than
//! [`MAX_BYTES_WITHOUT_TRIGGER`](crate::consts::MAX_BYTES_WITHOUT_TRIGGER)
//! bytes arrive without any ordinary trigger firing. This is the mechanism that
//! bounds receive-queue growth while payload bytes happen to contain no
//! control bytes.
//!
//! Callbacks are plain function pointers typed over the owning context
//! `T` (the link struct that embeds the table). The interrupt path copies
//! the pointer out of the table before invoking it, so the invocation can
//! take `&mut T` without aliasing the table borrow.

use crate::consts::MAX_BYTES_WITHOUT_TRIGGER;
use crate::error::Error;

/// A trigger callback, invoked with the owning link context.
pub type Trigger<T> = fn(&mut T);

/// Mapping from byte values to trigger callbacks, plus the fallback policy.
pub struct TriggerTable<T> {
    entries: [Option<Trigger<T>>; 256],
    fallback: Option<Trigger<T>>,
    since_last: u16,
}

// manual impl: a derive would demand `T: Debug`, which the owning link
// context cannot provide without a bound cycle through its own table
impl<T> core::fmt::Debug for TriggerTable<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let registered = self.entries.iter().filter(|e| e.is_some()).count();
        f.debug_struct("TriggerTable")
            .field("registered", &registered)
            .field("fallback", &self.fallback.is_some())
            .field("since_last", &self.since_last)
            .finish_non_exhaustive()
    }
}

impl<T> TriggerTable<T> {
    const EMPTY: Option<Trigger<T>> = None;

    /// Creates a table with no registrations.
    pub const fn new() -> Self {
        Self {
            entries: [Self::EMPTY; 256],
            fallback: None,
            since_last: 0,
        }
    }

    /// Registers `f` to fire whenever `byte` is received.
    ///
    /// A byte value has at most one callback: registering over an existing
    /// entry is a contract violation and reports
    /// [`Error::DuplicateRegistration`].
    pub fn register(&mut self, byte: u8, f: Trigger<T>) -> Result<(), Error> {
        let slot = &mut self.entries[byte as usize];
        if slot.is_some() {
            return Err(Error::DuplicateRegistration);
        }
        *slot = Some(f);
        Ok(())
    }

    /// Removes the callback for `byte`, if any.
    pub fn unregister(&mut self, byte: u8) {
        self.entries[byte as usize] = None;
    }

    /// Installs the fallback callback, replacing any previous one.
    pub fn register_fallback(&mut self, f: Trigger<T>) {
        self.fallback = Some(f);
    }

    /// Accounts for one received byte and decides what, if anything, the
    /// interrupt path must invoke for it.
    ///
    /// A registered trigger (and a fired fallback) resets the
    /// since-last-trigger counter; an unmatched byte increments it until
    /// the fallback threshold is crossed.
    pub fn on_byte(&mut self, byte: u8) -> Option<Trigger<T>> {
        if let Some(f) = self.entries[byte as usize] {
            self.since_last = 0;
            return Some(f);
        }
        if self.since_last < MAX_BYTES_WITHOUT_TRIGGER {
            self.since_last += 1;
            return None;
        }
        if let Some(f) = self.fallback {
            self.since_last = 0;
            return Some(f);
        }
        // over threshold but no fallback registered: nothing to do
        None
    }
}

impl<T> Default for TriggerTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ctx {
        ordinary: u32,
        fallback: u32,
    }

    fn on_ordinary(ctx: &mut Ctx) {
        ctx.ordinary += 1;
    }

    fn on_fallback(ctx: &mut Ctx) {
        ctx.fallback += 1;
    }

    fn run(table: &mut TriggerTable<Ctx>, ctx: &mut Ctx, byte: u8) {
        if let Some(f) = table.on_byte(byte) {
            f(ctx);
        }
    }

    #[test]
    fn test_trigger_fires_immediately() {
        let mut table: TriggerTable<Ctx> = TriggerTable::new();
        let mut ctx = Ctx {
            ordinary: 0,
            fallback: 0,
        };
        table.register(b'&', on_ordinary).unwrap();
        run(&mut table, &mut ctx, b'&');
        run(&mut table, &mut ctx, b'x');
        run(&mut table, &mut ctx, b'&');
        assert_eq!(ctx.ordinary, 2);
        assert_eq!(ctx.fallback, 0);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut table: TriggerTable<Ctx> = TriggerTable::new();
        table.register(b'J', on_ordinary).unwrap();
        assert_eq!(
            table.register(b'J', on_fallback),
            Err(Error::DuplicateRegistration)
        );
        // a different byte is still free
        table.register(b'X', on_ordinary).unwrap();
    }

    #[test]
    fn test_unregister_frees_slot() {
        let mut table: TriggerTable<Ctx> = TriggerTable::new();
        table.register(b'P', on_ordinary).unwrap();
        table.unregister(b'P');
        table.register(b'P', on_fallback).unwrap();
    }

    #[test]
    fn test_fallback_after_threshold() {
        let mut table: TriggerTable<Ctx> = TriggerTable::new();
        let mut ctx = Ctx {
            ordinary: 0,
            fallback: 0,
        };
        table.register_fallback(on_fallback);
        // the first MAX_BYTES_WITHOUT_TRIGGER unmatched bytes only count up
        for _ in 0..MAX_BYTES_WITHOUT_TRIGGER {
            run(&mut table, &mut ctx, b'z');
        }
        assert_eq!(ctx.fallback, 0);
        // the next one crosses the threshold
        run(&mut table, &mut ctx, b'z');
        assert_eq!(ctx.fallback, 1);
        // counter was reset: another full run is needed before it fires again
        for _ in 0..MAX_BYTES_WITHOUT_TRIGGER {
            run(&mut table, &mut ctx, b'z');
        }
        assert_eq!(ctx.fallback, 1);
        run(&mut table, &mut ctx, b'z');
        assert_eq!(ctx.fallback, 2);
    }

    #[test]
    fn test_trigger_resets_fallback_counter() {
        let mut table: TriggerTable<Ctx> = TriggerTable::new();
        let mut ctx = Ctx {
            ordinary: 0,
            fallback: 0,
        };
        table.register(b'&', on_ordinary).unwrap();
        table.register_fallback(on_fallback);
        for _ in 0..MAX_BYTES_WITHOUT_TRIGGER {
            run(&mut table, &mut ctx, b'z');
        }
        // a trigger byte resets the run
        run(&mut table, &mut ctx, b'&');
        run(&mut table, &mut ctx, b'z');
        assert_eq!(ctx.fallback, 0);
        assert_eq!(ctx.ordinary, 1);
    }

    #[test]
    fn test_no_fallback_registered_is_inert() {
        let mut table: TriggerTable<Ctx> = TriggerTable::new();
        let mut ctx = Ctx {
            ordinary: 0,
            fallback: 0,
        };
        for _ in 0..(MAX_BYTES_WITHOUT_TRIGGER * 3) {
            run(&mut table, &mut ctx, b'z');
        }
        assert_eq!(ctx.fallback, 0);
    }
}
