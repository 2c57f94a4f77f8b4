//! Debug-only detection of user code re-entering a table mid-probe.
//!
//! Tables call into user `Hash`/`Eq` implementations while walking a run.
//! If that code reaches back into the same table, debug builds panic
//! instead of observing half-updated links. Release builds compile the
//! guard away.

#[cfg(debug_assertions)]
use core::cell::Cell;
use core::marker::PhantomData;

/// Per-table probe depth. Guard each entry point with
/// `let _g = self.probe.enter();`.
#[derive(Debug)]
pub struct ProbeGuard {
    #[cfg(debug_assertions)]
    active: Cell<bool>,
    _single_threaded: PhantomData<*mut ()>,
}

impl ProbeGuard {
    pub const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            active: Cell::new(false),
            _single_threaded: PhantomData,
        }
    }

    #[inline]
    pub fn enter(&self) -> Probing<'_> {
        #[cfg(debug_assertions)]
        {
            assert!(
                !self.active.replace(true),
                "table re-entered from Hash/Eq while probing"
            );
            Probing { owner: self }
        }

        #[cfg(not(debug_assertions))]
        {
            Probing { _owner: PhantomData }
        }
    }
}

impl Default for ProbeGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Live probe section; ends on drop.
pub struct Probing<'a> {
    #[cfg(debug_assertions)]
    owner: &'a ProbeGuard,
    #[cfg(not(debug_assertions))]
    _owner: PhantomData<&'a ()>,
}

impl Drop for Probing<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        self.owner.active.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::ProbeGuard;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn back_to_back_lookups_share_one_guard() {
        let guard = ProbeGuard::default();
        for _ in 0..3 {
            let probing = guard.enter();
            drop(probing);
        }
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "re-entered from Hash/Eq")]
    fn lookup_inside_lookup_panics() {
        let guard = ProbeGuard::new();
        let _hashing = guard.enter();
        let _ = guard.enter();
    }

    #[cfg(debug_assertions)]
    #[test]
    fn guard_recovers_after_user_code_panics() {
        let guard = ProbeGuard::new();
        let res = catch_unwind(AssertUnwindSafe(|| {
            let _probing = guard.enter();
            panic!("Eq impl failed");
        }));
        assert!(res.is_err());
        // Unwinding dropped the section, so the table is usable again.
        drop(guard.enter());
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn release_builds_allow_nesting() {
        let guard = ProbeGuard::new();
        let _outer = guard.enter();
        let _inner = guard.enter();
        assert!(catch_unwind(AssertUnwindSafe(|| drop(guard.enter()))).is_ok());
    }
}
