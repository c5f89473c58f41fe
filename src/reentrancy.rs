//! Debug-only reentrancy guard.
//!
//! `RefCounter` holds its table lock while it queries the mount oracle. An
//! oracle that calls back into the same counter on the same thread would block
//! on that lock forever. In debug builds entering a guarded section twice on
//! one thread panics instead; in release builds this is a zero-cost no-op.

use core::marker::PhantomData;
#[cfg(debug_assertions)]
use std::cell::RefCell;
#[cfg(debug_assertions)]
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(debug_assertions)]
static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

#[cfg(debug_assertions)]
thread_local! {
    // Ids of the trackers this thread is currently inside.
    static ENTERED: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Per-instance reentrancy tracker. Guard public entry points with
/// `let _g = self.reentrancy.enter();` before taking the lock.
#[derive(Debug)]
pub struct DebugReentrancy {
    #[cfg(debug_assertions)]
    id: usize,
}

impl DebugReentrancy {
    pub fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Enter a guarded section. In debug builds, panics if this thread is
    /// already inside a section of the same tracker.
    #[inline]
    pub fn enter(&self) -> ReentrancyGuard<'_> {
        #[cfg(debug_assertions)]
        {
            let id = self.id;
            ENTERED.with(|e| {
                let mut e = e.borrow_mut();
                assert!(
                    !e.contains(&id),
                    "reentrant call into RefCounter from its own mount oracle"
                );
                e.push(id);
            });
            return ReentrancyGuard {
                owner: self,
                _nosend: PhantomData,
            };
        }

        #[cfg(not(debug_assertions))]
        {
            return ReentrancyGuard {
                _z: PhantomData,
                _nosend: PhantomData,
            };
        }
    }
}

impl Default for DebugReentrancy {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard returned by `DebugReentrancy::enter`. Bound to the entering
/// thread, so it is `!Send`.
pub struct ReentrancyGuard<'a> {
    #[cfg(debug_assertions)]
    owner: &'a DebugReentrancy,
    #[cfg(not(debug_assertions))]
    _z: PhantomData<&'a ()>,
    _nosend: PhantomData<*mut ()>,
}

impl<'a> Drop for ReentrancyGuard<'a> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            let id = self.owner.id;
            // Ignore a destroyed thread-local during thread teardown.
            let _ = ENTERED.try_with(|e| {
                let mut e = e.borrow_mut();
                if let Some(pos) = e.iter().rposition(|&x| x == id) {
                    e.remove(pos);
                }
            });
        }
    }
}
