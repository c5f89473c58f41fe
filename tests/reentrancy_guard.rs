use mount_refcount::{MountCheckError, MountOracle, RefCounter};
use std::sync::{Arc, OnceLock, Weak};

/// Oracle that calls back into the counter that owns it.
struct Reentrant {
    counter: OnceLock<Weak<RefCounter<Reentrant>>>,
}

impl MountOracle for Reentrant {
    fn is_mounted(&self, path: &str) -> Result<bool, MountCheckError> {
        if let Some(c) = self.counter.get().and_then(Weak::upgrade) {
            c.count(path);
        }
        Ok(false)
    }
}

fn reentrant_counter() -> Arc<RefCounter<Reentrant>> {
    let c = Arc::new(RefCounter::with_oracle(Reentrant {
        counter: OnceLock::new(),
    }));
    let _ = c.oracle().counter.set(Arc::downgrade(&c));
    c
}

// Debug builds turn the would-be deadlock into a panic, and the counter is
// still usable afterwards.
#[cfg(debug_assertions)]
#[test]
fn oracle_reentry_panics_in_debug() {
    let c = reentrant_counter();
    let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        c.increment("/loop");
    }));
    assert!(res.is_err(), "expected reentrant oracle to panic");
    // The entry was marked reconciled before the oracle ran.
    assert_eq!(c.increment("/loop"), 1);
}

// Another counter is a different lock, so an oracle may consult it.
#[test]
fn oracle_may_use_a_different_counter() {
    let inner = Arc::new(RefCounter::with_oracle(mount_refcount::from_fn(|_: &str| {
        Ok(true)
    })));
    let inner2 = Arc::clone(&inner);
    let outer = RefCounter::with_oracle(mount_refcount::from_fn(move |p: &str| {
        Ok(inner2.increment(p) > 1)
    }));
    assert_eq!(outer.increment("/x"), 2);
    assert_eq!(inner.count("/x"), Some(2));
}
