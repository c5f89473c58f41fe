//! mount-refcount: per-path reference counting for storage drivers that
//! mount backing volumes on demand and unmount them once nobody needs them.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: a driver calls `increment(path)` before using a mount and
//!   `decrement(path)` after, and unmounts only when the returned count
//!   reaches zero.
//! - Layers:
//!   - PathTable<V, S>: structural, insert-only table keyed by path with
//!     stable handles (hashbrown index over slotmap storage).
//!   - RefCounter<O>: one PathTable behind one mutex, plus a mount oracle
//!     consulted once per path.
//!
//! Reconciliation
//! - A path may already be mounted before the counter first hears of it,
//!   e.g. by a previous run of the daemon. The first increment or decrement
//!   of a path asks the oracle; a mounted path starts with one implicit
//!   reference, so the new caller's release does not unmount it from under
//!   the earlier owner.
//! - Each path is reconciled exactly once. Later changes in the real mount
//!   state are not observed.
//! - Oracle failures are logged and treated as "not mounted". Callers always
//!   get a count back.
//!
//! Constraints
//! - Thread-safe: `RefCounter<O>` is `Send + Sync` when `O` is.
//! - A single lock covers all paths; the oracle runs while it is held, so a
//!   slow first-touch query delays operations on unrelated paths.
//! - Entries are never evicted; memory grows with the set of distinct paths.
//! - Counts are signed and not floored: an unmatched decrement goes negative.
//!
//! Reentrancy policy
//! - An oracle must not call back into the counter that is querying it.
//!   Debug builds detect this on the calling thread and panic rather than
//!   deadlock; release builds carry no check.
//!
//! Overflow semantics
//! - Counts are `i64`; overflow is not expected and not checked beyond the
//!   usual debug-build arithmetic checks.
//!
//! Notes and non-goals
//! - Does not mount, unmount, or validate paths. Paths are opaque strings
//!   compared byte for byte.
//! - No global instance: construct a counter and share it by reference or
//!   `Arc`.

mod oracle;
mod path_table;
mod ref_counter;
mod reentrancy;

// Public surface
pub use oracle::{from_fn, FromFn, MountCheckError, MountInfo, MountOracle, SELF_MOUNTINFO};
pub use ref_counter::RefCounter;
