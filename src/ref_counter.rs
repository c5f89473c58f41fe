//! RefCounter: per-path mount reference counts behind one lock, reconciled
//! against the mount oracle on first touch.

use crate::oracle::{MountInfo, MountOracle};
use crate::path_table::PathTable;
use crate::reentrancy::DebugReentrancy;
use log::{debug, warn};
use parking_lot::Mutex;

#[derive(Debug, Default, Clone, Copy)]
struct Entry {
    // Set on the first increment/decrement; never cleared.
    reconciled: bool,
    count: i64,
}

/// Counts how many callers currently need each path mounted.
///
/// The first time a path is incremented or decremented, the oracle is asked
/// whether it is already mounted; if so, that mount is counted as one extra
/// reference. The oracle is never asked about the same path again.
///
/// All paths share one lock, and the oracle runs while it is held.
pub struct RefCounter<O = MountInfo> {
    table: Mutex<PathTable<Entry>>,
    oracle: O,
    reentrancy: DebugReentrancy,
}

impl RefCounter<MountInfo> {
    /// Empty counter checking `/proc/self/mountinfo`.
    pub fn new() -> Self {
        Self::with_oracle(MountInfo::new())
    }
}

impl Default for RefCounter<MountInfo> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: MountOracle> RefCounter<O> {
    pub fn with_oracle(oracle: O) -> Self {
        Self {
            table: Mutex::new(PathTable::new()),
            oracle,
            reentrancy: DebugReentrancy::new(),
        }
    }

    /// Register one more user of `path` and return the new count.
    pub fn increment(&self, path: &str) -> i64 {
        self.adjust(path, 1)
    }

    /// Release one user of `path` and return the new count. The result is
    /// not floored: releasing a path that was never acquired goes negative.
    pub fn decrement(&self, path: &str) -> i64 {
        self.adjust(path, -1)
    }

    fn adjust(&self, path: &str, delta: i64) -> i64 {
        let _g = self.reentrancy.enter();
        let mut table = self.table.lock();
        let entry = table.get_or_insert_with(path, Entry::default);
        if !entry.reconciled {
            entry.reconciled = true;
            if self.already_mounted(path) {
                entry.count += 1;
            }
        }
        entry.count += delta;
        entry.count
    }

    fn already_mounted(&self, path: &str) -> bool {
        match self.oracle.is_mounted(path) {
            Ok(mounted) => {
                debug!("reconciled {path}: mounted={mounted}");
                mounted
            }
            Err(err) => {
                warn!("mount check for {path} failed, treating as unmounted: {err}");
                false
            }
        }
    }

    /// Current count for `path`, or `None` if it was never incremented or
    /// decremented. Does not consult the oracle.
    pub fn count(&self, path: &str) -> Option<i64> {
        let _g = self.reentrancy.enter();
        let table = self.table.lock();
        let h = table.find(path)?;
        table.get(h).map(|e| e.count)
    }

    pub fn contains(&self, path: &str) -> bool {
        let _g = self.reentrancy.enter();
        self.table.lock().contains_key(path)
    }

    /// Number of tracked paths. Paths are never forgotten, so this only grows.
    pub fn len(&self) -> usize {
        let _g = self.reentrancy.enter();
        self.table.lock().len()
    }
    pub fn is_empty(&self) -> bool {
        let _g = self.reentrancy.enter();
        self.table.lock().is_empty()
    }

    /// Copy of every tracked path and its count, in no particular order.
    pub fn snapshot(&self) -> Vec<(String, i64)> {
        let _g = self.reentrancy.enter();
        self.table
            .lock()
            .iter()
            .map(|(_h, path, e)| (path.to_owned(), e.count))
            .collect()
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }
}

impl<O> core::fmt::Debug for RefCounter<O> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // try_lock: formatting from inside an oracle must not deadlock.
        match self.table.try_lock() {
            Some(t) => f.debug_struct("RefCounter").field("paths", &t.len()).finish(),
            None => f.debug_struct("RefCounter").finish_non_exhaustive(),
        }
    }
}
