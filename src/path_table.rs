//! PathTable: insert-only structural layer keyed by path strings, with stable handles.

use core::hash::BuildHasher;
use hashbrown::HashTable;
use slotmap::{DefaultKey, SlotMap};
use std::collections::hash_map::RandomState;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Handle(DefaultKey);

impl Handle {
    pub(crate) fn new(k: DefaultKey) -> Self {
        Handle(k)
    }
    pub(crate) fn raw_handle(&self) -> DefaultKey {
        self.0
    }
}

#[derive(Debug)]
struct Slot<V> {
    path: String,
    value: V,
    hash: u64,
}

/// Path-keyed storage. Slots are never removed, so a handle stays valid for
/// the lifetime of the table.
pub struct PathTable<V, S = RandomState> {
    hasher: S,
    index: HashTable<DefaultKey>,
    slots: SlotMap<DefaultKey, Slot<V>>,
}

impl<V> PathTable<V> {
    pub fn new() -> Self {
        Self::with_hasher(Default::default())
    }
}

impl<V> Default for PathTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, S> PathTable<V, S>
where
    S: BuildHasher,
{
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            hasher,
            index: HashTable::new(),
            slots: SlotMap::with_key(),
        }
    }

    fn make_hash(&self, path: &str) -> u64 {
        self.hasher.hash_one(path)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn find(&self, path: &str) -> Option<Handle> {
        let hash = self.make_hash(path);
        self.index
            .find(hash, |&k| {
                self.slots
                    .get(k)
                    .map(|s| s.path == path)
                    .unwrap_or(false)
            })
            .map(|&k| Handle::new(k))
    }

    pub fn contains_key(&self, path: &str) -> bool {
        self.find(path).is_some()
    }

    pub fn get(&self, h: Handle) -> Option<&V> {
        self.slots.get(h.raw_handle()).map(|s| &s.value)
    }

    /// Return the value stored for `path`, inserting `default()` first if the
    /// path has never been seen. The key is only copied on insert.
    pub fn get_or_insert_with<F>(&mut self, path: &str, default: F) -> &mut V
    where
        F: FnOnce() -> V,
    {
        let hash = self.make_hash(path);
        let k = match self.index.entry(
            hash,
            |&kk| self.slots.get(kk).map(|s| s.path == path).unwrap_or(false),
            |&kk| self.slots.get(kk).map(|s| s.hash).unwrap_or(0),
        ) {
            hashbrown::hash_table::Entry::Occupied(o) => *o.get(),
            hashbrown::hash_table::Entry::Vacant(v) => {
                let slot = Slot {
                    path: path.to_owned(),
                    value: default(),
                    hash,
                };
                let k = self.slots.insert(slot);
                let _ = v.insert(k);
                k
            }
        };
        &mut self.slots[k].value
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, &str, &V)> {
        self.slots
            .iter()
            .map(|(k, s)| (Handle::new(k), s.path.as_str(), &s.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::{BTreeSet, HashMap};

    #[test]
    fn insert_once_then_reuse() {
        let mut t: PathTable<i32> = PathTable::new();
        *t.get_or_insert_with("/var/lib/a", || 1) += 10;
        // Second call must not run the constructor.
        let v = t.get_or_insert_with("/var/lib/a", || panic!("already present"));
        assert_eq!(*v, 11);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn find_contains_parity() {
        let mut t: PathTable<i32> = PathTable::new();
        for (i, p) in ["/a", "/b", "/c"].iter().enumerate() {
            t.get_or_insert_with(p, || i as i32);
        }
        for p in ["/a", "/b", "/c"] {
            assert!(t.find(p).is_some());
            assert!(t.contains_key(p));
        }
        for p in ["/x", "/a/", ""] {
            assert!(t.find(p).is_none());
            assert!(!t.contains_key(p));
        }
    }

    #[test]
    fn handles_stay_valid_across_inserts() {
        let mut t: PathTable<i32> = PathTable::new();
        t.get_or_insert_with("/first", || 7);
        let h = t.find("/first").unwrap();
        for i in 0..1000 {
            t.get_or_insert_with(&format!("/p{i}"), || i);
        }
        assert_eq!(t.get(h), Some(&7));
        assert_eq!(t.find("/first"), Some(h));
    }

    #[test]
    fn iteration_yields_each_path_once() {
        let mut t: PathTable<()> = PathTable::new();
        for p in ["/a", "/b", "/a", "/c", "/b"] {
            t.get_or_insert_with(p, || ());
        }
        let seen: BTreeSet<&str> = t.iter().map(|(_h, p, _v)| p).collect();
        assert_eq!(seen, BTreeSet::from(["/a", "/b", "/c"]));
        assert_eq!(t.iter().count(), t.len());
    }

    /// Every path lands in the same bucket; equality alone must resolve lookups.
    #[test]
    fn collision_handling_with_const_hasher() {
        #[derive(Clone, Default)]
        struct ConstBuildHasher;
        struct ConstHasher;
        impl BuildHasher for ConstBuildHasher {
            type Hasher = ConstHasher;
            fn build_hasher(&self) -> Self::Hasher {
                ConstHasher
            }
        }
        impl core::hash::Hasher for ConstHasher {
            fn write(&mut self, _bytes: &[u8]) {}
            fn finish(&self) -> u64 {
                0
            }
        }

        let mut t: PathTable<i32, ConstBuildHasher> = PathTable::with_hasher(ConstBuildHasher);
        *t.get_or_insert_with("/a", || 0) += 1;
        *t.get_or_insert_with("/b", || 0) += 2;
        *t.get_or_insert_with("/a", || 0) += 3;

        assert_eq!(t.len(), 2);
        assert_eq!(t.get(t.find("/a").unwrap()), Some(&4));
        assert_eq!(t.get(t.find("/b").unwrap()), Some(&2));
        assert!(t.find("/c").is_none());
    }

    // Model check against std HashMap: inserts are idempotent per path,
    // lookups agree, and the table never shrinks.
    proptest! {
        #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
        #[test]
        fn prop_matches_hashmap_model(ops in proptest::collection::vec(("/[a-c]{0,2}", -3i32..=3), 1..80)) {
            let mut sut: PathTable<i32> = PathTable::new();
            let mut model: HashMap<String, i32> = HashMap::new();

            for (path, delta) in ops {
                let before = sut.len();
                *sut.get_or_insert_with(&path, || 0) += delta;
                *model.entry(path.clone()).or_insert(0) += delta;

                prop_assert!(sut.len() >= before);
                prop_assert_eq!(sut.len(), model.len());
                let h = sut.find(&path);
                prop_assert!(h.is_some());
                prop_assert_eq!(sut.get(h.unwrap()), model.get(&path));
            }

            for (_h, path, v) in sut.iter() {
                prop_assert_eq!(Some(v), model.get(path));
            }
        }
    }
}
