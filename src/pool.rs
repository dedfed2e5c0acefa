use std::collections::HashMap;
use std::hash::Hash;

use crate::registry::{AllocateId, ObjectId};

#[derive(Debug, Clone)]
pub(crate) struct PoolEntry<V> {
    pub id: ObjectId,
    /// Resource name used in content streams, e.g. `F3`.
    pub name: String,
    pub value: V,
}

/// Deduplicating map from a semantic key to a pre-allocated indirect object.
///
/// The object id and resource name are fixed on first use; the object body is
/// written later, when the pool is flushed.
pub(crate) struct ResourcePool<K, V> {
    prefix: &'static str,
    entries: Vec<PoolEntry<V>>,
    index: HashMap<K, usize>,
}

impl<K: Eq + Hash, V> ResourcePool<K, V> {
    pub(crate) fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub(crate) fn get(&self, key: &K) -> Option<&PoolEntry<V>> {
        self.index.get(key).map(|&slot| &self.entries[slot])
    }

    pub(crate) fn get_or_create<A, F>(&mut self, key: K, ids: &mut A, factory: F) -> &mut PoolEntry<V>
    where
        A: AllocateId,
        F: FnOnce() -> V,
    {
        let existing = self.index.get(&key).copied();
        let slot = match existing {
            Some(slot) => slot,
            None => self.insert(key, ids.allocate(), factory()),
        };
        &mut self.entries[slot]
    }

    fn insert(&mut self, key: K, id: ObjectId, value: V) -> usize {
        let slot = self.entries.len();
        self.entries.push(PoolEntry {
            id,
            name: format!("{}{}", self.prefix, slot + 1),
            value,
        });
        self.index.insert(key, slot);
        slot
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `/Name N 0 R` pairs in first-use order, for the shared resources dictionary.
    pub(crate) fn resource_entries(&self) -> String {
        self.entries
            .iter()
            .map(|entry| format!("/{} {}", entry.name, entry.id.reference()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Takes every entry out for flushing; the pool must not be used afterwards.
    pub(crate) fn drain(&mut self) -> Vec<PoolEntry<V>> {
        self.index.clear();
        std::mem::take(&mut self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(u32);

    impl AllocateId for Counter {
        fn allocate(&mut self) -> ObjectId {
            self.0 += 1;
            ObjectId::from_raw(self.0)
        }
    }

    #[test]
    fn same_key_returns_same_entry_without_allocating() {
        let mut ids = Counter(10);
        let mut pool: ResourcePool<u16, u16> = ResourcePool::new("GS");
        let mut built = 0;
        let first = pool
            .get_or_create(500, &mut ids, || {
                built += 1;
                500
            })
            .id;
        let again = pool
            .get_or_create(500, &mut ids, || {
                built += 1;
                500
            })
            .id;
        assert_eq!(first, again);
        assert_eq!(built, 1);
        assert_eq!(ids.0, 11);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn names_follow_first_use_order() {
        let mut ids = Counter(0);
        let mut pool: ResourcePool<String, ()> = ResourcePool::new("F");
        pool.get_or_create("cmr10".to_string(), &mut ids, || ());
        pool.get_or_create("cmbx12".to_string(), &mut ids, || ());
        pool.get_or_create("cmr10".to_string(), &mut ids, || ());
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.resource_entries(), "/F1 1 0 R /F2 2 0 R");
    }

    #[test]
    fn drain_empties_the_pool() {
        let mut ids = Counter(0);
        let mut pool: ResourcePool<&str, u8> = ResourcePool::new("Im");
        pool.get_or_create("a.png", &mut ids, || 1);
        let entries = pool.drain();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Im1");
        assert!(pool.is_empty());
        assert!(pool.get(&"a.png").is_none());
    }
}
