//! Keyed store of loaded GPU objects.
//!
//! Each entry carries a "flagged" marker used for eviction bookkeeping: an
//! entry is unflagged when inserted or touched, and flagged by
//! [`CacheTable::flag_all`]. Nothing evicts flagged entries automatically;
//! callers can inspect [`CacheTable::flagged_keys`] and destroy what they
//! no longer want.

use indexmap::IndexMap;
use std::hash::Hash;

#[derive(Debug)]
struct Entry<V> {
    value: V,
    flagged: bool,
}

/// Insertion-ordered map from resource handle to cached object.
#[derive(Debug)]
pub struct CacheTable<K, V> {
    entries: IndexMap<K, Entry<V>>,
}

impl<K: Hash + Eq + Clone, V> Default for CacheTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq + Clone, V> CacheTable<K, V> {
    pub fn new() -> Self {
        Self { entries: IndexMap::new() }
    }

    /// Inserts a value, replacing any previous entry for `key`.
    ///
    /// Returns the replaced value so the caller can release it.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.entries.insert(key, Entry { value, flagged: false }).map(|entry| entry.value)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Removes an entry, keeping the order of the rest.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.shift_remove(key).map(|entry| entry.value)
    }

    /// Marks an entry as still wanted. Returns `false` if absent.
    pub fn touch(&mut self, key: &K) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.flagged = false;
                true
            }
            None => false,
        }
    }

    pub fn is_flagged(&self, key: &K) -> Option<bool> {
        self.entries.get(key).map(|entry| entry.flagged)
    }

    /// Flags every entry as unwanted until touched again.
    pub fn flag_all(&mut self) {
        for entry in self.entries.values_mut() {
            entry.flagged = true;
        }
    }

    pub fn flagged_keys(&self) -> Vec<K> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.flagged)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Snapshot of all keys in insertion order.
    pub fn keys(&self) -> Vec<K> {
        self.entries.keys().cloned().collect()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values().map(|entry| &entry.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(key, entry)| (key, &entry.value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut table = CacheTable::new();
        assert!(table.insert("a", 1).is_none());
        assert_eq!(table.get(&"a"), Some(&1));
        assert!(table.contains(&"a"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_insert_replaces_without_duplicating() {
        let mut table = CacheTable::new();
        table.insert("a", 1);
        assert_eq!(table.insert("a", 2), Some(1));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&"a"), Some(&2));
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut table = CacheTable::new();
        table.insert("a", 1);
        table.insert("b", 2);
        table.insert("c", 3);
        assert_eq!(table.remove(&"b"), Some(2));
        assert_eq!(table.keys(), vec!["a", "c"]);
        assert!(table.remove(&"b").is_none());
    }

    #[test]
    fn test_flag_and_touch() {
        let mut table = CacheTable::new();
        table.insert("a", 1);
        table.insert("b", 2);
        assert_eq!(table.is_flagged(&"a"), Some(false));

        table.flag_all();
        assert_eq!(table.flagged_keys(), vec!["a", "b"]);

        assert!(table.touch(&"a"));
        assert!(!table.touch(&"missing"));
        assert_eq!(table.flagged_keys(), vec!["b"]);
        assert_eq!(table.is_flagged(&"missing"), None);
    }

    #[test]
    fn test_reinsert_clears_flag() {
        let mut table = CacheTable::new();
        table.insert("a", 1);
        table.flag_all();
        table.insert("a", 1);
        assert!(table.flagged_keys().is_empty());
    }

    #[test]
    fn test_empty_table() {
        let table: CacheTable<&str, u32> = CacheTable::default();
        assert!(table.is_empty());
        assert!(table.keys().is_empty());
        assert_eq!(table.values().count(), 0);
    }
}
