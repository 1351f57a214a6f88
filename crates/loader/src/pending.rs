//! FIFO of handles waiting to be loaded.
//!
//! The queue keeps a separate membership set so "is this handle pending?"
//! is O(1). A handle stays a member until its load has been attempted,
//! whether it succeeded or not; leaving the set is what wakes blocked
//! fetches. The queue holds no lock of its own: it lives inside the
//! loader state and is guarded, together with the cache table, by the
//! loader's mutex.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

#[derive(Debug)]
pub struct PendingQueue<K> {
    /// Load order. May hold the same handle more than once.
    order: VecDeque<K>,
    /// Handles whose load has not been attempted yet.
    members: HashSet<K>,
}

impl<K: Hash + Eq + Clone> Default for PendingQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq + Clone> PendingQueue<K> {
    pub fn new() -> Self {
        Self { order: VecDeque::new(), members: HashSet::new() }
    }

    /// Appends `key` and marks it pending.
    ///
    /// Returns `true` if the handle was not already pending.
    pub fn push(&mut self, key: K) -> bool {
        let fresh = self.members.insert(key.clone());
        self.order.push_back(key);
        fresh
    }

    /// Takes the next handle to load. Membership is left untouched.
    pub fn pop_front(&mut self) -> Option<K> {
        self.order.pop_front()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.members.contains(key)
    }

    /// Clears the pending mark after a load attempt.
    ///
    /// Returns `true` if the handle was a member.
    pub fn settle(&mut self, key: &K) -> bool {
        self.members.remove(key)
    }

    /// Number of queued entries, counting duplicates.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of distinct pending handles.
    pub fn pending_count(&self) -> usize {
        self.members.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.order.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut queue = PendingQueue::new();
        queue.push("h1");
        queue.push("h2");
        queue.push("h3");

        assert_eq!(queue.pop_front(), Some("h1"));
        assert_eq!(queue.pop_front(), Some("h2"));
        assert_eq!(queue.pop_front(), Some("h3"));
        assert_eq!(queue.pop_front(), None);
    }

    #[test]
    fn test_duplicates_queue_twice_but_mark_once() {
        let mut queue = PendingQueue::new();
        assert!(queue.push("a"));
        assert!(!queue.push("a"));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pending_count(), 1);
    }

    #[test]
    fn test_membership_survives_pop_until_settled() {
        let mut queue = PendingQueue::new();
        queue.push("a");
        let key = queue.pop_front().unwrap();
        assert!(queue.contains(&key));
        assert!(queue.settle(&key));
        assert!(!queue.contains(&key));
        assert!(!queue.settle(&key));
        assert!(queue.is_empty());
    }
}
