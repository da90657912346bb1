//! The per-process future event list.
//!
//! [`EventQueue`] is a binary min-heap keyed by `(ts, uid)`. Each logical
//! process owns exactly one; it is accessed only by the worker currently
//! driving that process, so the queue carries no synchronisation of its
//! own.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::event::{Event, EventKey};

struct Entry {
    key: EventKey,
    event: Event,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

/// Min-heap of pending events ordered by `(ts, uid)`.
///
/// Keys are unique within a process: uids come from a monotonic counter,
/// so two entries never compare equal and pop order is fully determined.
#[derive(Default)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<Entry>>,
}

impl EventQueue {
    /// Create an empty queue.
    pub fn new() -> EventQueue {
        EventQueue {
            heap: BinaryHeap::new(),
        }
    }

    /// Insert an event under its key.
    pub fn insert(&mut self, key: EventKey, event: Event) {
        self.heap.push(Reverse(Entry { key, event }));
    }

    /// The key of the earliest pending event, if any.
    pub fn peek(&self) -> Option<EventKey> {
        self.heap.peek().map(|e| e.0.key)
    }

    /// Remove and return the earliest pending event.
    pub fn pop(&mut self) -> Option<(EventKey, Event)> {
        self.heap.pop().map(|e| (e.0.key, e.0.event))
    }

    /// Remove the entry scheduled under `key`.
    ///
    /// O(n): the heap is rebuilt without the entry. Returns `true` if an
    /// entry was removed.
    pub fn remove(&mut self, key: &EventKey) -> bool {
        let before = self.heap.len();
        self.heap.retain(|e| e.0.key != *key);
        self.heap.len() != before
    }

    /// Whether the queue holds no events.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Drain every entry in ascending key order.
    ///
    /// Used when transferring seed events to freshly partitioned
    /// processes.
    pub fn drain_ordered(&mut self) -> Vec<(EventKey, Event)> {
        let mut out = Vec::with_capacity(self.heap.len());
        while let Some(e) = self.pop() {
            out.push(e);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::NO_CONTEXT;

    fn key(ts: u64, uid: u32) -> EventKey {
        EventKey {
            ts,
            context: NO_CONTEXT,
            uid,
        }
    }

    fn ev() -> Event {
        Event::new(|| {})
    }

    #[test]
    fn pops_in_ts_then_uid_order() {
        let mut q = EventQueue::new();
        q.insert(key(5, 2), ev());
        q.insert(key(1, 7), ev());
        q.insert(key(5, 1), ev());
        q.insert(key(3, 4), ev());

        let order: Vec<(u64, u32)> = std::iter::from_fn(|| q.pop())
            .map(|(k, _)| (k.ts, k.uid))
            .collect();
        assert_eq!(order, vec![(1, 7), (3, 4), (5, 1), (5, 2)]);
    }

    #[test]
    fn peek_does_not_remove() {
        let mut q = EventQueue::new();
        q.insert(key(2, 1), ev());
        assert_eq!(q.peek(), Some(key(2, 1)));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn remove_deletes_exactly_one_key() {
        let mut q = EventQueue::new();
        q.insert(key(2, 1), ev());
        q.insert(key(2, 2), ev());
        assert!(q.remove(&key(2, 1)));
        assert!(!q.remove(&key(2, 1)));
        assert_eq!(q.pop().unwrap().0, key(2, 2));
        assert!(q.is_empty());
    }

    #[test]
    fn drain_ordered_is_sorted() {
        let mut q = EventQueue::new();
        for (ts, uid) in [(9u64, 1u32), (1, 3), (4, 2), (1, 2)] {
            q.insert(key(ts, uid), ev());
        }
        let keys: Vec<EventKey> = q.drain_ordered().into_iter().map(|(k, _)| k).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }
}
