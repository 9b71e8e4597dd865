//! Duplicate delivery detection
//!
//! Providers retry deliveries, so the same event id can arrive more than once.
//! [`MemoryIdempotencyStore`] remembers the most recent ids up to a fixed
//! capacity and evicts the oldest first.

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;
use tracing::debug;

use crate::config::DEFAULT_DEDUP_CAPACITY;

/// Bounded in-memory record of processed event ids
#[derive(Debug)]
pub struct MemoryIdempotencyStore {
    inner: Mutex<Seen>,
    capacity: usize,
}

#[derive(Debug, Default)]
struct Seen {
    ids: HashSet<String>,
    order: VecDeque<String>,
}

impl Default for MemoryIdempotencyStore {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}

impl MemoryIdempotencyStore {
    /// Create a store remembering at most `capacity` ids (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Seen {
                ids: HashSet::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
            }),
            capacity,
        }
    }

    /// Maximum number of remembered ids
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of ids currently remembered
    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if an event id is currently remembered
    pub fn is_processed(&self, event_id: &str) -> bool {
        self.inner.lock().ids.contains(event_id)
    }

    /// Record `event_id`, returning `true` when it was already remembered.
    ///
    /// Check and insert happen under one lock, so two concurrent deliveries of
    /// the same id cannot both see it as new. Empty ids are never recorded and
    /// never reported as duplicates.
    pub fn check_and_record(&self, event_id: &str) -> bool {
        if event_id.is_empty() {
            return false;
        }

        let mut seen = self.inner.lock();
        if seen.ids.contains(event_id) {
            debug!(event_id, "Duplicate webhook event");
            return true;
        }

        if seen.order.len() >= self.capacity {
            if let Some(oldest) = seen.order.pop_front() {
                seen.ids.remove(&oldest);
            }
        }
        seen.ids.insert(event_id.to_string());
        seen.order.push_back(event_id.to_string());
        false
    }

    /// Forget an id so a redelivery is processed again.
    ///
    /// The receiver calls this when the dispatch task itself fails; deliveries
    /// whose handlers returned errors stay recorded.
    pub fn forget(&self, event_id: &str) -> bool {
        let mut seen = self.inner.lock();
        if !seen.ids.remove(event_id) {
            return false;
        }
        seen.order.retain(|id| id != event_id);
        true
    }

    /// Forget everything
    pub fn clear(&self) {
        let mut seen = self.inner.lock();
        seen.ids.clear();
        seen.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_second_delivery_is_duplicate() {
        let store = MemoryIdempotencyStore::new(10);
        assert!(!store.check_and_record("evt_1"));
        assert!(store.check_and_record("evt_1"));
        assert!(!store.check_and_record("evt_2"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_empty_id_never_duplicate() {
        let store = MemoryIdempotencyStore::new(10);
        assert!(!store.check_and_record(""));
        assert!(!store.check_and_record(""));
        assert!(store.is_empty());
    }

    #[test]
    fn test_oldest_evicted_at_capacity() {
        let store = MemoryIdempotencyStore::new(2);
        store.check_and_record("a");
        store.check_and_record("b");
        store.check_and_record("c");

        assert_eq!(store.len(), 2);
        assert!(!store.is_processed("a"));
        assert!(store.is_processed("b"));
        assert!(store.is_processed("c"));
        // evicted ids are new again
        assert!(!store.check_and_record("a"));
    }

    #[test]
    fn test_forget_and_clear() {
        let store = MemoryIdempotencyStore::new(0);
        assert_eq!(store.capacity(), 1);

        store.check_and_record("x");
        assert!(store.forget("x"));
        assert!(!store.forget("x"));
        assert!(!store.check_and_record("x"));

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_deliveries_one_winner() {
        let store = Arc::new(MemoryIdempotencyStore::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.check_and_record("evt_race"))
            })
            .collect();

        let fresh = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|dup| !dup)
            .count();
        assert_eq!(fresh, 1);
    }
}
