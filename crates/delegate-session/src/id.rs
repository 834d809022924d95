//! Session id allocation.

use std::sync::atomic::{AtomicU64, Ordering};

use delegate_protocol::SessionId;

/// Issues unique, strictly increasing session ids.
///
/// Lock-free: concurrent callers each get a distinct value from one
/// atomic counter. At 64 bits there is no wraparound to plan for within
/// a process lifetime.
#[derive(Debug, Default)]
pub struct SessionIdGenerator {
    next: AtomicU64,
}

impl SessionIdGenerator {
    /// Creates a generator whose first id is 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a generator whose first id is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Returns a fresh id, greater than every id returned before it.
    pub fn next_id(&self) -> SessionId {
        SessionId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the id the next call to [`next_id`](Self::next_id) would
    /// produce, without consuming it.
    pub fn peek(&self) -> SessionId {
        SessionId(self.next.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_next_id_starts_at_zero() {
        let ids = SessionIdGenerator::new();
        assert_eq!(ids.next_id(), SessionId(0));
        assert_eq!(ids.next_id(), SessionId(1));
    }

    #[test]
    fn test_starting_at_sets_first_id() {
        let ids = SessionIdGenerator::starting_at(500);
        assert_eq!(ids.next_id(), SessionId(500));
    }

    #[test]
    fn test_peek_does_not_consume() {
        let ids = SessionIdGenerator::new();
        assert_eq!(ids.peek(), SessionId(0));
        assert_eq!(ids.peek(), SessionId(0));
        ids.next_id();
        assert_eq!(ids.peek(), SessionId(1));
    }

    #[test]
    fn test_next_id_concurrent_callers_never_collide() {
        let ids = Arc::new(SessionIdGenerator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || {
                    (0..1000).map(|_| ids.next_id()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            let batch = handle.join().unwrap();
            // Each thread sees its own ids strictly increasing.
            assert!(batch.windows(2).all(|w| w[0] < w[1]));
            for id in batch {
                assert!(seen.insert(id), "id {id} issued twice");
            }
        }
        assert_eq!(seen.len(), 8000);
        assert_eq!(ids.peek(), SessionId(8000));
    }
}
