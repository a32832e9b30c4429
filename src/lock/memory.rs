//! In-process named locks.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

use super::{LockGuard, SyncLock};

/// A set of held lock names shared by every clone.
#[derive(Debug, Clone, Default)]
pub struct InProcessLock {
    held: Arc<Mutex<HashSet<String>>>,
}

impl InProcessLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `name` is currently held.
    pub fn is_held(&self, name: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }
}

impl SyncLock for InProcessLock {
    fn try_acquire(&self, name: &str) -> Option<LockGuard> {
        let inserted = self
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string());

        if !inserted {
            trace!(lock = name, "Lock busy");
            return None;
        }

        let held = Arc::clone(&self.held);
        let owned = name.to_string();
        Some(LockGuard::new(name, move || {
            held.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&owned);
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_release() {
        let lock = InProcessLock::new();
        let guard = lock.try_acquire("a").unwrap();
        assert!(lock.is_held("a"));
        assert!(lock.try_acquire("a").is_none());

        drop(guard);
        assert!(!lock.is_held("a"));
        assert!(lock.try_acquire("a").is_some());
    }

    #[test]
    fn names_are_independent() {
        let lock = InProcessLock::new();
        let _a = lock.try_acquire("a").unwrap();
        assert!(lock.try_acquire("b").is_some());
    }

    #[test]
    fn clones_share_state() {
        let lock = InProcessLock::new();
        let clone = lock.clone();
        let _a = lock.try_acquire("a").unwrap();
        assert!(clone.try_acquire("a").is_none());
    }

    #[test]
    fn concurrent_acquire_grants_exactly_one() {
        let lock = InProcessLock::new();
        let start = Arc::new(std::sync::Barrier::new(8));
        let tried = Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = lock.clone();
                let start = start.clone();
                let tried = tried.clone();
                std::thread::spawn(move || {
                    start.wait();
                    let guard = lock.try_acquire("hot");
                    let acquired = guard.is_some();
                    // Keep the guard alive until every thread has tried.
                    tried.wait();
                    drop(guard);
                    acquired
                })
            })
            .collect();

        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|acquired| *acquired)
            .count();
        assert_eq!(granted, 1);
    }
}
