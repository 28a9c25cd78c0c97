//! Per-owner mutation locks.
//!
//! Dependency edges never cross owners, so an owner's task set contains every
//! connected component a mutation can touch. Holding the owner's lock while
//! reloading, revalidating and committing keeps two concurrent edge
//! insertions from both passing the cycle check against stale state.

use crate::error::{Result, TaskError};
use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Default time to wait for an owner's lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Exclusive locks keyed by owner id.
#[derive(Debug)]
pub struct OwnerLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
    timeout: Duration,
}

impl Default for OwnerLocks {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}

impl OwnerLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
            timeout,
        }
    }

    /// Block until `owner_id`'s lock is free, then take it.
    ///
    /// Fails with `LockTimeout` if it stays taken for longer than the
    /// configured timeout.
    pub fn acquire(&self, owner_id: &str) -> Result<OwnerGuard<'_>> {
        let deadline = Instant::now() + self.timeout;
        let mut held = self.lock_set();

        while held.contains(owner_id) {
            let now = Instant::now();
            if now >= deadline {
                log::warn!("Timed out waiting for lock of owner {}", owner_id);
                return Err(TaskError::LockTimeout(owner_id.to_string()));
            }
            held = self
                .released
                .wait_timeout(held, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }

        held.insert(owner_id.to_string());
        Ok(OwnerGuard {
            locks: self,
            owner_id: owner_id.to_string(),
        })
    }

    /// True if someone currently holds `owner_id`'s lock.
    pub fn is_locked(&self, owner_id: &str) -> bool {
        self.lock_set().contains(owner_id)
    }

    // Poisoning is ignored: the set never holds partial updates.
    fn lock_set(&self) -> MutexGuard<'_, HashSet<String>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the owner's lock on drop.
#[derive(Debug)]
pub struct OwnerGuard<'a> {
    locks: &'a OwnerLocks,
    owner_id: String,
}

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        self.locks.lock_set().remove(&self.owner_id);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_acquire_and_release() {
        let locks = OwnerLocks::default();
        {
            let _guard = locks.acquire("alice").unwrap();
            assert!(locks.is_locked("alice"));
            assert!(!locks.is_locked("bob"));
        }
        assert!(!locks.is_locked("alice"));
    }

    #[test]
    fn test_different_owners_do_not_contend() {
        let locks = OwnerLocks::new(Duration::from_millis(10));
        let _a = locks.acquire("alice").unwrap();
        assert!(locks.acquire("bob").is_ok());
    }

    #[test]
    fn test_timeout() {
        let locks = OwnerLocks::new(Duration::from_millis(20));
        let _guard = locks.acquire("alice").unwrap();
        assert!(matches!(locks.acquire("alice"), Err(TaskError::LockTimeout(_))));
    }

    #[test]
    fn test_mutual_exclusion() {
        let locks = Arc::new(OwnerLocks::new(Duration::from_secs(10)));
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    for _ in 0..20 {
                        let _guard = locks.acquire("alice").unwrap();
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }
}
