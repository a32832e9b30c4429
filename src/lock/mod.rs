//! Named, non-blocking advisory locks.
//!
//! A `SyncLock` either grants a lock immediately or refuses. There is no
//! waiting, queueing or retrying: a caller that cannot acquire the lock skips
//! its work. Duplicate triggers for the same resource (a save hook firing
//! twice for one user action) collapse into a single execution.
//!
//! Locks are released when the `LockGuard` is dropped, so every exit path of
//! the critical section releases it, including early returns, panics and
//! cancellation of the enclosing future.
//!
//! Two implementations are provided:
//! - `InProcessLock`: a name set behind a mutex, for single-process deployments
//! - `FileLock`: lock files in a shared directory, for several worker processes

use std::future::Future;
use std::time::{Duration, Instant};

mod file;
mod memory;

pub use file::FileLock;
pub use memory::InProcessLock;

/// A held lock. Dropping it releases the lock.
pub struct LockGuard {
    name: String,
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl LockGuard {
    /// Creates a guard that runs `release` exactly once when dropped.
    pub fn new(name: impl Into<String>, release: impl FnOnce() + Send + Sync + 'static) -> Self {
        LockGuard {
            name: name.into(),
            release: Some(Box::new(release)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A named, non-reentrant, non-blocking advisory mutex.
pub trait SyncLock: Send + Sync {
    /// Attempts to take the lock named `name` without waiting.
    ///
    /// Returns `None` when the lock is held elsewhere or cannot be taken.
    /// A holder that tries to take the same name again also gets `None`.
    fn try_acquire(&self, name: &str) -> Option<LockGuard>;
}

/// Runs `f` while holding the lock `name`.
///
/// Returns `None` without calling `f` when the lock is unavailable.
pub async fn with_lock<L, F, Fut, T>(lock: &L, name: &str, f: F) -> Option<T>
where
    L: SyncLock + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let _guard = lock.try_acquire(name)?;
    Some(f().await)
}

/// Poll interval of `acquire_blocking`.
const RETRY_INTERVAL: Duration = Duration::from_millis(5);

/// Takes the lock `name`, polling until `timeout` elapses.
///
/// Only for short synchronous critical sections such as a single record
/// rewrite. Work that should be skipped on contention uses `with_lock`.
pub fn acquire_blocking<L>(lock: &L, name: &str, timeout: Duration) -> Option<LockGuard>
where
    L: SyncLock + ?Sized,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(guard) = lock.try_acquire(name) {
            return Some(guard);
        }
        if Instant::now() >= deadline {
            return None;
        }
        std::thread::sleep(RETRY_INTERVAL);
    }
}
