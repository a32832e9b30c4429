//! Cross-process named locks backed by lock files.
//!
//! Each lock is a file `<dir>/<name>.lock` created with create-new semantics,
//! so exactly one process can create it. Releasing removes the file. A lock
//! file older than the staleness threshold belongs to a holder that died
//! without releasing and is reclaimed.
//!
//! Reclaiming renames the stale file to a tombstone first. Of several
//! processes racing to reclaim, only one rename finds the file; a process
//! whose rename moved a lock that was re-created in the meantime sees a fresh
//! tombstone and puts it back.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::Utc;
use tracing::{debug, warn};

use super::{LockGuard, SyncLock};
use crate::persistence::fsync::fsync_file;

/// Lock files in a directory shared by every worker.
#[derive(Debug, Clone)]
pub struct FileLock {
    dir: PathBuf,
    stale_after: Duration,
}

impl FileLock {
    pub fn new(dir: impl Into<PathBuf>, stale_after: Duration) -> Self {
        FileLock {
            dir: dir.into(),
            stale_after,
        }
    }

    /// Returns the lock file path for `name`.
    pub fn lock_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.lock"))
    }

    fn create(&self, path: &Path) -> io::Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let written = writeln!(file, "{} {}", std::process::id(), Utc::now().to_rfc3339())
            .and_then(|()| fsync_file(&file));
        if written.is_err() {
            let _ = std::fs::remove_file(path);
        }
        written
    }

    /// Takes over a stale lock file at `path`. Returns true when this call
    /// now holds the lock.
    fn reclaim(&self, path: &Path) -> bool {
        let tombstone = tombstone_path(path);
        if std::fs::rename(path, &tombstone).is_err() {
            // Another process reclaimed or released it first.
            return false;
        }

        if !self.is_stale(&tombstone) {
            // The stale file was replaced by a live lock before our rename.
            if let Err(e) = std::fs::hard_link(&tombstone, path) {
                warn!(path = %path.display(), error = %e, "Failed to restore live lock file");
            }
            let _ = std::fs::remove_file(&tombstone);
            return false;
        }

        let _ = std::fs::remove_file(&tombstone);
        self.create(path).is_ok()
    }

    fn is_stale(&self, path: &Path) -> bool {
        std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age > self.stale_after)
    }
}

fn tombstone_path(path: &Path) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".stale-{}-{nanos}", std::process::id()));
    PathBuf::from(name)
}

/// Lock names become file names; reject anything that could escape the
/// lock directory.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

impl SyncLock for FileLock {
    fn try_acquire(&self, name: &str) -> Option<LockGuard> {
        if !is_valid_name(name) {
            warn!(lock = name, "Refusing lock with unsafe name");
            return None;
        }

        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            warn!(dir = %self.dir.display(), error = %e, "Cannot create lock directory");
            return None;
        }

        let path = self.lock_path(name);
        let created = match self.create(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && self.is_stale(&path) => {
                warn!(lock = name, "Reclaiming stale lock file");
                self.reclaim(&path)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => false,
            Err(e) => {
                warn!(lock = name, error = %e, "Lock file creation failed");
                false
            }
        };

        if !created {
            debug!(lock = name, "Lock busy");
            return None;
        }

        Some(LockGuard::new(name, move || {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "Failed to remove lock file");
            }
        }))
    }
}
