//! One JSON document per post under a directory.
//!
//! ```text
//! <dir>/
//!   <post_id>.json         # SyncedPost
//!   topics/<topic_id>.json # post id linked to the topic
//!   locks/                 # record locks held during a rewrite
//! ```
//!
//! Several processes may share a directory. Every rewrite of a record holds
//! the record's file lock from read to rename, so no writer replaces a record
//! it did not read.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::{PostStore, Result, StoreError};
use crate::lock::{FileLock, LockGuard, acquire_blocking};
use crate::persistence::{read_json, write_json_atomic};
use crate::types::{PostId, SyncedPost, TopicId};

/// How long a rewrite waits for another process's record lock.
const RECORD_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Record locks older than this belong to a crashed writer.
const RECORD_LOCK_STALE: Duration = Duration::from_secs(30);

/// Posts stored as `<dir>/<post_id>.json`, each replaced atomically.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    locks: FileLock,
    /// Serializes rewrites within this process so threads do not poll the
    /// file locks against each other.
    write: Mutex<()>,
}

impl FileStore {
    /// Opens the store, creating `dir` if needed.
    ///
    /// A directory without a topic index gets one built from its records.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let store = FileStore {
            locks: FileLock::new(dir.join("locks"), RECORD_LOCK_STALE),
            dir,
            write: Mutex::new(()),
        };
        if !store.topics_dir().exists() {
            store.rebuild_topic_index()?;
        }
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: PostId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn topics_dir(&self) -> PathBuf {
        self.dir.join("topics")
    }

    fn topic_path(&self, topic: TopicId) -> PathBuf {
        self.topics_dir().join(format!("{topic}.json"))
    }

    fn read<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        read_json(path).map_err(|e| match e.downcast::<serde_json::Error>() {
            Ok(source) => StoreError::Corrupt {
                path: path.to_path_buf(),
                source,
            },
            Err(e) => StoreError::Io(e),
        })
    }

    fn lock(&self, name: String) -> Result<LockGuard> {
        acquire_blocking(&self.locks, &name, RECORD_LOCK_TIMEOUT).ok_or(StoreError::Locked(name))
    }

    /// Writes `post` and indexes its topic. The caller holds the record lock.
    fn write_record(&self, post: &SyncedPost, previous_topic: Option<TopicId>) -> Result<()> {
        write_json_atomic(&self.path_for(post.local_id), post)?;
        if let Some(topic) = post.remote_topic_id.filter(|t| Some(*t) != previous_topic) {
            self.index_topic(topic, post.local_id)?;
        }
        Ok(())
    }

    /// Points the index entry of `topic` at `id`, unless a lower-id post
    /// still linked to the topic already holds it.
    fn index_topic(&self, topic: TopicId, id: PostId) -> Result<()> {
        let _guard = self.lock(format!("topic_{topic}"))?;
        let path = self.topic_path(topic);
        if let Some(current) = self.read::<PostId>(&path)? {
            let keep = current < id
                && self
                    .load(current)?
                    .is_some_and(|p| p.remote_topic_id == Some(topic));
            if current == id || keep {
                return Ok(());
            }
        }
        write_json_atomic(&path, &id)?;
        Ok(())
    }

    fn rebuild_topic_index(&self) -> Result<()> {
        std::fs::create_dir_all(self.topics_dir())?;
        let mut indexed = 0usize;
        for post in self.all()? {
            if let Some(topic) = post.remote_topic_id {
                self.index_topic(topic, post.local_id)?;
                indexed += 1;
            }
        }
        info!(dir = %self.dir.display(), indexed, "Built topic index");
        Ok(())
    }
}

impl PostStore for FileStore {
    fn load(&self, id: PostId) -> Result<Option<SyncedPost>> {
        self.read(&self.path_for(id))
    }

    fn save(&self, post: &SyncedPost) -> Result<()> {
        let _write = self.write.lock().unwrap_or_else(PoisonError::into_inner);
        let _guard = self.lock(format!("post_{}", post.local_id))?;
        let previous_topic = self
            .load(post.local_id)?
            .and_then(|p| p.remote_topic_id);
        self.write_record(post, previous_topic)?;
        debug!(post_id = %post.local_id, "Saved post record");
        Ok(())
    }

    fn update(&self, id: PostId, f: &mut dyn FnMut(&mut SyncedPost)) -> Result<SyncedPost> {
        let _write = self.write.lock().unwrap_or_else(PoisonError::into_inner);
        let _guard = self.lock(format!("post_{id}"))?;
        let mut post = self
            .load(id)?
            .unwrap_or_else(|| SyncedPost::new(id, String::new()));
        let previous_topic = post.remote_topic_id;
        f(&mut post);
        self.write_record(&post, previous_topic)?;
        debug!(post_id = %id, "Updated post record");
        Ok(post)
    }

    fn all(&self) -> Result<Vec<SyncedPost>> {
        let mut posts = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_record = path.extension().is_some_and(|ext| ext == "json")
                && path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .is_some_and(|s| s.parse::<u64>().is_ok());
            if !is_record {
                continue;
            }
            if let Some(post) = self.read(&path)? {
                posts.push(post);
            }
        }
        posts.sort_by_key(|p: &SyncedPost| p.local_id);
        Ok(posts)
    }

    /// Reads one index entry and one record; an entry whose post has since
    /// been relinked counts as a miss.
    fn find_by_topic(&self, topic: TopicId) -> Result<Option<SyncedPost>> {
        let Some(id) = self.read::<PostId>(&self.topic_path(topic))? else {
            return Ok(None);
        };
        Ok(self
            .load(id)?
            .filter(|p| p.remote_topic_id == Some(topic)))
    }
}
