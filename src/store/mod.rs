//! Persisted per-post synchronization state.
//!
//! A `PostStore` holds one `SyncedPost` per local post. Records are created
//! lazily by the first `update` touching them and never deleted here.
//!
//! `update` is the read-modify-write primitive: the closure sees the current
//! record and its changes are written back as a single save. Callers that
//! mutate a post from several components (publish, webhook, refresh) go
//! through `update` so no component overwrites another's fields with a stale
//! copy.

mod file;
mod memory;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::{PostId, SyncedPost, TopicId};

pub use file::FileStore;
pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("corrupt post record at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Another process held the record lock for longer than the wait bound.
    #[error("record lock {0} is busy")]
    Locked(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

pub trait PostStore: Send + Sync {
    /// Returns the record for `id`, if one exists.
    fn load(&self, id: PostId) -> Result<Option<SyncedPost>>;

    /// Replaces the record for `post.local_id`.
    fn save(&self, post: &SyncedPost) -> Result<()>;

    /// Applies `f` to the record for `id` (a fresh one if absent) and
    /// persists the result. Returns the record as written.
    fn update(&self, id: PostId, f: &mut dyn FnMut(&mut SyncedPost)) -> Result<SyncedPost>;

    /// Every stored record, ordered by local id.
    fn all(&self) -> Result<Vec<SyncedPost>>;

    /// The lowest-id post linked to `topic`.
    fn find_by_topic(&self, topic: TopicId) -> Result<Option<SyncedPost>> {
        Ok(self
            .all()?
            .into_iter()
            .find(|p| p.remote_topic_id == Some(topic)))
    }

    /// Posts whose title equals `title` ignoring case, ordered by local id.
    fn find_by_title(&self, title: &str) -> Result<Vec<SyncedPost>> {
        let wanted = title.trim().to_lowercase();
        Ok(self
            .all()?
            .into_iter()
            .filter(|p| p.title.trim().to_lowercase() == wanted)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Behaviour every implementation must share.
    fn exercise_store(store: &dyn PostStore) {
        assert!(store.load(PostId(1)).unwrap().is_none());

        let created = store
            .update(PostId(1), &mut |p| {
                p.title = "Hello World".to_string();
                p.remote_topic_id = Some(TopicId(7));
            })
            .unwrap();
        assert_eq!(created.local_id, PostId(1));
        assert_eq!(store.load(PostId(1)).unwrap(), Some(created.clone()));

        let mut second = SyncedPost::new(PostId(2), "hello world");
        second.remote_topic_id = Some(TopicId(7));
        store.save(&second).unwrap();

        let ids: Vec<_> = store.all().unwrap().iter().map(|p| p.local_id).collect();
        assert_eq!(ids, vec![PostId(1), PostId(2)]);

        assert_eq!(
            store.find_by_topic(TopicId(7)).unwrap().map(|p| p.local_id),
            Some(PostId(1))
        );
        assert!(store.find_by_topic(TopicId(8)).unwrap().is_none());
        assert_eq!(store.find_by_title("HELLO world").unwrap().len(), 2);
        assert!(store.find_by_title("Hello").unwrap().is_empty());

        let updated = store
            .update(PostId(2), &mut |p| {
                p.raise_comments_count(3);
            })
            .unwrap();
        assert_eq!(updated.comments_count, 3);
        assert_eq!(updated.title, "hello world");
    }

    #[test]
    fn memory_store_contract() {
        exercise_store(&MemoryStore::new());
    }

    #[test]
    fn file_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        exercise_store(&FileStore::open(dir.path()).unwrap());
    }
}
