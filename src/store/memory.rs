use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::{PostStore, Result};
use crate::types::{PostId, SyncedPost};

/// Volatile store shared by every clone.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    posts: Arc<Mutex<BTreeMap<PostId, SyncedPost>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn posts(&self) -> std::sync::MutexGuard<'_, BTreeMap<PostId, SyncedPost>> {
        self.posts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PostStore for MemoryStore {
    fn load(&self, id: PostId) -> Result<Option<SyncedPost>> {
        Ok(self.posts().get(&id).cloned())
    }

    fn save(&self, post: &SyncedPost) -> Result<()> {
        self.posts().insert(post.local_id, post.clone());
        Ok(())
    }

    fn update(&self, id: PostId, f: &mut dyn FnMut(&mut SyncedPost)) -> Result<SyncedPost> {
        let mut posts = self.posts();
        let post = posts
            .entry(id)
            .or_insert_with(|| SyncedPost::new(id, String::new()));
        f(post);
        Ok(post.clone())
    }

    fn all(&self) -> Result<Vec<SyncedPost>> {
        Ok(self.posts().values().cloned().collect())
    }
}
