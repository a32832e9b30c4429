//! Title matching for topics published before the topic index existed.
//!
//! Matching by title is a heuristic. Two local posts can share a title, and a
//! remote title can be edited, so the strategy sits behind a trait that
//! deployments can replace.

use tracing::warn;

use crate::store::{PostStore, Result};
use crate::types::{DEFAULT_POST_TYPE, PostId, TopicId};

pub trait TitleFallback: Send + Sync {
    /// Picks the local post that a remote topic titled `title` belongs to.
    fn resolve(&self, store: &dyn PostStore, topic: TopicId, title: &str)
    -> Result<Option<PostId>>;
}

/// Case-insensitive exact title match among regular posts.
///
/// Posts already linked to a different topic are never candidates. On a tie
/// the lowest local id wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactTitleFallback;

impl TitleFallback for ExactTitleFallback {
    fn resolve(
        &self,
        store: &dyn PostStore,
        topic: TopicId,
        title: &str,
    ) -> Result<Option<PostId>> {
        if title.trim().is_empty() {
            return Ok(None);
        }

        let candidates: Vec<PostId> = store
            .find_by_title(title)?
            .into_iter()
            .filter(|p| p.post_type == DEFAULT_POST_TYPE)
            .filter(|p| p.remote_topic_id.is_none_or(|t| t == topic))
            .map(|p| p.local_id)
            .collect();

        if candidates.len() > 1 {
            warn!(
                topic_id = %topic,
                title,
                candidates = candidates.len(),
                "Several posts match webhook topic title, using the oldest"
            );
        }
        Ok(candidates.first().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::SyncedPost;

    fn store_with(posts: Vec<SyncedPost>) -> MemoryStore {
        let store = MemoryStore::new();
        for post in posts {
            store.save(&post).unwrap();
        }
        store
    }

    #[test]
    fn matches_ignoring_case() {
        let store = store_with(vec![SyncedPost::new(PostId(3), "Hello World")]);
        let found = ExactTitleFallback
            .resolve(&store, TopicId(7), "hello world")
            .unwrap();
        assert_eq!(found, Some(PostId(3)));
    }

    #[test]
    fn prefix_is_not_a_match() {
        let store = store_with(vec![SyncedPost::new(PostId(3), "Hello World")]);
        assert_eq!(
            ExactTitleFallback.resolve(&store, TopicId(7), "Hello").unwrap(),
            None
        );
    }

    #[test]
    fn tie_resolves_to_lowest_id() {
        let store = store_with(vec![
            SyncedPost::new(PostId(9), "Release notes"),
            SyncedPost::new(PostId(4), "release notes"),
        ]);
        assert_eq!(
            ExactTitleFallback
                .resolve(&store, TopicId(7), "Release Notes")
                .unwrap(),
            Some(PostId(4))
        );
    }

    #[test]
    fn skips_pages_and_posts_linked_elsewhere() {
        let mut page = SyncedPost::new(PostId(1), "About");
        page.post_type = "page".to_string();
        let mut linked = SyncedPost::new(PostId(2), "About");
        linked.remote_topic_id = Some(TopicId(99));
        let store = store_with(vec![page, linked]);

        assert_eq!(
            ExactTitleFallback.resolve(&store, TopicId(7), "About").unwrap(),
            None
        );
    }

    #[test]
    fn empty_title_never_matches() {
        let store = store_with(vec![SyncedPost::new(PostId(1), "")]);
        assert_eq!(
            ExactTitleFallback.resolve(&store, TopicId(7), "  ").unwrap(),
            None
        );
    }
}
