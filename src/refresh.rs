//! Lazy pull refresh of topic reply data.
//!
//! A post's cached topic JSON is refetched when it is older than the refresh
//! window, when refreshing is forced by configuration, or when a webhook has
//! marked the post dirty. The fetch runs under its own lock per post, distinct
//! from the publish lock, so a refresh never blocks a publish.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::classify::{Outcome, SuccessBody, send};
use crate::config::SyncConfig;
use crate::discourse::{RemoteClient, RemoteRequest};
use crate::lock::{SyncLock, with_lock};
use crate::store::{PostStore, Result};
use crate::types::{PostId, SyncedPost};

/// What `maybe_refresh` did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// The post has no remote topic.
    Unlinked,
    /// The cache is within its window and nothing asked for a refresh.
    Fresh,
    /// Another refresh of the same post is in flight.
    Skipped,
    Refreshed { comments_count: u64 },
    /// The fetch failed; the previous cache is kept.
    Failed { reason: String, message: String },
}

pub struct PullRefreshCache<C> {
    config: Arc<SyncConfig>,
    client: Arc<C>,
    store: Arc<dyn PostStore>,
    lock: Arc<dyn SyncLock>,
}

impl<C: RemoteClient + Send + Sync> PullRefreshCache<C> {
    pub fn new(
        config: Arc<SyncConfig>,
        client: Arc<C>,
        store: Arc<dyn PostStore>,
        lock: Arc<dyn SyncLock>,
    ) -> Self {
        PullRefreshCache {
            config,
            client,
            store,
            lock,
        }
    }

    pub fn lock_name(post_id: PostId) -> String {
        format!("wpdc_comments_sync_{post_id}")
    }

    /// Whether `post` should be refetched at `now`.
    pub fn is_due(&self, post: &SyncedPost, now: DateTime<Utc>) -> bool {
        if post.needs_refresh || self.config.always_refresh {
            return true;
        }
        let window = TimeDelta::from_std(self.config.refresh_window).unwrap_or(TimeDelta::MAX);
        post.last_comment_sync_at
            .is_none_or(|synced| now.signed_duration_since(synced) > window)
    }

    pub async fn maybe_refresh(&self, post_id: PostId) -> Result<RefreshOutcome> {
        self.maybe_refresh_at(post_id, Utc::now()).await
    }

    /// `maybe_refresh` with an explicit clock.
    pub async fn maybe_refresh_at(
        &self,
        post_id: PostId,
        now: DateTime<Utc>,
    ) -> Result<RefreshOutcome> {
        match self.store.load(post_id)? {
            Some(post) if post.remote_topic_id.is_none() => return Ok(RefreshOutcome::Unlinked),
            None => return Ok(RefreshOutcome::Unlinked),
            Some(post) if !self.is_due(&post, now) => return Ok(RefreshOutcome::Fresh),
            Some(_) => {}
        }

        let name = Self::lock_name(post_id);
        let locked = with_lock(self.lock.as_ref(), &name, || self.refresh_locked(post_id, now)).await;
        match locked {
            Some(result) => result,
            None => {
                debug!(post_id = %post_id, "Refresh already in flight, skipping");
                Ok(RefreshOutcome::Skipped)
            }
        }
    }

    async fn refresh_locked(&self, post_id: PostId, now: DateTime<Utc>) -> Result<RefreshOutcome> {
        // Re-read under the lock: a refresh that just finished makes this one
        // unnecessary.
        let Some(post) = self.store.load(post_id)? else {
            return Ok(RefreshOutcome::Unlinked);
        };
        let Some(topic_id) = post.remote_topic_id else {
            return Ok(RefreshOutcome::Unlinked);
        };
        if !self.is_due(&post, now) {
            return Ok(RefreshOutcome::Fresh);
        }

        let request = RemoteRequest::FetchTopic {
            topic_id,
            query: self.config.refresh_query.clone(),
        };
        let seen_count = post.comments_count;

        match send(self.client.as_ref(), request).await {
            Outcome::Success(SuccessBody::Topic(topic)) => {
                let fetched = topic.comments_count();
                let mut raced = false;
                let post = self.store.update(post_id, &mut |p| {
                    p.comments_raw = Some(topic.raw.clone());
                    p.last_comment_sync_at = Some(now);
                    // A webhook raised the count while the fetch was in
                    // flight; the fetched topic may predate it.
                    raced = p.comments_count != seen_count;
                    if raced {
                        p.comments_count = p.comments_count.max(fetched);
                        p.needs_refresh = true;
                    } else {
                        p.comments_count = fetched;
                        p.needs_refresh = false;
                    }
                })?;
                let comments_count = post.comments_count;
                if raced {
                    info!(post_id = %post_id, topic_id = %topic_id, fetched, comments_count, "Webhook arrived during refresh, keeping post dirty");
                } else {
                    info!(post_id = %post_id, topic_id = %topic_id, comments_count, "Refreshed topic replies");
                }
                Ok(RefreshOutcome::Refreshed { comments_count })
            }
            failure => Ok(RefreshOutcome::Failed {
                reason: failure.label().to_string(),
                message: failure.message().unwrap_or_default(),
            }),
        }
    }
}
