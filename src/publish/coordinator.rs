use std::sync::Arc;

use tracing::{debug, info, warn};

use super::payload;
use super::{
    EMBED_URL_TAKEN, PublishError, PublishOptions, PublishReport, PublishTrigger, Result,
    SideEffectFailure, SkipReason,
};
use crate::classify::{CreatedPost, NoticeKind, Outcome, SuccessBody, UpdatedPostInner, send};
use crate::config::SyncConfig;
use crate::discourse::{OperationKind, RemoteClient, RemoteRequest};
use crate::lock::{SyncLock, with_lock};
use crate::multisite::TopicSiteRouter;
use crate::store::PostStore;
use crate::types::{IssueKind, PostId, RemotePostId, SyncIssue, SyncResponse, SyncedPost};

/// Creates and updates remote topics for local posts.
pub struct PublishCoordinator<C> {
    config: Arc<SyncConfig>,
    client: Arc<C>,
    store: Arc<dyn PostStore>,
    lock: Arc<dyn SyncLock>,
    router: Option<Arc<TopicSiteRouter>>,
}

impl<C: RemoteClient + Send + Sync> PublishCoordinator<C> {
    pub fn new(
        config: Arc<SyncConfig>,
        client: Arc<C>,
        store: Arc<dyn PostStore>,
        lock: Arc<dyn SyncLock>,
    ) -> Self {
        PublishCoordinator {
            config,
            client,
            store,
            lock,
            router: None,
        }
    }

    /// Records a topic route for every created topic when multisite routing
    /// is enabled.
    pub fn with_router(mut self, router: Arc<TopicSiteRouter>) -> Self {
        self.router = Some(router);
        self
    }

    /// Name of the lock serializing publishes of `post_id`.
    pub fn lock_name(post_id: PostId) -> String {
        format!("wpdc_publish_{post_id}")
    }

    /// Publishes `post_id` with the given title and raw content.
    ///
    /// Exactly one of create or update is attempted. When another publish of
    /// the same post holds the lock this returns `Skipped` without touching
    /// the network or the store.
    pub async fn publish(
        &self,
        post_id: PostId,
        title: &str,
        raw: &str,
        options: PublishOptions,
    ) -> Result<PublishReport> {
        let name = Self::lock_name(post_id);
        let locked = with_lock(self.lock.as_ref(), &name, || {
            self.publish_locked(post_id, title, raw, &options)
        })
        .await;

        match locked {
            Some(result) => result,
            None => {
                debug!(post_id = %post_id, "Publish already in flight, skipping");
                Ok(PublishReport::Skipped {
                    reason: SkipReason::LockBusy,
                })
            }
        }
    }

    async fn publish_locked(
        &self,
        post_id: PostId,
        title: &str,
        raw: &str,
        options: &PublishOptions,
    ) -> Result<PublishReport> {
        let existing = self.store.load(post_id)?;

        if options.trigger == PublishTrigger::Automatic
            && existing.as_ref().is_some_and(|p| !p.auto_publish_allowed())
        {
            info!(post_id = %post_id, "Automatic publishing disabled for post, skipping");
            return Ok(PublishReport::Skipped {
                reason: SkipReason::AutoPublishDisabled,
            });
        }

        let linked = existing.as_ref().and_then(|p| p.remote_post_id);
        if linked.is_none() && options.embed_url.is_none() {
            return Err(PublishError::MissingEmbedUrl(post_id));
        }

        let post = self.store.update(post_id, &mut |p| {
            p.title = title.to_string();
            if let Some(category) = options.category_id {
                p.category_id = Some(category);
            }
            if let Some(tags) = &options.tags {
                p.tags = tags.clone();
            }
            if let Some(unlisted) = options.unlisted {
                p.unlisted = unlisted;
            }
            if let Some(until) = options.pin_until {
                p.pin_until = Some(until);
            }
        })?;

        match (post.remote_post_id, options.embed_url.as_deref()) {
            (Some(remote_post_id), _) => self.update(post, remote_post_id, raw, options).await,
            (None, Some(embed_url)) => self.create(post, raw, embed_url, options).await,
            (None, None) => Err(PublishError::MissingEmbedUrl(post_id)),
        }
    }

    async fn create(
        &self,
        post: SyncedPost,
        raw: &str,
        embed_url: &str,
        options: &PublishOptions,
    ) -> Result<PublishReport> {
        let author = options.author_username.as_deref();
        let request = payload::create_request(&self.config, &post, raw, embed_url, author);

        match send(self.client.as_ref(), request).await {
            Outcome::Success(SuccessBody::Created(created)) => {
                self.link_created(post, created, author).await
            }
            Outcome::Notice(kind) => self.record_notice(post.local_id, kind),
            failure => Err(self.record_create_failure(post.local_id, &failure)?),
        }
    }

    async fn link_created(
        &self,
        post: SyncedPost,
        created: CreatedPost,
        author: Option<&str>,
    ) -> Result<PublishReport> {
        let post_id = post.local_id;
        let topic_id = created.topic_id;
        let permalink = payload::permalink(&self.config.base_url, &created.topic_slug, topic_id);

        let post = self.store.update(post_id, &mut |p| {
            p.remote_post_id = Some(created.id);
            p.remote_topic_id = Some(topic_id);
            p.remote_permalink = Some(permalink.clone());
            p.category_id = created
                .category_id
                .or(p.category_id)
                .or(self.config.default_category);
            p.last_sync_response = SyncResponse::Success;
            p.last_error = None;
        })?;
        info!(post_id = %post_id, topic_id = %topic_id, permalink = %permalink, "Created Discourse topic");

        self.route_topic(&post);

        let mut side_effects = Vec::new();

        if let Some(until) = post.pin_until {
            let outcome = send(
                self.client.as_ref(),
                RemoteRequest::PinTopic { topic_id, until },
            )
            .await;
            self.store.update(post_id, &mut |p| p.pin_until = None)?;
            note_side_effect(&mut side_effects, OperationKind::Pin, &outcome);
        }

        if let Some(username) = payload::owner_change_target(&self.config, author) {
            let outcome = send(
                self.client.as_ref(),
                RemoteRequest::ChangeOwner {
                    topic_id,
                    post_id: created.id,
                    username: username.to_string(),
                },
            )
            .await;
            note_side_effect(&mut side_effects, OperationKind::ChangeOwner, &outcome);
        }

        Ok(PublishReport::Created {
            remote_post_id: created.id,
            topic_id,
            permalink,
            side_effects,
        })
    }

    async fn update(
        &self,
        post: SyncedPost,
        remote_post_id: RemotePostId,
        raw: &str,
        options: &PublishOptions,
    ) -> Result<PublishReport> {
        let request = payload::update_request(remote_post_id, &post.title, raw);

        match send(self.client.as_ref(), request).await {
            Outcome::Success(SuccessBody::Updated(updated)) => {
                self.refresh_link(post.local_id, remote_post_id, updated.post, options)
                    .await
            }
            Outcome::Notice(kind) => self.record_notice(post.local_id, kind),
            failure => {
                let issue = issue_for(&failure);
                self.store
                    .update(post.local_id, &mut |p| p.record_issue(issue.clone()))?;
                Err(remote_error(post.local_id, issue))
            }
        }
    }

    async fn refresh_link(
        &self,
        post_id: PostId,
        remote_post_id: RemotePostId,
        updated: UpdatedPostInner,
        options: &PublishOptions,
    ) -> Result<PublishReport> {
        let topic_id = updated.topic_id;
        let permalink = payload::permalink(&self.config.base_url, &updated.topic_slug, topic_id);

        self.store.update(post_id, &mut |p| {
            p.remote_topic_id = Some(topic_id);
            p.remote_permalink = Some(permalink.clone());
            if let Some(category) = updated.category_id {
                p.category_id = Some(category);
            }
            p.last_sync_response = SyncResponse::Success;
            p.last_error = None;
        })?;
        info!(post_id = %post_id, topic_id = %topic_id, "Updated Discourse topic");

        let mut side_effects = Vec::new();
        if self.config.add_featured_link {
            if let Some(featured_link) = &options.embed_url {
                let outcome = send(
                    self.client.as_ref(),
                    RemoteRequest::UpdateFeaturedLink {
                        topic_id,
                        featured_link: featured_link.clone(),
                    },
                )
                .await;
                note_side_effect(&mut side_effects, OperationKind::FeaturedLink, &outcome);
            }
        }

        Ok(PublishReport::Updated {
            remote_post_id,
            topic_id,
            permalink,
            side_effects,
        })
    }

    fn record_notice(&self, post_id: PostId, kind: NoticeKind) -> Result<PublishReport> {
        let (issue_kind, report) = match kind {
            NoticeKind::Queued => (IssueKind::QueuedTopic, PublishReport::Queued),
            NoticeKind::Deleted => (IssueKind::DeletedTopic, PublishReport::Deleted),
        };
        self.store.update(post_id, &mut |p| {
            p.record_issue(SyncIssue::notice(issue_kind));
        })?;
        info!(post_id = %post_id, notice = issue_kind.as_str(), "Recorded Discourse notice");
        Ok(report)
    }

    /// Stores a failed create and returns the error to surface.
    ///
    /// A create the remote side refused because of the post itself would fail
    /// the same way on every retry, so it is stored as permanent. An embed URL
    /// already claimed by another topic also switches publishing off for the
    /// post.
    fn record_create_failure(&self, post_id: PostId, outcome: &Outcome) -> Result<PublishError> {
        let mut issue = issue_for(outcome);
        let embed_taken = issue.message.contains(EMBED_URL_TAKEN);
        if embed_taken || issue.kind == IssueKind::BodyInvalid {
            issue.permanent = true;
        }

        self.store.update(post_id, &mut |p| {
            if embed_taken {
                p.publish_to_discourse = false;
                p.auto_publish_overridden = true;
            }
            p.record_issue(issue.clone());
        })?;

        if embed_taken {
            warn!(post_id = %post_id, "Embed URL already taken, publishing switched off for post");
        }
        Ok(remote_error(post_id, issue))
    }

    fn route_topic(&self, post: &SyncedPost) {
        let (Some(router), Some(site), Some(topic_id)) =
            (&self.router, self.config.local_site, post.remote_topic_id)
        else {
            return;
        };
        if !self.config.multisite_routing {
            return;
        }
        if let Err(e) = router.record(topic_id, site) {
            // The first webhook for the topic claims the route instead.
            warn!(topic_id = %topic_id, site_id = %site, error = %e, "Failed to record topic route");
        }
    }
}

fn issue_for(outcome: &Outcome) -> SyncIssue {
    outcome.to_issue().unwrap_or_else(|| {
        SyncIssue::transient(IssueKind::BodyInvalid, "unexpected response body")
    })
}

fn remote_error(post_id: PostId, issue: SyncIssue) -> PublishError {
    PublishError::Remote {
        post_id,
        kind: issue.kind,
        message: issue.message,
        permanent: issue.permanent,
    }
}

fn note_side_effect(
    failures: &mut Vec<SideEffectFailure>,
    operation: OperationKind,
    outcome: &Outcome,
) {
    if outcome.is_success() {
        return;
    }
    failures.push(SideEffectFailure {
        operation,
        message: outcome
            .message()
            .unwrap_or_else(|| outcome.label().to_string()),
    });
}
