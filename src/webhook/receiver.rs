use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::envelope::{EventKind, PostEvent, RemoteEventEnvelope};
use super::fallback::TitleFallback;
use super::notify::{DeferredNotifier, UnresolvedTopic};
use super::signature::{SignatureFailure, verify_delivery};
use crate::config::SyncConfig;
use crate::multisite::{SiteRegistry, TopicSiteRouter};
use crate::persistence::RouteLogError;
use crate::store::{PostStore, StoreError};
use crate::types::{PostId, SiteId, TopicId};

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook secret is not configured")]
    MissingSecret,

    #[error("missing X-Discourse-Event-Signature header")]
    MissingSignature,

    #[error("webhook signature does not match payload")]
    SignatureMismatch,

    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("route error: {0}")]
    Route(#[from] RouteLogError),
}

impl WebhookError {
    /// Stable tag for logs and error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            WebhookError::MissingSecret => "missing_secret",
            WebhookError::MissingSignature => "missing_signature",
            WebhookError::SignatureMismatch => "signature_mismatch",
            WebhookError::InvalidPayload(_) => "invalid_payload",
            WebhookError::Store(_) => "store_error",
            WebhookError::Route(_) => "route_error",
        }
    }

    /// True for rejections of the delivery itself, as opposed to local
    /// failures while applying it.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, WebhookError::Store(_) | WebhookError::Route(_))
    }
}

impl From<SignatureFailure> for WebhookError {
    fn from(failure: SignatureFailure) -> Self {
        match failure {
            SignatureFailure::MissingSecret => WebhookError::MissingSecret,
            SignatureFailure::MissingHeader => WebhookError::MissingSignature,
            SignatureFailure::Mismatch => WebhookError::SignatureMismatch,
        }
    }
}

pub type Result<T> = std::result::Result<T, WebhookError>;

/// What an accepted delivery did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// The comment count was raised and the post marked for refresh.
    Applied {
        post_id: PostId,
        comments_count: u64,
    },
    /// The event was older than what is already known.
    Unchanged { post_id: PostId },
    /// Multisite: no site owns the topic here.
    NotRouted { topic_id: TopicId },
    /// No local post matches; a deferred notification was queued.
    Unresolved { topic_id: TopicId },
    /// Not a post event.
    Ignored { event: String },
}

/// Multisite dispatch state.
#[derive(Debug, Clone)]
struct Routing {
    router: Arc<TopicSiteRouter>,
    sites: SiteRegistry,
}

/// Verifies webhook deliveries and applies post events to local posts.
pub struct WebhookReceiver {
    config: Arc<SyncConfig>,
    store: Arc<dyn PostStore>,
    fallback: Option<Arc<dyn TitleFallback>>,
    routing: Option<Routing>,
    notifier: DeferredNotifier,
}

impl WebhookReceiver {
    pub fn new(
        config: Arc<SyncConfig>,
        store: Arc<dyn PostStore>,
        notifier: DeferredNotifier,
    ) -> Self {
        WebhookReceiver {
            config,
            store,
            fallback: None,
            routing: None,
            notifier,
        }
    }

    /// Installs the title matcher used when `webhook_match_old_topics` is on.
    pub fn with_title_fallback(mut self, fallback: Arc<dyn TitleFallback>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Enables multisite dispatch through `router`.
    pub fn with_routing(mut self, router: Arc<TopicSiteRouter>, sites: SiteRegistry) -> Self {
        self.routing = Some(Routing { router, sites });
        self
    }

    /// Handles one delivery.
    ///
    /// Authenticity is checked before anything else; a rejected delivery
    /// never touches the store.
    pub fn handle(&self, envelope: &RemoteEventEnvelope) -> Result<WebhookOutcome> {
        if let Err(failure) = verify_delivery(
            &envelope.body,
            envelope.signature.as_deref(),
            self.config.webhook_secret.as_deref(),
        ) {
            let err = WebhookError::from(failure);
            warn!(reason = err.code(), "Rejected webhook delivery");
            return Err(err);
        }

        match envelope.kind() {
            EventKind::Post => {}
            EventKind::Ping => {
                debug!("Webhook ping");
                return Ok(WebhookOutcome::Ignored {
                    event: "ping".to_string(),
                });
            }
            EventKind::Other(event) => {
                debug!(event_type = %event, "Ignoring non-post webhook event");
                return Ok(WebhookOutcome::Ignored { event });
            }
        }

        let event = envelope.parse_post().map_err(|e| {
            warn!(error = %e, "Rejected webhook with invalid payload");
            WebhookError::InvalidPayload(e.to_string())
        })?;

        match (&self.routing, self.config.multisite_routing) {
            (Some(routing), true) => self.dispatch(routing, &event),
            _ => self.resolve_and_apply(self.store.as_ref(), &event),
        }
    }

    /// Applies the event in the context of the site owning the topic.
    fn dispatch(&self, routing: &Routing, event: &PostEvent) -> Result<WebhookOutcome> {
        let topic = event.topic_id;

        if let Some(site) = routing.router.lookup(topic) {
            return match routing
                .sites
                .in_site(site, |store| self.resolve_and_apply(store, event))
            {
                Some(result) => result,
                None => {
                    warn!(topic_id = %topic, site_id = %site, "Topic routed to a site this process does not serve");
                    Ok(WebhookOutcome::NotRouted { topic_id: topic })
                }
            };
        }

        // An unrouted topic is claimed by this site only if it is ours.
        let Some(site) = self.config.local_site else {
            debug!(topic_id = %topic, "No route for webhook topic");
            return Ok(WebhookOutcome::NotRouted { topic_id: topic });
        };
        match self.resolve(self.store.as_ref(), event)? {
            Some(post_id) => {
                let owner = self.claim_route(routing, topic, site)?;
                if owner != site {
                    // Another process claimed the topic first.
                    return match routing
                        .sites
                        .in_site(owner, |store| self.resolve_and_apply(store, event))
                    {
                        Some(result) => result,
                        None => Ok(WebhookOutcome::NotRouted { topic_id: topic }),
                    };
                }
                self.apply(self.store.as_ref(), post_id, event)
            }
            None => {
                debug!(topic_id = %topic, "No route for webhook topic");
                Ok(WebhookOutcome::NotRouted { topic_id: topic })
            }
        }
    }

    /// Returns the owning site, which differs from `site` when the claim lost.
    fn claim_route(&self, routing: &Routing, topic: TopicId, site: SiteId) -> Result<SiteId> {
        let owner = routing.router.record(topic, site)?;
        if owner == site {
            info!(topic_id = %topic, site_id = %owner, "Claimed route for webhook topic");
        }
        Ok(owner)
    }

    fn resolve_and_apply(&self, store: &dyn PostStore, event: &PostEvent) -> Result<WebhookOutcome> {
        match self.resolve(store, event)? {
            Some(post_id) => self.apply(store, post_id, event),
            None => {
                info!(topic_id = %event.topic_id, title = %event.topic_title, "No local post for webhook topic");
                self.notifier.record(UnresolvedTopic {
                    topic_id: event.topic_id,
                    title: event.topic_title.clone(),
                    received_at: Utc::now(),
                });
                Ok(WebhookOutcome::Unresolved {
                    topic_id: event.topic_id,
                })
            }
        }
    }

    /// Finds the local post for the event's topic, backfilling the topic
    /// index when the title fallback matches.
    fn resolve(&self, store: &dyn PostStore, event: &PostEvent) -> Result<Option<PostId>> {
        if let Some(post) = store.find_by_topic(event.topic_id)? {
            return Ok(Some(post.local_id));
        }

        let fallback = match &self.fallback {
            Some(fallback) if self.config.webhook_match_old_topics => fallback,
            _ => return Ok(None),
        };

        let Some(post_id) = fallback.resolve(store, event.topic_id, &event.topic_title)? else {
            return Ok(None);
        };

        store.update(post_id, &mut |p| p.remote_topic_id = Some(event.topic_id))?;
        info!(post_id = %post_id, topic_id = %event.topic_id, "Linked topic to post by title");
        Ok(Some(post_id))
    }

    fn apply(&self, store: &dyn PostStore, post_id: PostId, event: &PostEvent) -> Result<WebhookOutcome> {
        let mut raised = false;
        let post = store.update(post_id, &mut |p| {
            raised = p.raise_comments_count(event.reply_count());
        })?;

        if raised {
            info!(post_id = %post_id, comments_count = post.comments_count, "Webhook raised comment count");
            Ok(WebhookOutcome::Applied {
                post_id,
                comments_count: post.comments_count,
            })
        } else {
            debug!(post_id = %post_id, post_number = event.post_number, "Webhook event already reflected");
            Ok(WebhookOutcome::Unchanged { post_id })
        }
    }
}
