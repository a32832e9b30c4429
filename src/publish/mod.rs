//! Publishing local posts as Discourse topics.
//!
//! `PublishCoordinator::publish` decides between creating and updating the
//! remote topic, serializes attempts for the same post through a `SyncLock`,
//! and records every outcome on the post's `SyncedPost` record.
//!
//! A publish runs entirely inside the post's lock:
//!
//! ```text
//! lock wpdc_publish_<id>
//!   └─ read record
//!        ├─ no remote_post_id → POST /posts
//!        │     ├─ success → link record, route topic, pin, change owner
//!        │     └─ failure → record issue (permanent when the post itself was refused)
//!        └─ remote_post_id   → PUT /posts/{id}
//!              ├─ success → refresh link fields, featured link
//!              └─ deleted → record notice, keep link
//! ```
//!
//! Follow-up requests (pin, owner change, featured link) are non-fatal: their
//! failures are reported in the `PublishReport` and never undo the committed
//! link.

mod coordinator;
pub mod payload;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::discourse::OperationKind;
use crate::store::StoreError;
use crate::types::{CategoryId, IssueKind, PostId, RemotePostId, TopicId};

pub use coordinator::PublishCoordinator;

/// Remote message returned when another post already claimed the embed URL.
pub const EMBED_URL_TAKEN: &str = "Embed url has already been taken";

#[derive(Debug, Error)]
pub enum PublishError {
    /// A create needs the public URL of the local post.
    #[error("post {0} has no embed URL")]
    MissingEmbedUrl(PostId),

    /// Discourse refused or never answered the publish request.
    #[error("{} publishing post {post_id}: {message}", .kind.as_str())]
    Remote {
        post_id: PostId,
        kind: IssueKind,
        message: String,
        permanent: bool,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, PublishError>;

/// What started the publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishTrigger {
    /// An explicit publish request from an editor.
    #[default]
    Manual,
    /// A save hook; honours the post's auto-publish guard.
    Automatic,
}

/// Per-call publish settings.
///
/// `Some` values overwrite the stored per-post setting before the request is
/// built; `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishOptions {
    pub trigger: PublishTrigger,
    /// Public URL of the local post; required to create a topic.
    pub embed_url: Option<String>,
    /// Forum username of the post author.
    pub author_username: Option<String>,
    pub category_id: Option<CategoryId>,
    pub tags: Option<Vec<String>>,
    pub unlisted: Option<bool>,
    pub pin_until: Option<NaiveDate>,
}

/// A follow-up request that failed after the topic was linked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SideEffectFailure {
    pub operation: OperationKind,
    pub message: String,
}

/// Why a publish did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Another publish of the same post is in flight.
    LockBusy,
    /// Automatic publishing is switched off for the post.
    AutoPublishDisabled,
}

/// The result of a publish that did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PublishReport {
    Created {
        remote_post_id: RemotePostId,
        topic_id: TopicId,
        permalink: String,
        side_effects: Vec<SideEffectFailure>,
    },
    Updated {
        remote_post_id: RemotePostId,
        topic_id: TopicId,
        permalink: String,
        side_effects: Vec<SideEffectFailure>,
    },
    /// The new topic is waiting for moderator approval.
    Queued,
    /// The remote post was deleted out of band; the link is kept.
    Deleted,
    Skipped { reason: SkipReason },
}

impl PublishReport {
    pub fn side_effects(&self) -> &[SideEffectFailure] {
        match self {
            PublishReport::Created { side_effects, .. }
            | PublishReport::Updated { side_effects, .. } => side_effects,
            _ => &[],
        }
    }
}
