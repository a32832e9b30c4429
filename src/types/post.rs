//! The persisted per-post synchronization record.
//!
//! A `SyncedPost` is the shape of the key/value metadata attached to a local
//! post. The storage engine is irrelevant here; see `store` for the
//! implementations.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{CategoryId, PostId, RemotePostId, TopicId};

/// Post type eligible for the title-matching webhook fallback.
pub const DEFAULT_POST_TYPE: &str = "post";

/// Result of the most recent publish attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncResponse {
    /// Never attempted.
    #[default]
    None,
    Success,
    Error,
}

/// Tag for a recorded publishing issue.
///
/// The first three are failures; `QueuedTopic` and `DeletedTopic` are notices
/// describing a real remote state the user should know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    TransportError,
    HttpError,
    BodyInvalid,
    QueuedTopic,
    DeletedTopic,
}

impl IssueKind {
    /// Returns the stable marker string stored alongside the post.
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::TransportError => "transport_error",
            IssueKind::HttpError => "http_error",
            IssueKind::BodyInvalid => "body_invalid",
            IssueKind::QueuedTopic => "queued_topic",
            IssueKind::DeletedTopic => "deleted_topic",
        }
    }

    /// Returns true for informational kinds that are not failures.
    pub fn is_notice(&self) -> bool {
        matches!(self, IssueKind::QueuedTopic | IssueKind::DeletedTopic)
    }
}

/// The `last_error` value of a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncIssue {
    pub kind: IssueKind,

    /// The remote message, or a description of the local failure.
    pub message: String,

    /// Set when the remote side rejected the resource itself (for example a
    /// duplicate embed URL). Automatic republishing must not retry these.
    pub permanent: bool,

    pub recorded_at: DateTime<Utc>,
}

impl SyncIssue {
    /// A failure that may succeed on a later attempt.
    pub fn transient(kind: IssueKind, message: impl Into<String>) -> Self {
        SyncIssue {
            kind,
            message: message.into(),
            permanent: false,
            recorded_at: Utc::now(),
        }
    }

    /// A failure that will not go away by retrying the same request.
    pub fn permanent(kind: IssueKind, message: impl Into<String>) -> Self {
        SyncIssue {
            permanent: true,
            ..Self::transient(kind, message)
        }
    }

    /// An informational marker (queued or deleted topic).
    pub fn notice(kind: IssueKind) -> Self {
        Self::transient(kind, kind.as_str())
    }

    pub fn is_notice(&self) -> bool {
        self.kind.is_notice()
    }
}

/// A local post and its link to a remote topic.
///
/// `remote_post_id` being set means the topic was created at least once;
/// every later publish must be an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncedPost {
    pub local_id: PostId,

    /// Local title, used by the webhook title fallback.
    pub title: String,

    pub post_type: String,

    /// Whether the author asked for this post to be published remotely.
    pub publish_to_discourse: bool,

    /// Set when the remote side permanently refused the post; automatic
    /// publishing stays off until an admin intervenes.
    pub auto_publish_overridden: bool,

    pub remote_post_id: Option<RemotePostId>,
    pub remote_topic_id: Option<TopicId>,
    pub remote_permalink: Option<String>,
    pub category_id: Option<CategoryId>,
    pub tags: Vec<String>,

    /// Publish the topic unlisted (`visible = false`).
    pub unlisted: bool,

    /// Pin the topic until this date after the next successful create.
    pub pin_until: Option<NaiveDate>,

    pub last_error: Option<SyncIssue>,
    pub last_sync_response: SyncResponse,

    pub comments_count: u64,
    pub last_comment_sync_at: Option<DateTime<Utc>>,

    /// Set by the webhook receiver when the remote topic has new replies.
    pub needs_refresh: bool,

    /// Raw topic JSON from the last successful refresh.
    pub comments_raw: Option<String>,
}

impl Default for SyncedPost {
    fn default() -> Self {
        SyncedPost::new(PostId(0), "")
    }
}

impl SyncedPost {
    /// Creates an unlinked post record.
    pub fn new(local_id: PostId, title: impl Into<String>) -> Self {
        SyncedPost {
            local_id,
            title: title.into(),
            post_type: DEFAULT_POST_TYPE.to_string(),
            publish_to_discourse: true,
            auto_publish_overridden: false,
            remote_post_id: None,
            remote_topic_id: None,
            remote_permalink: None,
            category_id: None,
            tags: Vec::new(),
            unlisted: false,
            pin_until: None,
            last_error: None,
            last_sync_response: SyncResponse::None,
            comments_count: 0,
            last_comment_sync_at: None,
            needs_refresh: false,
            comments_raw: None,
        }
    }

    /// True once the remote topic has been created.
    pub fn is_linked(&self) -> bool {
        self.remote_post_id.is_some()
    }

    /// Whether automatic publishing (for example on save) may run.
    pub fn auto_publish_allowed(&self) -> bool {
        self.publish_to_discourse
            && !self.auto_publish_overridden
            && !self.last_error.as_ref().is_some_and(|e| e.permanent)
    }

    /// Raises the comment count to `count` if it is higher than the stored one.
    ///
    /// Marks the post for refresh and returns true when the count changed.
    /// Never lowers the count.
    pub fn raise_comments_count(&mut self, count: u64) -> bool {
        if count <= self.comments_count {
            return false;
        }
        self.comments_count = count;
        self.needs_refresh = true;
        true
    }

    /// Records a failed or notice outcome.
    pub fn record_issue(&mut self, issue: SyncIssue) {
        if !issue.is_notice() {
            self.last_sync_response = SyncResponse::Error;
        }
        self.last_error = Some(issue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn new_post_is_unlinked() {
        let post = SyncedPost::new(PostId(1), "Hello");
        assert!(!post.is_linked());
        assert_eq!(post.last_sync_response, SyncResponse::None);
        assert_eq!(post.post_type, "post");
        assert!(post.publish_to_discourse);
    }

    #[test]
    fn permanent_error_blocks_auto_publish() {
        let mut post = SyncedPost::new(PostId(1), "Hello");
        assert!(post.auto_publish_allowed());

        post.record_issue(SyncIssue::transient(IssueKind::TransportError, "timeout"));
        assert!(post.auto_publish_allowed());

        post.record_issue(SyncIssue::permanent(IssueKind::HttpError, "taken"));
        assert!(!post.auto_publish_allowed());
    }

    #[test]
    fn override_flag_blocks_auto_publish() {
        let mut post = SyncedPost::new(PostId(1), "Hello");
        post.auto_publish_overridden = true;
        assert!(!post.auto_publish_allowed());
    }

    #[test]
    fn notice_does_not_flip_response_to_error() {
        let mut post = SyncedPost::new(PostId(1), "Hello");
        post.last_sync_response = SyncResponse::Success;
        post.record_issue(SyncIssue::notice(IssueKind::DeletedTopic));
        assert_eq!(post.last_sync_response, SyncResponse::Success);
        assert_eq!(post.last_error.as_ref().unwrap().message, "deleted_topic");
    }

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let post: SyncedPost = serde_json::from_str(r#"{"local_id": 5, "title": "x"}"#).unwrap();
        assert_eq!(post.local_id, PostId(5));
        assert_eq!(post.comments_count, 0);
        assert!(post.remote_post_id.is_none());
    }

    #[test]
    fn issue_kind_markers_are_snake_case() {
        let json = serde_json::to_string(&IssueKind::DeletedTopic).unwrap();
        assert_eq!(json, "\"deleted_topic\"");
        assert_eq!(IssueKind::DeletedTopic.as_str(), "deleted_topic");
    }

    proptest! {
        #[test]
        fn comments_count_never_decreases(start in 0u64..1000, events in prop::collection::vec(0u64..1000, 0..20)) {
            let mut post = SyncedPost::new(PostId(1), "t");
            post.comments_count = start;
            let mut high = start;
            for n in events {
                post.raise_comments_count(n);
                high = high.max(n);
                prop_assert_eq!(post.comments_count, high);
            }
        }
    }
}
