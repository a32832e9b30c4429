//! Response classification.
//!
//! Every remote result passes through `classify` exactly once. The returned
//! `Outcome` is the only vocabulary the rest of the engine uses for remote
//! failures: the coordinator never looks at status codes, and logs and stored
//! errors are tagged from the outcome.
//!
//! | Input                                   | Outcome                  |
//! |-----------------------------------------|--------------------------|
//! | no response                             | `TransportError`         |
//! | non-2xx                                 | `HttpError`              |
//! | 2xx, empty body, create                 | `Notice(Queued)`         |
//! | 2xx, body missing fields for operation  | `BodyInvalid`            |
//! | 2xx, update with `post.deleted_at` set  | `Notice(Deleted)`        |
//! | 2xx, otherwise                          | `Success`                |

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::discourse::{OperationKind, RawResult, RemoteClient, RemoteRequest};
use crate::types::{CategoryId, IssueKind, RemotePostId, SyncIssue, TopicId};

/// Informational outcomes that are not failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// The post is waiting in the remote moderation queue.
    Queued,
    /// The remote post exists but was deleted out of band.
    Deleted,
}

/// Parsed body of a successful create.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedPost {
    pub id: RemotePostId,
    pub topic_id: TopicId,
    pub topic_slug: String,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
}

/// Parsed body of a successful update.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpdatedPost {
    pub post: UpdatedPostInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpdatedPostInner {
    pub topic_id: TopicId,
    pub topic_slug: String,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub deleted_at: Option<String>,
}

/// Parsed body of a topic fetch, plus the raw JSON for caching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicData {
    pub posts_count: u64,
    pub raw: String,
}

impl TopicData {
    /// Replies, i.e. every post except the first.
    pub fn comments_count(&self) -> u64 {
        self.posts_count.saturating_sub(1)
    }
}

#[derive(Deserialize)]
struct TopicCounts {
    posts_count: u64,
}

/// A typed success body, one schema per operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuccessBody {
    Created(CreatedPost),
    Updated(UpdatedPost),
    Topic(TopicData),
    /// Operations whose body carries nothing the engine needs.
    Ack,
}

/// The classification of one remote result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(SuccessBody),
    TransportError(String),
    HttpError { code: u16, message: String },
    BodyInvalid(String),
    Notice(NoticeKind),
}

impl Outcome {
    /// Short tag for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "success",
            Outcome::TransportError(_) => "transport_error",
            Outcome::HttpError { .. } => "http_error",
            Outcome::BodyInvalid(_) => "body_invalid",
            Outcome::Notice(NoticeKind::Queued) => "queued_topic",
            Outcome::Notice(NoticeKind::Deleted) => "deleted_topic",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Human-readable message for failures and notices.
    pub fn message(&self) -> Option<String> {
        match self {
            Outcome::Success(_) => None,
            Outcome::TransportError(m) | Outcome::BodyInvalid(m) => Some(m.clone()),
            Outcome::HttpError { code, message } => Some(format!("HTTP {code}: {message}")),
            Outcome::Notice(_) => Some(self.label().to_string()),
        }
    }

    /// The `last_error` value this outcome records, if any.
    ///
    /// All issues returned here are transient; callers upgrade them to
    /// permanent when they know the remote side rejected the resource itself.
    pub fn to_issue(&self) -> Option<SyncIssue> {
        match self {
            Outcome::Success(_) => None,
            Outcome::TransportError(m) => {
                Some(SyncIssue::transient(IssueKind::TransportError, m.clone()))
            }
            Outcome::HttpError { message, .. } => {
                Some(SyncIssue::transient(IssueKind::HttpError, message.clone()))
            }
            Outcome::BodyInvalid(m) => Some(SyncIssue::transient(IssueKind::BodyInvalid, m.clone())),
            Outcome::Notice(NoticeKind::Queued) => Some(SyncIssue::notice(IssueKind::QueuedTopic)),
            Outcome::Notice(NoticeKind::Deleted) => Some(SyncIssue::notice(IssueKind::DeletedTopic)),
        }
    }
}

/// Classifies a remote result for the given operation.
pub fn classify(result: RawResult, operation: OperationKind) -> Outcome {
    let response = match result {
        Ok(response) => response,
        Err(err) => return Outcome::TransportError(err.message),
    };

    if !response.is_success() {
        let message = extract_error_message(&response.body).unwrap_or(response.status_text);
        return Outcome::HttpError {
            code: response.status,
            message,
        };
    }

    let body = response.body.trim();
    if body.is_empty() {
        return match operation {
            OperationKind::Create => Outcome::Notice(NoticeKind::Queued),
            OperationKind::Update | OperationKind::FetchTopic => {
                Outcome::BodyInvalid("empty response body".to_string())
            }
            OperationKind::Pin | OperationKind::ChangeOwner | OperationKind::FeaturedLink => {
                Outcome::Success(SuccessBody::Ack)
            }
        };
    }

    match operation {
        OperationKind::Create => classify_create(body),
        OperationKind::Update => classify_update(body),
        OperationKind::FetchTopic => match serde_json::from_str::<TopicCounts>(body) {
            Ok(counts) => Outcome::Success(SuccessBody::Topic(TopicData {
                posts_count: counts.posts_count,
                raw: body.to_string(),
            })),
            Err(e) => Outcome::BodyInvalid(format!("topic response: {e}")),
        },
        OperationKind::Pin | OperationKind::ChangeOwner | OperationKind::FeaturedLink => {
            Outcome::Success(SuccessBody::Ack)
        }
    }
}

fn classify_create(body: &str) -> Outcome {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => return Outcome::BodyInvalid(format!("create response is not JSON: {e}")),
    };

    // Newer Discourse versions answer a queued post with a pending_post object.
    if value.get("action").and_then(Value::as_str) == Some("enqueued") {
        return Outcome::Notice(NoticeKind::Queued);
    }

    match serde_json::from_value::<CreatedPost>(value) {
        Ok(created) => Outcome::Success(SuccessBody::Created(created)),
        Err(e) => Outcome::BodyInvalid(format!("create response: {e}")),
    }
}

fn classify_update(body: &str) -> Outcome {
    match serde_json::from_str::<UpdatedPost>(body) {
        Ok(updated) if updated.post.deleted_at.is_some() => Outcome::Notice(NoticeKind::Deleted),
        Ok(updated) => Outcome::Success(SuccessBody::Updated(updated)),
        Err(e) => Outcome::BodyInvalid(format!("update response: {e}")),
    }
}

/// Extracts `errors[0]` from a Discourse error body.
fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("errors")?
        .as_array()?
        .first()?
        .as_str()
        .map(str::to_string)
}

/// Executes `request` and classifies the result, logging both.
pub async fn send<C: RemoteClient + ?Sized>(client: &C, request: RemoteRequest) -> Outcome {
    let operation = request.operation();
    debug!(operation = operation.as_str(), path = %request.path(), "Calling Discourse");

    let outcome = classify(client.execute(request).await, operation);
    match &outcome {
        Outcome::Success(_) => debug!(operation = operation.as_str(), "Discourse call succeeded"),
        Outcome::Notice(_) => debug!(
            operation = operation.as_str(),
            outcome = outcome.label(),
            "Discourse call returned a notice"
        ),
        _ => warn!(
            operation = operation.as_str(),
            outcome = outcome.label(),
            message = %outcome.message().unwrap_or_default(),
            "Discourse call failed"
        ),
    }
    outcome
}
