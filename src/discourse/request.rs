//! Discourse API requests as data.
//!
//! Each outbound call is described by a `RemoteRequest` value before anything
//! is sent. The coordinator builds requests, a `RemoteClient` executes them,
//! and tests inspect exactly which requests were issued.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::RefreshQuery;
use crate::types::{CategoryId, RemotePostId, TopicId};

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

/// The operation a request performs, used to pick a response schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Pin,
    ChangeOwner,
    FeaturedLink,
    FetchTopic,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Pin => "pin",
            OperationKind::ChangeOwner => "change_owner",
            OperationKind::FeaturedLink => "featured_link",
            OperationKind::FetchTopic => "fetch_topic",
        }
    }
}

/// Body of `POST /posts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePost {
    pub embed_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub featured_link: Option<String>,
    pub title: String,
    pub raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<CategoryId>,
    pub skip_validations: bool,
    pub auto_track: bool,
    pub visible: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_username: Option<String>,
}

/// Body of `PUT /posts/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePost {
    pub title: String,
    pub post: UpdatePostRaw,
    pub skip_validations: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePostRaw {
    pub raw: String,
}

impl UpdatePost {
    pub fn new(title: impl Into<String>, raw: impl Into<String>) -> Self {
        UpdatePost {
            title: title.into(),
            post: UpdatePostRaw { raw: raw.into() },
            skip_validations: true,
        }
    }
}

/// A Discourse API request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteRequest {
    /// Create a topic by posting its first post.
    CreatePost(CreatePost),

    /// Replace the title and raw content of an existing first post.
    UpdatePost {
        post_id: RemotePostId,
        payload: UpdatePost,
    },

    /// Pin a topic until the given date.
    PinTopic { topic_id: TopicId, until: NaiveDate },

    /// Hand a post over to another user.
    ChangeOwner {
        topic_id: TopicId,
        post_id: RemotePostId,
        username: String,
    },

    /// Set the featured link shown on the topic.
    UpdateFeaturedLink {
        topic_id: TopicId,
        featured_link: String,
    },

    /// Fetch topic reply data for the refresh cache.
    FetchTopic {
        topic_id: TopicId,
        query: RefreshQuery,
    },
}

impl RemoteRequest {
    pub fn operation(&self) -> OperationKind {
        match self {
            RemoteRequest::CreatePost(_) => OperationKind::Create,
            RemoteRequest::UpdatePost { .. } => OperationKind::Update,
            RemoteRequest::PinTopic { .. } => OperationKind::Pin,
            RemoteRequest::ChangeOwner { .. } => OperationKind::ChangeOwner,
            RemoteRequest::UpdateFeaturedLink { .. } => OperationKind::FeaturedLink,
            RemoteRequest::FetchTopic { .. } => OperationKind::FetchTopic,
        }
    }

    pub fn method(&self) -> HttpMethod {
        match self {
            RemoteRequest::CreatePost(_) | RemoteRequest::ChangeOwner { .. } => HttpMethod::Post,
            RemoteRequest::UpdatePost { .. }
            | RemoteRequest::PinTopic { .. }
            | RemoteRequest::UpdateFeaturedLink { .. } => HttpMethod::Put,
            RemoteRequest::FetchTopic { .. } => HttpMethod::Get,
        }
    }

    /// Path and query string, relative to the Discourse base URL.
    pub fn path(&self) -> String {
        match self {
            RemoteRequest::CreatePost(_) => "/posts".to_string(),
            RemoteRequest::UpdatePost { post_id, .. } => format!("/posts/{post_id}"),
            RemoteRequest::PinTopic { topic_id, .. } => format!("/t/{topic_id}/status"),
            RemoteRequest::ChangeOwner { topic_id, .. } => {
                format!("/t/{topic_id}/change-owner.json")
            }
            RemoteRequest::UpdateFeaturedLink { topic_id, .. } => format!("/t/-/{topic_id}.json"),
            RemoteRequest::FetchTopic { topic_id, query } => format!(
                "/t/{topic_id}/wordpress.json?best={}&min_trust_level={}&min_score={}&min_replies={}&bypass_trust_level_score={}",
                query.best,
                query.min_trust_level,
                query.min_score,
                query.min_replies,
                query.bypass_trust_level_score
            ),
        }
    }

    /// JSON body, if the request carries one.
    pub fn body(&self) -> Option<Value> {
        match self {
            RemoteRequest::CreatePost(payload) => serde_json::to_value(payload).ok(),
            RemoteRequest::UpdatePost { payload, .. } => serde_json::to_value(payload).ok(),
            RemoteRequest::PinTopic { until, .. } => Some(json!({
                "status": "pinned",
                "enabled": "true",
                "until": until.format("%Y-%m-%d").to_string(),
            })),
            RemoteRequest::ChangeOwner {
                post_id, username, ..
            } => Some(json!({
                "username": username,
                "post_ids": [post_id],
            })),
            RemoteRequest::UpdateFeaturedLink { featured_link, .. } => Some(json!({
                "featured_link": featured_link,
            })),
            RemoteRequest::FetchTopic { .. } => None,
        }
    }

    /// Username to act as, overriding the client's default.
    pub fn api_username(&self) -> Option<&str> {
        match self {
            RemoteRequest::CreatePost(payload) => payload.api_username.as_deref(),
            _ => None,
        }
    }
}
