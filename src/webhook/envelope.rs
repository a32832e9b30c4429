//! Inbound webhook deliveries.

use serde::Deserialize;

use crate::types::TopicId;

pub const EVENT_TYPE_HEADER: &str = "X-Discourse-Event-Type";
pub const EVENT_HEADER: &str = "X-Discourse-Event";

/// One webhook delivery as received: the raw body plus the headers the
/// receiver acts on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteEventEnvelope {
    pub body: Vec<u8>,
    pub signature: Option<String>,
    /// Event family, e.g. `post` or `ping`.
    pub event_type: Option<String>,
    /// Specific event, e.g. `post_created`.
    pub event: Option<String>,
}

/// What a delivery is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Post,
    Ping,
    Other(String),
}

impl RemoteEventEnvelope {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        RemoteEventEnvelope {
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn with_event(mut self, event_type: impl Into<String>, event: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self.event = Some(event.into());
        self
    }

    /// Classifies the delivery from its headers. Deliveries without an event
    /// type header are treated as post events.
    pub fn kind(&self) -> EventKind {
        if self.event.as_deref() == Some("ping") {
            return EventKind::Ping;
        }
        match self.event_type.as_deref().map(str::trim) {
            None | Some("") | Some("post") => EventKind::Post,
            Some("ping") => EventKind::Ping,
            Some(other) => EventKind::Other(other.to_string()),
        }
    }

    /// Parses the body of a post event.
    pub fn parse_post(&self) -> Result<PostEvent, serde_json::Error> {
        let payload: PostEventPayload = serde_json::from_slice(&self.body)?;
        Ok(payload.post)
    }
}

#[derive(Debug, Deserialize)]
struct PostEventPayload {
    post: PostEvent,
}

/// The fields of a post event the receiver uses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PostEvent {
    pub topic_id: TopicId,
    pub post_number: u64,
    #[serde(default)]
    pub topic_title: String,
}

impl PostEvent {
    /// Replies implied by this post: the first post is the topic itself.
    pub fn reply_count(&self) -> u64 {
        self.post_number.saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_post_event() {
        let envelope = RemoteEventEnvelope::new(
            r#"{"post":{"id":99,"topic_id":7,"post_number":3,"topic_title":"Hello","raw":"hi"}}"#,
        );
        let event = envelope.parse_post().unwrap();
        assert_eq!(
            event,
            PostEvent {
                topic_id: TopicId(7),
                post_number: 3,
                topic_title: "Hello".to_string(),
            }
        );
        assert_eq!(event.reply_count(), 2);
    }

    #[test]
    fn rejects_body_without_post() {
        assert!(RemoteEventEnvelope::new(r#"{"ping":"OK"}"#).parse_post().is_err());
        assert!(RemoteEventEnvelope::new("not json").parse_post().is_err());
    }

    #[test]
    fn first_post_implies_no_replies() {
        let event = PostEvent {
            topic_id: TopicId(1),
            post_number: 1,
            topic_title: String::new(),
        };
        assert_eq!(event.reply_count(), 0);
    }

    #[test]
    fn kind_from_headers() {
        let base = RemoteEventEnvelope::new("{}");
        assert_eq!(base.kind(), EventKind::Post);
        assert_eq!(
            base.clone().with_event("post", "post_created").kind(),
            EventKind::Post
        );
        assert_eq!(base.clone().with_event("ping", "ping").kind(), EventKind::Ping);
        assert_eq!(
            base.with_event("topic", "topic_created").kind(),
            EventKind::Other("topic".to_string())
        );
    }
}
