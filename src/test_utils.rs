//! Shared test doubles and arbitrary generators for property-based testing.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use proptest::prelude::*;
use serde_json::{Value, json};

use crate::config::SyncConfig;
use crate::discourse::{OperationKind, RawResponse, RawResult, RemoteClient, RemoteRequest};
use crate::types::{PostId, TopicId};

pub const BASE_URL: &str = "https://forum.example.com";

pub fn test_config() -> SyncConfig {
    SyncConfig::new(BASE_URL, "test-key", "system")
}

#[derive(Default)]
struct Script {
    queued: HashMap<OperationKind, VecDeque<RawResult>>,
    fallback: HashMap<OperationKind, RawResult>,
    requests: Vec<RemoteRequest>,
}

/// An in-memory `RemoteClient` that answers from a script and records every
/// request it receives.
///
/// Responses queued with `respond` are used once, in order. When the queue for
/// an operation is empty the `always` response for it is used, and failing
/// that the call is a transport error.
#[derive(Clone, Default)]
pub struct ScriptedRemote {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every response, widening race windows in concurrency tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn respond(&self, operation: OperationKind, result: RawResult) -> &Self {
        self.script
            .lock()
            .unwrap()
            .queued
            .entry(operation)
            .or_default()
            .push_back(result);
        self
    }

    pub fn respond_json(&self, operation: OperationKind, status: u16, body: Value) -> &Self {
        self.respond(operation, Ok(RawResponse::new(status, body.to_string())))
    }

    pub fn always(&self, operation: OperationKind, result: RawResult) -> &Self {
        self.script
            .lock()
            .unwrap()
            .fallback
            .insert(operation, result);
        self
    }

    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.script.lock().unwrap().requests.clone()
    }

    pub fn count(&self, operation: OperationKind) -> usize {
        self.script
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| r.operation() == operation)
            .count()
    }

    pub fn operations(&self) -> Vec<OperationKind> {
        self.script
            .lock()
            .unwrap()
            .requests
            .iter()
            .map(RemoteRequest::operation)
            .collect()
    }
}

impl RemoteClient for ScriptedRemote {
    async fn execute(&self, request: RemoteRequest) -> RawResult {
        let operation = request.operation();
        let result = {
            let mut script = self.script.lock().unwrap();
            script.requests.push(request);
            script
                .queued
                .get_mut(&operation)
                .and_then(VecDeque::pop_front)
                .or_else(|| script.fallback.get(&operation).cloned())
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        result.unwrap_or_else(|| {
            Err(crate::discourse::TransportError::new(format!(
                "no scripted response for {}",
                operation.as_str()
            )))
        })
    }
}

// ─── Canned Discourse bodies ───

pub fn created_body(post_id: u64, topic_id: u64, slug: &str) -> Value {
    json!({
        "id": post_id,
        "topic_id": topic_id,
        "topic_slug": slug,
        "category_id": 1,
        "post_number": 1,
    })
}

pub fn updated_body(topic_id: u64, slug: &str) -> Value {
    json!({
        "post": {
            "id": 42,
            "topic_id": topic_id,
            "topic_slug": slug,
            "category_id": 1,
            "deleted_at": null,
        }
    })
}

pub fn topic_body(posts_count: u64) -> Value {
    json!({
        "id": 7,
        "posts_count": posts_count,
        "participants": [],
        "posts": [],
    })
}

// ─── Strategies ───

pub fn arb_post_id() -> impl Strategy<Value = PostId> {
    (1u64..100_000).prop_map(PostId)
}

pub fn arb_topic_id() -> impl Strategy<Value = TopicId> {
    (1u64..100_000).prop_map(TopicId)
}

pub fn arb_secret() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9]{1,64}"
}

/// A delivery order of webhook post numbers, duplicates included.
pub fn arb_post_numbers() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(1u64..200, 1..30)
}
