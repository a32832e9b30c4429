//! Discourse webhook endpoint.
//!
//! Unlike a queueing receiver, deliveries are applied before responding: the
//! work is a few store reads and one update, and Discourse retries deliveries
//! that fail. The store is synchronous file I/O, so it runs on the blocking
//! pool.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use tracing::debug;

use super::AppState;
use super::error::ApiError;
use crate::discourse::RemoteClient;
use crate::webhook::{
    EVENT_HEADER, EVENT_TYPE_HEADER, RemoteEventEnvelope, SIGNATURE_HEADER, WebhookOutcome,
};

/// Applies one webhook delivery.
///
/// - 200: accepted, with the `WebhookOutcome` as JSON (ignored events included)
/// - 400: signed but malformed body
/// - 401: missing or mismatched signature
/// - 500: no secret configured, or the store failed
pub async fn webhook_handler<C>(
    State(app_state): State<AppState<C>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookOutcome>, ApiError>
where
    C: RemoteClient + Send + Sync + 'static,
{
    let envelope = RemoteEventEnvelope {
        body: body.to_vec(),
        signature: header(&headers, SIGNATURE_HEADER),
        event_type: header(&headers, EVENT_TYPE_HEADER),
        event: header(&headers, EVENT_HEADER),
    };
    debug!(
        event_type = envelope.event_type.as_deref().unwrap_or("-"),
        event = envelope.event.as_deref().unwrap_or("-"),
        bytes = envelope.body.len(),
        "Received webhook"
    );

    let outcome =
        tokio::task::spawn_blocking(move || app_state.receiver().handle(&envelope)).await??;
    Ok(Json(outcome))
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
