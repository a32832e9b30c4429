//! JSON error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::publish::PublishError;
use crate::store::StoreError;
use crate::types::PostId;
use crate::webhook::WebhookError;

/// Errors returned by the HTTP handlers.
///
/// Every variant renders as `{ "error": <code>, "message": <text> }`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("post {0} not found")]
    NotFound(PostId),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Webhook(#[from] WebhookError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("request task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Publish(PublishError::MissingEmbedUrl(_)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "missing_embed_url")
            }
            ApiError::Publish(PublishError::Remote { kind, .. }) => {
                (StatusCode::BAD_GATEWAY, kind.as_str())
            }
            ApiError::Publish(PublishError::Store(_)) | ApiError::Store(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "store_error")
            }
            ApiError::Webhook(err) => {
                let status = match err {
                    WebhookError::MissingSignature | WebhookError::SignatureMismatch => {
                        StatusCode::UNAUTHORIZED
                    }
                    WebhookError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
                    WebhookError::MissingSecret
                    | WebhookError::Store(_)
                    | WebhookError::Route(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.code())
            }
            ApiError::Task(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            error!(code, error = %self, "Request failed");
        }
        let body = Json(json!({
            "error": code,
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}
