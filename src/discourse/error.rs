//! The normalized shape of a remote call's result.
//!
//! A `RemoteClient` never interprets status codes. It returns either the raw
//! HTTP exchange (`RawResponse`, any status) or a `TransportError` when the
//! request never produced a response. Interpretation belongs to the
//! classifier.

use thiserror::Error;

/// An HTTP response as received, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,

    /// Canonical reason phrase for `status` ("Not Found", ...).
    pub status_text: String,

    pub body: String,
}

impl RawResponse {
    /// Builds a response with the canonical reason phrase for `status`.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        RawResponse {
            status,
            status_text: canonical_reason(status).to_string(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The request did not reach the server or no response was read.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("transport error: {message}")]
pub struct TransportError {
    pub message: String,
    pub timed_out: bool,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        TransportError {
            message: message.into(),
            timed_out: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        TransportError {
            message: message.into(),
            timed_out: true,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::timeout(err.to_string())
        } else {
            TransportError::new(err.to_string())
        }
    }
}

/// Result of one remote call.
pub type RawResult = Result<RawResponse, TransportError>;

fn canonical_reason(status: u16) -> &'static str {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown Status")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_fills_reason_phrase() {
        assert_eq!(RawResponse::new(404, "").status_text, "Not Found");
        assert_eq!(RawResponse::new(422, "").status_text, "Unprocessable Entity");
    }

    #[test]
    fn unknown_status_has_fallback_text() {
        assert_eq!(RawResponse::new(599, "").status_text, "Unknown Status");
    }

    #[test]
    fn success_range() {
        assert!(RawResponse::new(200, "").is_success());
        assert!(RawResponse::new(204, "").is_success());
        assert!(!RawResponse::new(301, "").is_success());
        assert!(!RawResponse::new(500, "").is_success());
    }

    #[test]
    fn transport_error_display() {
        let err = TransportError::timeout("operation timed out");
        assert!(err.timed_out);
        assert_eq!(err.to_string(), "transport error: operation timed out");
    }
}
