//! Discourse API client.
//!
//! `RemoteClient` is the seam between the engine and the network. The
//! production implementation, `DiscourseClient`, is a reqwest client bound to
//! one Discourse instance and authenticated with an API key.

use std::future::Future;

use tracing::debug;

use crate::config::SyncConfig;

use super::error::{RawResponse, RawResult, TransportError};
use super::request::{HttpMethod, RemoteRequest};

/// Executes Discourse requests.
///
/// Implementations must not classify responses: every HTTP status comes back
/// as `Ok(RawResponse)`, and only failures to obtain a response are `Err`.
pub trait RemoteClient {
    fn execute(&self, request: RemoteRequest) -> impl Future<Output = RawResult> + Send;
}

/// A reqwest-backed client for one Discourse instance.
#[derive(Clone)]
pub struct DiscourseClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    api_username: String,
}

impl DiscourseClient {
    /// Creates a client using the connection settings and request timeout in
    /// `config`.
    pub fn new(config: &SyncConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("discourse-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::from_reqwest(http, config))
    }

    /// Creates a client from a pre-configured reqwest client.
    pub fn from_reqwest(http: reqwest::Client, config: &SyncConfig) -> Self {
        DiscourseClient {
            http,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            api_username: config.publish_username.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl RemoteClient for DiscourseClient {
    async fn execute(&self, request: RemoteRequest) -> RawResult {
        let url = format!("{}{}", self.base_url, request.path());
        let username = request.api_username().unwrap_or(&self.api_username);

        debug!(
            operation = request.operation().as_str(),
            url = %url,
            "Sending Discourse request"
        );

        let builder = match request.method() {
            HttpMethod::Get => self.http.get(&url),
            HttpMethod::Post => self.http.post(&url),
            HttpMethod::Put => self.http.put(&url),
        }
        .header("Api-Key", &self.api_key)
        .header("Api-Username", username)
        .header("Accept", "application/json");

        let builder = match request.body() {
            Some(body) => builder.json(&body),
            None => builder,
        };

        let response = builder.send().await.map_err(TransportError::from)?;
        let status = response.status();
        let body = response.text().await.map_err(TransportError::from)?;

        Ok(RawResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("Unknown Status").to_string(),
            body,
        })
    }
}

impl std::fmt::Debug for DiscourseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscourseClient")
            .field("base_url", &self.base_url)
            .field("api_username", &self.api_username)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_api_key() {
        let config = SyncConfig::new("https://forum.example.com", "very-secret", "system");
        let client = DiscourseClient::new(&config).unwrap();
        let rendered = format!("{client:?}");
        assert!(rendered.contains("forum.example.com"));
        assert!(!rendered.contains("very-secret"));
    }

    #[test]
    fn base_url_comes_from_config() {
        let config = SyncConfig::new("https://forum.example.com/", "k", "system");
        let client = DiscourseClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "https://forum.example.com");
    }
}
