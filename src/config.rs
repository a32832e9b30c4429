//! Engine configuration.
//!
//! `SyncConfig` is built once and handed to each component at construction.
//! Values come either from code (`SyncConfig::new` plus `with_*` methods) or
//! from environment variables via `SyncConfig::from_env`.
//!
//! Every recognized option is an `OptionKey` variant, and the validator for a
//! key is chosen by an exhaustive `match` in `OptionKey::apply`. Adding a key
//! without a validator does not compile.

use std::time::Duration;

use thiserror::Error;

use crate::types::{CategoryId, SiteId};

/// Default bound on every remote call.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default pull-refresh cache window (10 minutes).
pub const DEFAULT_REFRESH_WINDOW_SECS: u64 = 600;

/// Default delay before flushing deferred webhook notifications (10 minutes).
pub const DEFAULT_NOTIFICATION_DEBOUNCE_SECS: u64 = 600;

/// Default age after which a file lock is considered abandoned (5 minutes).
pub const DEFAULT_LOCK_STALE_SECS: u64 = 300;

/// Errors produced while building a configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required option was not provided.
    #[error("missing required option: {0}")]
    Missing(&'static str),

    /// An option failed validation.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Query parameters for the topic refresh endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshQuery {
    /// Maximum number of "best" replies to return.
    pub best: u32,
    pub min_trust_level: u32,
    pub min_score: u32,
    pub min_replies: u32,
    pub bypass_trust_level_score: u32,
}

impl Default for RefreshQuery {
    fn default() -> Self {
        RefreshQuery {
            best: 5,
            min_trust_level: 1,
            min_score: 0,
            min_replies: 1,
            bypass_trust_level_score: 50,
        }
    }
}

/// Configuration shared by the engine's components.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Discourse base URL without trailing slash.
    pub base_url: String,
    pub api_key: String,

    /// Username used for API calls when no author username applies.
    pub publish_username: String,

    /// Shared secret for webhook signatures. `None` rejects every webhook.
    pub webhook_secret: Option<String>,

    pub default_category: Option<CategoryId>,
    pub auto_track: bool,

    /// Send the permalink as the topic's featured link.
    pub add_featured_link: bool,

    /// Publish with the single admin key and hand ownership to the author
    /// afterwards.
    pub single_user_api_key_publication: bool,

    pub request_timeout: Duration,
    pub refresh_window: Duration,

    /// Debug override: refresh on every `maybe_refresh` call.
    pub always_refresh: bool,

    pub refresh_query: RefreshQuery,

    /// Enable the title-matching fallback for posts synced before topic ids
    /// were tracked.
    pub webhook_match_old_topics: bool,

    /// Route webhook events through the topic → site table.
    pub multisite_routing: bool,

    /// The site this process serves, when multisite routing is enabled.
    pub local_site: Option<SiteId>,

    pub notification_debounce: Duration,
    pub lock_stale_after: Duration,
}

impl SyncConfig {
    /// Creates a configuration with defaults for every optional value.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        publish_username: impl Into<String>,
    ) -> Self {
        SyncConfig {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            publish_username: publish_username.into(),
            webhook_secret: None,
            default_category: None,
            auto_track: true,
            add_featured_link: false,
            single_user_api_key_publication: false,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            refresh_window: Duration::from_secs(DEFAULT_REFRESH_WINDOW_SECS),
            always_refresh: false,
            refresh_query: RefreshQuery::default(),
            webhook_match_old_topics: false,
            multisite_routing: false,
            local_site: None,
            notification_debounce: Duration::from_secs(DEFAULT_NOTIFICATION_DEBOUNCE_SECS),
            lock_stale_after: Duration::from_secs(DEFAULT_LOCK_STALE_SECS),
        }
    }

    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }

    pub fn with_default_category(mut self, category: CategoryId) -> Self {
        self.default_category = Some(category);
        self
    }

    pub fn with_refresh_window(mut self, window: Duration) -> Self {
        self.refresh_window = window;
        self
    }

    pub fn with_multisite(mut self, local_site: Option<SiteId>) -> Self {
        self.multisite_routing = true;
        self.local_site = local_site;
        self
    }

    /// Builds a configuration from `DISCOURSE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: OptionKey| {
            lookup(key.env_var())
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key.env_var()))
        };

        let mut config = SyncConfig::new(
            required(OptionKey::BaseUrl)?,
            required(OptionKey::ApiKey)?,
            required(OptionKey::PublishUsername)?,
        );

        for key in OptionKey::ALL {
            if let Some(raw) = lookup(key.env_var()) {
                key.apply(&mut config, &raw)?;
            }
        }

        Ok(config)
    }
}

/// Every option the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKey {
    BaseUrl,
    ApiKey,
    PublishUsername,
    WebhookSecret,
    DefaultCategory,
    AutoTrack,
    AddFeaturedLink,
    SingleUserApiKeyPublication,
    RequestTimeoutSecs,
    RefreshWindowMins,
    AlwaysRefresh,
    MaxComments,
    MinTrustLevel,
    MinScore,
    MinReplies,
    BypassTrustLevelScore,
    WebhookMatchOldTopics,
    MultisiteRouting,
    LocalSite,
    NotificationDebounceSecs,
    LockStaleSecs,
}

impl OptionKey {
    pub const ALL: [OptionKey; 21] = [
        OptionKey::BaseUrl,
        OptionKey::ApiKey,
        OptionKey::PublishUsername,
        OptionKey::WebhookSecret,
        OptionKey::DefaultCategory,
        OptionKey::AutoTrack,
        OptionKey::AddFeaturedLink,
        OptionKey::SingleUserApiKeyPublication,
        OptionKey::RequestTimeoutSecs,
        OptionKey::RefreshWindowMins,
        OptionKey::AlwaysRefresh,
        OptionKey::MaxComments,
        OptionKey::MinTrustLevel,
        OptionKey::MinScore,
        OptionKey::MinReplies,
        OptionKey::BypassTrustLevelScore,
        OptionKey::WebhookMatchOldTopics,
        OptionKey::MultisiteRouting,
        OptionKey::LocalSite,
        OptionKey::NotificationDebounceSecs,
        OptionKey::LockStaleSecs,
    ];

    /// The environment variable holding this option.
    pub fn env_var(&self) -> &'static str {
        match self {
            OptionKey::BaseUrl => "DISCOURSE_URL",
            OptionKey::ApiKey => "DISCOURSE_API_KEY",
            OptionKey::PublishUsername => "DISCOURSE_PUBLISH_USERNAME",
            OptionKey::WebhookSecret => "DISCOURSE_WEBHOOK_SECRET",
            OptionKey::DefaultCategory => "DISCOURSE_DEFAULT_CATEGORY",
            OptionKey::AutoTrack => "DISCOURSE_AUTO_TRACK",
            OptionKey::AddFeaturedLink => "DISCOURSE_ADD_FEATURED_LINK",
            OptionKey::SingleUserApiKeyPublication => "DISCOURSE_SINGLE_USER_API_KEY",
            OptionKey::RequestTimeoutSecs => "DISCOURSE_REQUEST_TIMEOUT_SECS",
            OptionKey::RefreshWindowMins => "DISCOURSE_REFRESH_WINDOW_MINS",
            OptionKey::AlwaysRefresh => "DISCOURSE_ALWAYS_REFRESH",
            OptionKey::MaxComments => "DISCOURSE_MAX_COMMENTS",
            OptionKey::MinTrustLevel => "DISCOURSE_MIN_TRUST_LEVEL",
            OptionKey::MinScore => "DISCOURSE_MIN_SCORE",
            OptionKey::MinReplies => "DISCOURSE_MIN_REPLIES",
            OptionKey::BypassTrustLevelScore => "DISCOURSE_BYPASS_TRUST_LEVEL_SCORE",
            OptionKey::WebhookMatchOldTopics => "DISCOURSE_WEBHOOK_MATCH_OLD_TOPICS",
            OptionKey::MultisiteRouting => "DISCOURSE_MULTISITE_ROUTING",
            OptionKey::LocalSite => "DISCOURSE_LOCAL_SITE",
            OptionKey::NotificationDebounceSecs => "DISCOURSE_NOTIFICATION_DEBOUNCE_SECS",
            OptionKey::LockStaleSecs => "DISCOURSE_LOCK_STALE_SECS",
        }
    }

    /// Validates `raw` for this key and stores the typed value in `config`.
    pub fn apply(&self, config: &mut SyncConfig, raw: &str) -> Result<()> {
        let key = self.env_var();
        match self {
            OptionKey::BaseUrl => config.base_url = parse_url(key, raw)?,
            OptionKey::ApiKey => config.api_key = parse_non_empty(key, raw)?,
            OptionKey::PublishUsername => config.publish_username = parse_non_empty(key, raw)?,
            OptionKey::WebhookSecret => {
                config.webhook_secret = Some(raw.trim().to_string()).filter(|s| !s.is_empty())
            }
            OptionKey::DefaultCategory => {
                config.default_category = Some(CategoryId(parse_u64(key, raw)?))
            }
            OptionKey::AutoTrack => config.auto_track = parse_bool(key, raw)?,
            OptionKey::AddFeaturedLink => config.add_featured_link = parse_bool(key, raw)?,
            OptionKey::SingleUserApiKeyPublication => {
                config.single_user_api_key_publication = parse_bool(key, raw)?
            }
            OptionKey::RequestTimeoutSecs => {
                config.request_timeout = Duration::from_secs(parse_positive(key, raw)?)
            }
            OptionKey::RefreshWindowMins => {
                let secs = parse_u64(key, raw)?
                    .checked_mul(60)
                    .ok_or_else(|| invalid(key, format!("window too large: {}", raw.trim())))?;
                config.refresh_window = Duration::from_secs(secs)
            }
            OptionKey::AlwaysRefresh => config.always_refresh = parse_bool(key, raw)?,
            OptionKey::MaxComments => config.refresh_query.best = parse_u32(key, raw)?,
            OptionKey::MinTrustLevel => config.refresh_query.min_trust_level = parse_u32(key, raw)?,
            OptionKey::MinScore => config.refresh_query.min_score = parse_u32(key, raw)?,
            OptionKey::MinReplies => config.refresh_query.min_replies = parse_u32(key, raw)?,
            OptionKey::BypassTrustLevelScore => {
                config.refresh_query.bypass_trust_level_score = parse_u32(key, raw)?
            }
            OptionKey::WebhookMatchOldTopics => {
                config.webhook_match_old_topics = parse_bool(key, raw)?
            }
            OptionKey::MultisiteRouting => config.multisite_routing = parse_bool(key, raw)?,
            OptionKey::LocalSite => config.local_site = Some(SiteId(parse_u64(key, raw)?)),
            OptionKey::NotificationDebounceSecs => {
                config.notification_debounce = Duration::from_secs(parse_u64(key, raw)?)
            }
            OptionKey::LockStaleSecs => {
                config.lock_stale_after = Duration::from_secs(parse_positive(key, raw)?)
            }
        }
        Ok(())
    }
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        reason: reason.into(),
    }
}

fn parse_non_empty(key: &'static str, raw: &str) -> Result<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(invalid(key, "must not be empty"));
    }
    Ok(value.to_string())
}

fn parse_url(key: &'static str, raw: &str) -> Result<String> {
    let value = parse_non_empty(key, raw)?;
    if !(value.starts_with("https://") || value.starts_with("http://")) {
        return Err(invalid(key, "must start with http:// or https://"));
    }
    Ok(value.trim_end_matches('/').to_string())
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(invalid(key, format!("not a boolean: {other}"))),
    }
}

fn parse_u64(key: &'static str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .map_err(|_| invalid(key, format!("not a non-negative integer: {}", raw.trim())))
}

fn parse_u32(key: &'static str, raw: &str) -> Result<u32> {
    raw.trim()
        .parse()
        .map_err(|_| invalid(key, format!("not a non-negative integer: {}", raw.trim())))
}

fn parse_positive(key: &'static str, raw: &str) -> Result<u64> {
    match parse_u64(key, raw)? {
        0 => Err(invalid(key, "must be greater than zero")),
        n => Ok(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("DISCOURSE_URL", "https://forum.example.com/"),
        ("DISCOURSE_API_KEY", "key"),
        ("DISCOURSE_PUBLISH_USERNAME", "system"),
    ];

    #[test]
    fn defaults_match_documented_values() {
        let config = SyncConfig::new("https://forum.example.com", "k", "system");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.refresh_window, Duration::from_secs(600));
        assert!(config.auto_track);
        assert!(!config.multisite_routing);
        assert!(config.webhook_secret.is_none());
    }

    #[test]
    fn from_lookup_trims_trailing_slash() {
        let config = SyncConfig::from_lookup(lookup_from(&REQUIRED)).unwrap();
        assert_eq!(config.base_url, "https://forum.example.com");
        assert_eq!(config.publish_username, "system");
    }

    #[test]
    fn from_lookup_reports_missing_required() {
        let result = SyncConfig::from_lookup(lookup_from(&REQUIRED[..2]));
        assert_eq!(
            result.unwrap_err(),
            ConfigError::Missing("DISCOURSE_PUBLISH_USERNAME")
        );
    }

    #[test]
    fn from_lookup_applies_typed_options() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("DISCOURSE_WEBHOOK_SECRET", "s3cret"),
            ("DISCOURSE_DEFAULT_CATEGORY", "4"),
            ("DISCOURSE_AUTO_TRACK", "no"),
            ("DISCOURSE_REFRESH_WINDOW_MINS", "3"),
            ("DISCOURSE_MULTISITE_ROUTING", "true"),
            ("DISCOURSE_LOCAL_SITE", "2"),
            ("DISCOURSE_MAX_COMMENTS", "12"),
        ]);
        let config = SyncConfig::from_lookup(lookup_from(&pairs)).unwrap();

        assert_eq!(config.webhook_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.default_category, Some(CategoryId(4)));
        assert!(!config.auto_track);
        assert_eq!(config.refresh_window, Duration::from_secs(180));
        assert!(config.multisite_routing);
        assert_eq!(config.local_site, Some(SiteId(2)));
        assert_eq!(config.refresh_query.best, 12);
    }

    #[test]
    fn invalid_values_name_their_key() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("DISCOURSE_AUTO_TRACK", "maybe"));
        let err = SyncConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "DISCOURSE_AUTO_TRACK",
                ..
            }
        ));
    }

    #[test]
    fn url_without_scheme_is_rejected() {
        let mut config = SyncConfig::new("https://a", "k", "u");
        let err = OptionKey::BaseUrl.apply(&mut config, "forum.example.com");
        assert!(err.is_err());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut config = SyncConfig::new("https://a", "k", "u");
        assert!(OptionKey::RequestTimeoutSecs.apply(&mut config, "0").is_err());
        assert!(OptionKey::RequestTimeoutSecs.apply(&mut config, "5").is_ok());
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn oversized_refresh_window_is_rejected() {
        let mut config = SyncConfig::new("https://a", "k", "u");
        let err = OptionKey::RefreshWindowMins
            .apply(&mut config, &u64::MAX.to_string())
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "DISCOURSE_REFRESH_WINDOW_MINS",
                ..
            }
        ));
        assert_eq!(config.refresh_window, Duration::from_secs(600));
    }

    #[test]
    fn blank_secret_means_unset() {
        let mut config = SyncConfig::new("https://a", "k", "u").with_webhook_secret("x");
        OptionKey::WebhookSecret.apply(&mut config, "   ").unwrap();
        assert!(config.webhook_secret.is_none());
    }

    #[test]
    fn every_key_has_a_distinct_env_var() {
        let mut names: Vec<_> = OptionKey::ALL.iter().map(|k| k.env_var()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), OptionKey::ALL.len());
    }
}
