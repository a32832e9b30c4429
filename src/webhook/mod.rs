//! Inbound Discourse webhooks.
//!
//! - `signature`: HMAC-SHA256 verification of delivery bodies
//! - `envelope`: the delivery as received and the post event it carries
//! - `receiver`: verification, resolution, multisite dispatch and apply
//! - `fallback`: title matching for topics missing from the topic index
//! - `notify`: debounced batches of events that matched no post

pub mod envelope;
pub mod fallback;
pub mod notify;
pub mod receiver;
pub mod signature;

pub use envelope::{EVENT_HEADER, EVENT_TYPE_HEADER, EventKind, PostEvent, RemoteEventEnvelope};
pub use fallback::{ExactTitleFallback, TitleFallback};
pub use notify::{DeferredNotifier, NotificationSink, TracingSink, UnresolvedTopic};
pub use receiver::{WebhookError, WebhookOutcome, WebhookReceiver};
pub use signature::{
    SIGNATURE_HEADER, SignatureFailure, compute_signature, format_signature_header,
    parse_signature_header, verify_delivery,
};
