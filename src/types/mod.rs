//! Core domain types for the synchronization engine.

pub mod ids;
pub mod post;

pub use ids::{CategoryId, PostId, RemotePostId, SiteId, TopicId};
pub use post::{DEFAULT_POST_TYPE, IssueKind, SyncIssue, SyncResponse, SyncedPost};
