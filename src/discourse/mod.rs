//! Discourse API access.
//!
//! - `request`: outbound calls described as data
//! - `client`: the `RemoteClient` seam and its reqwest implementation
//! - `error`: the raw result shape every client returns

mod client;
mod error;
mod request;

pub use client::{DiscourseClient, RemoteClient};
pub use error::{RawResponse, RawResult, TransportError};
pub use request::{CreatePost, HttpMethod, OperationKind, RemoteRequest, UpdatePost, UpdatePostRaw};
