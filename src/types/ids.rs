//! Newtype wrappers for domain identifiers.
//!
//! Local posts, remote posts, remote topics, sites and categories are all plain
//! integers on the wire. These types prevent passing a topic id where a remote
//! post id is expected, which is exactly the mix-up that turns an update into a
//! request against the wrong resource.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The local (WordPress-side) identifier of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub u64);

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PostId {
    fn from(n: u64) -> Self {
        PostId(n)
    }
}

/// The identifier of the first post of a remote topic.
///
/// Updates are addressed by this id (`PUT /posts/{id}`), not by the topic id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemotePostId(pub u64);

impl fmt::Display for RemotePostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RemotePostId {
    fn from(n: u64) -> Self {
        RemotePostId(n)
    }
}

/// A remote topic identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicId(pub u64);

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TopicId {
    fn from(n: u64) -> Self {
        TopicId(n)
    }
}

/// A site (blog) identifier in a multisite network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(pub u64);

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SiteId {
    fn from(n: u64) -> Self {
        SiteId(n)
    }
}

/// A remote category identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub u64);

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for CategoryId {
    fn from(n: u64) -> Self {
        CategoryId(n)
    }
}
