//! discourse-sync - keeps local blog posts and Discourse topics in sync.
//!
//! Publishing a post creates or updates its remote topic; Discourse webhooks
//! and a pull-refresh cache bring reply activity back to the local record.

pub mod classify;
pub mod config;
pub mod discourse;
pub mod lock;
pub mod multisite;
pub mod persistence;
pub mod publish;
pub mod refresh;
pub mod server;
pub mod store;
pub mod types;
pub mod webhook;

#[cfg(test)]
pub mod test_utils;
