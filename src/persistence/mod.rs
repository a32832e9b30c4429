//! Crash-safe file persistence.
//!
//! - `atomic`: whole-file JSON replacement via temp file and rename
//! - `routes`: append-only JSON Lines log of topic → site routes
//! - `fsync`: file and directory sync helpers
//!
//! # File Layout
//!
//! ```text
//! <state_dir>/
//!   sites/<site_id>/posts/<post_id>.json   # one SyncedPost per file
//!   sites/<site_id>/posts/topics/<id>.json # topic → post index
//!   sites/<site_id>/posts/locks/           # record locks
//!   routes.log                             # topic → site routes (JSON Lines)
//!   routes.log.lock                        # held while appending routes
//!   locks/<name>.lock                      # publish and refresh locks
//! ```

pub mod atomic;
pub mod fsync;
pub mod routes;

pub use atomic::{read_json, write_json_atomic};
pub use fsync::{fsync_dir, fsync_file};
pub use routes::{RouteLog, RouteLogError, RouteRecord};
