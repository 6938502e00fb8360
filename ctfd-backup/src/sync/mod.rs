//! Incremental synchronization engine.
//!
//! - [`metadata_store`]: what was synced last time
//! - [`detector`]: whether a file must be fetched again
//! - [`syncer`]: fetch-or-skip for one file
//! - [`paginate`]: paged remote listings as a stream
//! - [`stats`]: per-run counters

pub mod detector;
pub mod metadata_store;
pub mod paginate;
pub mod stats;
pub mod syncer;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use detector::{Decision, FetchReason};
pub use metadata_store::{FileRecord, MetadataStore};
pub use stats::{BackupStats, StatsSnapshot};
pub use syncer::{FileSyncer, FileTarget, SyncOutcome};

/// Full re-fetches everything; incremental skips files verified unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupMode {
    Full,
    #[default]
    Incremental,
}

impl fmt::Display for BackupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupMode::Full => f.write_str("full"),
            BackupMode::Incremental => f.write_str("incremental"),
        }
    }
}
