//! ctfd-backup library
//!
//! Incremental mirror of a CTFd instance: challenge files are re-downloaded
//! only when the remote copy or the local copy changed since the last run.

pub mod artifacts;
pub mod config;
pub mod executor;
pub mod fs;
pub mod remote;
pub mod report;
pub mod shutdown;
pub mod sync;
pub mod utils;

#[cfg(test)]
pub mod testutil;

// Re-export commonly used types
pub use config::Config;
pub use utils::errors::{BackupError, Result};
