//! Run event notifications.
//!
//! The engine never writes to the console itself; it notifies a [`Reporter`].
//! Calls are synchronous and must return quickly: implementations buffer or
//! forward rather than block.

pub mod format;

use crate::executor::BackupSummary;
use crate::sync::SyncOutcome;
use crate::utils::errors::BackupError;
use format::{format_bytes, format_duration};
use std::fmt;
use tracing::{info, warn};

/// Non-file listings walked during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listing {
    Challenges,
    Teams,
    Users,
    Scoreboard,
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Listing::Challenges => "challenges",
            Listing::Teams => "teams",
            Listing::Users => "users",
            Listing::Scoreboard => "scoreboard",
        };
        f.write_str(text)
    }
}

pub trait Reporter: Send + Sync {
    fn on_challenge_start(&self, name: &str);

    /// The challenge detail (and thus its file list) could not be fetched.
    fn on_challenge_error(&self, name: &str, error: &BackupError);

    fn on_file_outcome(&self, path: &str, outcome: &SyncOutcome);

    fn on_listing_complete(&self, listing: Listing, count: usize, error: Option<&BackupError>);

    fn on_run_summary(&self, summary: &BackupSummary);
}

/// Renders events as log lines through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn on_challenge_start(&self, name: &str) {
        info!("Challenge: {}", name);
    }

    fn on_challenge_error(&self, name: &str, error: &BackupError) {
        warn!("Challenge {} could not be listed: {}", name, error);
    }

    fn on_file_outcome(&self, path: &str, outcome: &SyncOutcome) {
        match outcome {
            SyncOutcome::Failed(reason) => warn!("  failed     {} ({})", path, reason),
            other => info!("  {:<10} {}", other.label(), path),
        }
    }

    fn on_listing_complete(&self, listing: Listing, count: usize, error: Option<&BackupError>) {
        match error {
            None => info!("Backed up {} {}", count, listing),
            Some(e) => warn!("Listing {} stopped after {} entries: {}", listing, count, e),
        }
    }

    fn on_run_summary(&self, summary: &BackupSummary) {
        let stats = &summary.stats;
        info!(
            "Backup {} ({} mode): {} downloaded, {} updated, {} skipped, {} failed of {} files; {} fetched in {}",
            summary.state,
            summary.mode,
            stats.downloaded,
            stats.updated,
            stats.skipped,
            stats.failed,
            stats.total_files,
            format_bytes(stats.bytes_downloaded),
            format_duration(summary.duration_secs),
        );
        if stats.failed_listings > 0 {
            warn!("{} listings could not be fetched completely", stats.failed_listings);
        }
        if !summary.metadata_saved {
            warn!("Metadata store was not saved; the next run will re-verify every file");
        }
    }
}
