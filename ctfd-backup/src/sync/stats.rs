//! Per-run counters, shared by concurrent file tasks.

use super::syncer::SyncOutcome;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct BackupStats {
    downloaded: AtomicUsize,
    updated: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    total_files: AtomicUsize,
    failed_listings: AtomicUsize,
    bytes_downloaded: AtomicU64,
}

/// Point-in-time copy of [`BackupStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub downloaded: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_files: usize,
    pub failed_listings: usize,
    pub bytes_downloaded: u64,
}

impl BackupStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one file outcome.
    pub fn record(&self, outcome: &SyncOutcome) {
        let counter = match outcome {
            SyncOutcome::Downloaded => &self.downloaded,
            SyncOutcome::Updated => &self.updated,
            SyncOutcome::Skipped => &self.skipped,
            SyncOutcome::Failed(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.total_files.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes(&self, bytes: u64) {
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    /// A page, challenge detail, or listing artifact could not be fetched or written.
    pub fn record_listing_failure(&self) {
        self.failed_listings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            downloaded: self.downloaded.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            total_files: self.total_files.load(Ordering::Relaxed),
            failed_listings: self.failed_listings.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.failed_listings > 0
    }

    /// Files fetched this run, new or replaced.
    pub fn fetched(&self) -> usize {
        self.downloaded + self.updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_outcomes() {
        let stats = BackupStats::new();
        stats.record(&SyncOutcome::Downloaded);
        stats.record(&SyncOutcome::Downloaded);
        stats.record(&SyncOutcome::Updated);
        stats.record(&SyncOutcome::Skipped);
        stats.record(&SyncOutcome::Failed("connection reset".into()));
        stats.add_bytes(42);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.downloaded, 2);
        assert_eq!(snapshot.updated, 1);
        assert_eq!(snapshot.skipped, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.total_files, 5);
        assert_eq!(snapshot.fetched(), 3);
        assert_eq!(snapshot.bytes_downloaded, 42);
        assert!(snapshot.has_failures());
    }

    #[test]
    fn test_listing_failure_counts_as_failure() {
        let stats = BackupStats::new();
        assert!(!stats.snapshot().has_failures());

        stats.record_listing_failure();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.failed, 0);
        assert_eq!(snapshot.failed_listings, 1);
        assert!(snapshot.has_failures());
    }
}
