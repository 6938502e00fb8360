//! Fetch-or-skip execution for a single file.

use super::detector::{should_fetch, Decision};
use super::metadata_store::{FileRecord, MetadataStore};
use super::stats::BackupStats;
use super::BackupMode;
use crate::fs::atomic::temp_path_for;
use crate::fs::digest::ContentHasher;
use crate::remote::{RemoteFile, RemoteSource, Timestamp};
use crate::report::Reporter;
use crate::utils::errors::{BackupError, Result};
use futures_util::StreamExt;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Per-file result of a sync attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Downloaded,
    Updated,
    Skipped,
    Failed(String),
}

impl SyncOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SyncOutcome::Downloaded => "downloaded",
            SyncOutcome::Updated => "updated",
            SyncOutcome::Skipped => "skipped",
            SyncOutcome::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOutcome::Failed(reason) => write!(f, "failed: {}", reason),
            other => f.write_str(other.label()),
        }
    }
}

/// A remote file and where it lives under the backup root.
#[derive(Debug, Clone)]
pub struct FileTarget {
    /// Relative, `/`-separated path (the metadata store key)
    pub path: String,
    pub remote: RemoteFile,
}

/// Syncs files into `root`, recording results in the shared store.
pub struct FileSyncer {
    root: PathBuf,
    mode: BackupMode,
    source: Arc<dyn RemoteSource>,
    store: Arc<Mutex<MetadataStore>>,
    reporter: Arc<dyn Reporter>,
    stats: Arc<BackupStats>,
    cancel: CancellationToken,
}

impl FileSyncer {
    pub fn new(
        root: impl Into<PathBuf>,
        mode: BackupMode,
        source: Arc<dyn RemoteSource>,
        store: Arc<Mutex<MetadataStore>>,
        reporter: Arc<dyn Reporter>,
        stats: Arc<BackupStats>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            root: root.into(),
            mode,
            source,
            store,
            reporter,
            stats,
            cancel,
        }
    }

    pub fn local_path(&self, relative: &str) -> PathBuf {
        relative.split('/').fold(self.root.clone(), |path, part| path.join(part))
    }

    /// Sync one file. Never fails the caller: errors become [`SyncOutcome::Failed`].
    pub async fn sync(&self, target: &FileTarget) -> SyncOutcome {
        let local_path = self.local_path(&target.path);
        let existing = self.store.lock().await.get(&target.path).cloned();

        let outcome = match should_fetch(&target.remote, existing.as_ref(), self.mode, &local_path).await {
            Decision::Fetch(reason) => {
                debug!(path = %target.path, %reason, "Fetching");
                match self.fetch(&target.remote, &local_path).await {
                    Ok((size, hash)) => {
                        let record = FileRecord {
                            path: target.path.clone(),
                            size,
                            mtime: target
                                .remote
                                .mtime
                                .clone()
                                .unwrap_or_else(|| Timestamp::Unix(chrono::Utc::now().timestamp())),
                            hash,
                        };
                        self.store.lock().await.upsert(record);
                        self.stats.add_bytes(size);

                        if existing.is_some() {
                            SyncOutcome::Updated
                        } else {
                            SyncOutcome::Downloaded
                        }
                    }
                    Err(e) => {
                        warn!(path = %target.path, error = %e, transient = e.is_transient(), "File sync failed");
                        SyncOutcome::Failed(e.to_string())
                    }
                }
            }
            Decision::Skip | Decision::VerifyLocal => SyncOutcome::Skipped,
        };

        self.stats.record(&outcome);
        self.reporter.on_file_outcome(&target.path, &outcome);
        outcome
    }

    /// Download into a temp sibling, then rename over `local_path`.
    ///
    /// Returns `(bytes written, hex SHA-256)`. On any error the temp file is
    /// removed and whatever was at `local_path` stays untouched.
    async fn fetch(&self, remote: &RemoteFile, local_path: &Path) -> Result<(u64, String)> {
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = temp_path_for(local_path);
        let result = match self.stream_to(remote, &tmp).await {
            Ok(written) => tokio::fs::rename(&tmp, local_path)
                .await
                .map(|_| written)
                .map_err(BackupError::from),
            Err(e) => Err(e),
        };

        if result.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        result
    }

    async fn stream_to(&self, remote: &RemoteFile, tmp: &Path) -> Result<(u64, String)> {
        let mut stream = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(BackupError::Cancelled),
            stream = self.source.fetch_file(remote) => stream?,
        };

        let mut file = tokio::fs::File::create(tmp).await?;
        let mut hasher = ContentHasher::new();

        loop {
            let chunk = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(BackupError::Cancelled),
                chunk = stream.next() => chunk,
            };
            match chunk {
                Some(Ok(bytes)) => {
                    file.write_all(&bytes).await?;
                    hasher.update(&bytes);
                }
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }

        file.flush().await?;
        file.sync_all().await?;

        let (size, hash) = hasher.finish();
        if let Some(expected) = remote.size {
            if expected != size {
                return Err(BackupError::SizeMismatch { expected, actual: size });
            }
        }
        Ok((size, hash))
    }
}
