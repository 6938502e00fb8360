//! Backup run orchestration.
//!
//! One run walks the challenge listing page by page. For each challenge it
//! fetches the detail, writes `challenge.json`, syncs the attached files
//! concurrently and checkpoints the metadata store. Teams, users and the
//! scoreboard follow as JSON artifacts, then a final save and the summary.

use crate::artifacts::{
    attachment_name, challenge_dir, partial_path, ArtifactWriter, CHALLENGE_FILE, SCOREBOARD_FILE, TEAMS_FILE,
    USERS_FILE,
};
use crate::config::Config;
use crate::fs::paths::join_relative;
use crate::remote::{ChallengeDescriptor, Page, RemoteSource};
use crate::report::{Listing, Reporter};
use crate::sync::paginate::{collect_all, paginate};
use crate::sync::{BackupMode, BackupStats, FileSyncer, FileTarget, MetadataStore, StatsSnapshot};
use crate::utils::errors::{BackupError, Result};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Semaphore permits a file download takes, from its reported size.
///
/// | Size                          | Permits            |
/// |-------------------------------|--------------------|
/// | unknown, or < threshold / 8   | 1                  |
/// | threshold / 8 .. threshold    | budget / 4 (min 1) |
/// | >= threshold                  | budget (runs alone)|
fn concurrency_weight(size: Option<u64>, budget: u32, large_file_threshold: u64) -> u32 {
    match size {
        Some(size) if size >= large_file_threshold => budget,
        Some(size) if size >= large_file_threshold / 8 => (budget / 4).max(1),
        _ => 1,
    }
}

/// Settings for one run.
#[derive(Debug, Clone)]
pub struct BackupOptions {
    /// Backup root: `<output_dir>/<host>`
    pub root: PathBuf,
    pub mode: BackupMode,
    /// Store file name relative to `root`
    pub metadata_file: String,
    pub concurrency_budget: u32,
    pub large_file_threshold: u64,
    pub include_teams: bool,
    pub include_users: bool,
    pub include_scoreboard: bool,
}

impl BackupOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::from_config(&Config::for_url(""), root)
    }

    pub fn from_config(config: &Config, root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mode: if config.backup.full {
                BackupMode::Full
            } else {
                BackupMode::Incremental
            },
            metadata_file: config.backup.metadata_file.clone(),
            concurrency_budget: config.performance.concurrency_budget.max(1),
            large_file_threshold: config.performance.large_file_threshold,
            include_teams: config.backup.include_teams,
            include_users: config.backup.include_users,
            include_scoreboard: config.backup.include_scoreboard,
        }
    }
}

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    /// Finished, but at least one file or listing failed
    PartiallyFailed,
    /// Stopped early by the cancellation token
    Interrupted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::PartiallyFailed => "partially failed",
            RunState::Interrupted => "interrupted",
        };
        f.write_str(text)
    }
}

/// Result of a run, handed to [`Reporter::on_run_summary`].
#[derive(Debug, Clone, Serialize)]
pub struct BackupSummary {
    pub mode: BackupMode,
    pub state: RunState,
    pub stats: StatsSnapshot,
    pub started_at: DateTime<Utc>,
    pub duration_secs: u64,
    /// Challenges listed (including ones whose detail failed)
    pub challenges: usize,
    /// Entries written to `teams.json`; `None` when not attempted
    pub teams: Option<usize>,
    pub users: Option<usize>,
    pub metadata_saved: bool,
}

/// Drives one backup of a remote platform into `options.root`.
pub struct BackupOrchestrator {
    source: Arc<dyn RemoteSource>,
    reporter: Arc<dyn Reporter>,
    options: BackupOptions,
    cancel: CancellationToken,
    state: RunState,
}

impl BackupOrchestrator {
    /// Create an orchestrator that can only be stopped by dropping the run.
    pub fn new(source: Arc<dyn RemoteSource>, reporter: Arc<dyn Reporter>, options: BackupOptions) -> Self {
        Self::with_cancel(source, reporter, options, CancellationToken::new())
    }

    /// Create an orchestrator that stops early when `cancel` fires.
    pub fn with_cancel(
        source: Arc<dyn RemoteSource>,
        reporter: Arc<dyn Reporter>,
        options: BackupOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            reporter,
            options,
            cancel,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Execute the run.
    ///
    /// Only an unusable backup root is an error. Remote and per-file failures
    /// are counted in the summary and reflected in its state.
    pub async fn run(&mut self) -> Result<BackupSummary> {
        let started_at = Utc::now();
        let start = std::time::Instant::now();

        tokio::fs::create_dir_all(&self.options.root).await?;
        self.state = RunState::Running;

        info!(
            root = %self.options.root.display(),
            mode = %self.options.mode,
            budget = self.options.concurrency_budget,
            "Starting backup"
        );

        let store = MetadataStore::load(self.options.root.join(&self.options.metadata_file)).await;
        let store = Arc::new(Mutex::new(store));
        let stats = Arc::new(BackupStats::new());
        let artifacts = ArtifactWriter::new(&self.options.root);
        let syncer = Arc::new(FileSyncer::new(
            &self.options.root,
            self.options.mode,
            Arc::clone(&self.source),
            Arc::clone(&store),
            Arc::clone(&self.reporter),
            Arc::clone(&stats),
            self.cancel.clone(),
        ));
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency_budget.max(1) as usize));

        let challenges = self.sync_challenges(&syncer, &semaphore, &store, &stats, &artifacts).await;

        let teams = if self.options.include_teams && !self.cancel.is_cancelled() {
            let source = Arc::clone(&self.source);
            Some(
                self.backup_pages(Listing::Teams, TEAMS_FILE, &stats, &artifacts, move |page| {
                    let source = Arc::clone(&source);
                    async move { source.list_teams_page(page).await }
                })
                .await,
            )
        } else {
            None
        };

        let users = if self.options.include_users && !self.cancel.is_cancelled() {
            let source = Arc::clone(&self.source);
            Some(
                self.backup_pages(Listing::Users, USERS_FILE, &stats, &artifacts, move |page| {
                    let source = Arc::clone(&source);
                    async move { source.list_users_page(page).await }
                })
                .await,
            )
        } else {
            None
        };

        if self.options.include_scoreboard && !self.cancel.is_cancelled() {
            self.backup_scoreboard(&stats, &artifacts).await;
        }

        // Saved even when interrupted: every record in the store is a finished file.
        let metadata_saved = {
            let store = store.lock().await;
            match store.save().await {
                Ok(()) => true,
                Err(e) => {
                    error!(path = %store.location().display(), error = %e, "Failed to save metadata store");
                    false
                }
            }
        };

        let stats = stats.snapshot();
        self.state = if self.cancel.is_cancelled() {
            RunState::Interrupted
        } else if stats.has_failures() || !metadata_saved {
            RunState::PartiallyFailed
        } else {
            RunState::Completed
        };

        let summary = BackupSummary {
            mode: self.options.mode,
            state: self.state,
            stats,
            started_at,
            duration_secs: start.elapsed().as_secs(),
            challenges,
            teams,
            users,
            metadata_saved,
        };

        self.reporter.on_run_summary(&summary);
        Ok(summary)
    }

    /// Walk the challenge listing, syncing each challenge as it arrives.
    async fn sync_challenges(
        &self,
        syncer: &Arc<FileSyncer>,
        semaphore: &Arc<Semaphore>,
        store: &Arc<Mutex<MetadataStore>>,
        stats: &BackupStats,
        artifacts: &ArtifactWriter,
    ) -> usize {
        let source = Arc::clone(&self.source);
        let listing = paginate(move |page| {
            let source = Arc::clone(&source);
            async move { source.list_challenges_page(page).await }
        });
        futures_util::pin_mut!(listing);

        let mut count = 0usize;
        let mut listing_error = None;
        let mut used_dirs = HashSet::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                next = listing.next() => next,
            };
            let summary = match next {
                Some(Ok(summary)) => summary,
                Some(Err(e)) => {
                    warn!(error = %e, "Challenge listing failed");
                    stats.record_listing_failure();
                    listing_error = Some(e);
                    break;
                }
                None => break,
            };

            count += 1;
            self.reporter.on_challenge_start(&summary.name);

            // Reserved from the listing so a failed detail does not shift later
            // challenges. Same category and name: later ones get their id appended.
            let mut dir = challenge_dir(summary.category.as_deref(), &summary.name);
            if !used_dirs.insert(dir.clone()) {
                dir = format!("{}-{}", dir, summary.id);
                warn!(challenge = %summary.name, id = summary.id, dir = %dir, "Duplicate challenge name");
                used_dirs.insert(dir.clone());
            }

            let detail = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                detail = self.source.challenge(summary.id) => detail,
            };
            let challenge = match detail {
                Ok(challenge) => challenge,
                Err(e) => {
                    self.reporter.on_challenge_error(&summary.name, &e);
                    stats.record_listing_failure();
                    continue;
                }
            };

            if let Err(e) = artifacts.write_challenge(&dir, &challenge).await {
                warn!(challenge = %challenge.name, error = %e, "Failed to write challenge descriptor");
                stats.record_listing_failure();
            }

            self.sync_files(&dir, &challenge, syncer, semaphore).await;

            if let Err(e) = store.lock().await.save().await {
                warn!(error = %e, "Checkpoint save failed");
            }
        }

        self.reporter
            .on_listing_complete(Listing::Challenges, count, listing_error.as_ref());
        count
    }

    /// Sync every file of one challenge under the shared weighted semaphore.
    async fn sync_files(
        &self,
        dir: &str,
        challenge: &ChallengeDescriptor,
        syncer: &Arc<FileSyncer>,
        semaphore: &Arc<Semaphore>,
    ) {
        let mut seen = HashSet::from([join_relative(&[dir, CHALLENGE_FILE])]);
        let mut handles = Vec::with_capacity(challenge.files.len());

        for file in &challenge.files {
            let path = join_relative(&[dir, &attachment_name(&file.name)]);
            if !seen.insert(path.clone()) {
                warn!(path = %path, "Duplicate file name in challenge, skipping");
                continue;
            }

            let target = FileTarget {
                path,
                remote: file.clone(),
            };
            let weight = concurrency_weight(
                file.size,
                self.options.concurrency_budget.max(1),
                self.options.large_file_threshold,
            );
            let syncer = Arc::clone(syncer);
            let semaphore = Arc::clone(semaphore);
            let cancel = self.cancel.clone();

            handles.push(tokio::spawn(async move {
                // Files not started before cancellation are left for the next run.
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return None,
                    permit = semaphore.acquire_many_owned(weight) => permit.ok()?,
                };
                let outcome = syncer.sync(&target).await;
                drop(permit);
                Some(outcome)
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(challenge = %challenge.name, error = %e, "File task panicked");
            }
        }
        debug!(challenge = %challenge.name, files = seen.len() - 1, "Challenge files processed");
    }

    /// Collect a paged listing and write it as one JSON array.
    ///
    /// A complete listing replaces `relative` and drops any stale partial file.
    /// A failed one goes to the `.partial.json` sibling so the last complete
    /// listing survives. Cancellation writes nothing.
    async fn backup_pages<F, Fut>(
        &self,
        listing: Listing,
        relative: &str,
        stats: &BackupStats,
        artifacts: &ArtifactWriter,
        fetcher: F,
    ) -> usize
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Page<serde_json::Value>>>,
    {
        let (items, listing_error) = collect_all(paginate(fetcher), &self.cancel).await;

        let written = match &listing_error {
            Some(BackupError::Cancelled) => Ok(()),
            Some(_) => {
                stats.record_listing_failure();
                let partial = partial_path(relative);
                warn!(
                    listing = %listing,
                    items = items.len(),
                    path = %partial,
                    "Listing incomplete, keeping previous copy"
                );
                artifacts.write_json(&partial, &items).await
            }
            None => match artifacts.write_json(relative, &items).await {
                Ok(()) => artifacts.remove(&partial_path(relative)).await,
                Err(e) => Err(e),
            },
        };
        if let Err(e) = written {
            warn!(listing = %listing, error = %e, "Failed to write listing");
            stats.record_listing_failure();
        }

        self.reporter.on_listing_complete(listing, items.len(), listing_error.as_ref());
        items.len()
    }

    async fn backup_scoreboard(&self, stats: &BackupStats, artifacts: &ArtifactWriter) {
        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(BackupError::Cancelled),
            fetched = self.source.scoreboard() => fetched,
        };

        let result = match fetched {
            Ok(scoreboard) => artifacts.write_json(SCOREBOARD_FILE, &scoreboard).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => self.reporter.on_listing_complete(Listing::Scoreboard, 1, None),
            Err(e) => {
                if !matches!(e, BackupError::Cancelled) {
                    stats.record_listing_failure();
                }
                self.reporter.on_listing_complete(Listing::Scoreboard, 0, Some(&e));
            }
        }
    }
}
