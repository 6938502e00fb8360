//! ctfd-backup - Main entry point
//!
//! Mirrors a CTFd instance into `<output>/<host>`, re-downloading only what changed.

use anyhow::Result;
use clap::Parser;
use ctfd_backup::executor::{BackupOptions, BackupOrchestrator, RunState};
use ctfd_backup::remote::ctfd::{site_name, CtfdClient};
use ctfd_backup::report::LogReporter;
use ctfd_backup::shutdown::ShutdownCoordinator;
use ctfd_backup::{utils, Config};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// CTFd URL (overrides config; https:// is assumed without a scheme)
    url: Option<String>,

    /// CTFd API access token
    #[arg(long, env = "CTFD_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory in which the `<host>` backup folder is created
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Re-download every file, ignoring stored metadata
    #[arg(long)]
    full: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Concurrency budget shared by file downloads
    #[arg(long, value_name = "N")]
    concurrency: Option<u32>,

    /// Skip HEAD requests for file size and Last-Modified
    #[arg(long)]
    no_probe: bool,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(url) = self.url {
            config.remote.url = url;
        }
        if let Some(token) = self.token {
            config.remote.token = Some(token);
        }
        if let Some(output) = self.output {
            config.backup.output_dir = output;
        }
        if self.full {
            config.backup.full = true;
        }
        if let Some(level) = self.log_level {
            config.log.level = level;
        }
        if let Some(budget) = self.concurrency {
            config.performance.concurrency_budget = budget;
        }
        if self.no_probe {
            config.remote.probe_file_metadata = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Load configuration, then let flags override it
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::for_url(""),
    };
    args.apply(&mut config);

    utils::logger::init(&config.log.level)?;

    config.validate()?;
    if config.remote.token.is_none() {
        tracing::warn!("No API token given; only publicly visible data will be backed up");
    }

    let client = CtfdClient::new(&config.remote)?;
    let root = config.backup.output_dir.join(site_name(client.base_url())?);

    tracing::info!(
        "Starting ctfd-backup v{} for {} into {}",
        env!("CARGO_PKG_VERSION"),
        client.base_url(),
        root.display()
    );

    // Ctrl-C / SIGTERM cancel the run; the metadata store is still saved
    let shutdown = ShutdownCoordinator::new();
    let signal_task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { shutdown.wait_for_signal().await })
    };

    let options = BackupOptions::from_config(&config, root);
    let mut orchestrator =
        BackupOrchestrator::with_cancel(Arc::new(client), Arc::new(LogReporter), options, shutdown.token());
    let result = orchestrator.run().await;
    signal_task.abort();

    let summary = result?;
    Ok(match summary.state {
        RunState::Completed => ExitCode::SUCCESS,
        RunState::Interrupted => ExitCode::from(130),
        _ => ExitCode::from(1),
    })
}
