//! Configuration management for the backup tool.
//!
//! Loads configuration from a TOML file; command-line flags override it.

use crate::utils::errors::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub remote: RemoteConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// CTFd base URL (scheme optional, defaults to https)
    pub url: String,

    /// CTFd API access token
    #[serde(default)]
    pub token: Option<String>,

    /// Timeout for API calls (listings, HEAD probes)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// TCP connect timeout
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Issue a HEAD request per file to learn its size and Last-Modified
    #[serde(default = "default_true")]
    pub probe_file_metadata: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Directory under which the `<host>` backup root is created
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Force a full backup, ignoring stored metadata
    #[serde(default)]
    pub full: bool,

    /// Metadata store file name, relative to the backup root
    #[serde(default = "default_metadata_file")]
    pub metadata_file: String,

    #[serde(default = "default_true")]
    pub include_teams: bool,

    #[serde(default = "default_true")]
    pub include_users: bool,

    #[serde(default = "default_true")]
    pub include_scoreboard: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Total semaphore permits shared by concurrent file downloads
    #[serde(default = "default_concurrency_budget")]
    pub concurrency_budget: u32,

    /// Files at least this large (when the size is known) run alone
    #[serde(default = "default_large_file_threshold")]
    pub large_file_threshold: u64,
}

// Default values
fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_metadata_file() -> String {
    ".backup_metadata.json".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_concurrency_budget() -> u32 {
    8
}

fn default_large_file_threshold() -> u64 {
    100 * 1024 * 1024 // 100MB
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            full: false,
            metadata_file: default_metadata_file(),
            include_teams: true,
            include_users: true,
            include_scoreboard: true,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            concurrency_budget: default_concurrency_budget(),
            large_file_threshold: default_large_file_threshold(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Create a default configuration for the given CTFd URL
    pub fn for_url(url: impl Into<String>) -> Self {
        Config {
            remote: RemoteConfig {
                url: url.into(),
                token: None,
                request_timeout_secs: default_request_timeout_secs(),
                connect_timeout_secs: default_connect_timeout_secs(),
                probe_file_metadata: true,
            },
            backup: BackupConfig::default(),
            log: LogConfig::default(),
            performance: PerformanceConfig::default(),
        }
    }

    /// Reject settings no run can use. Called after flags are merged.
    pub fn validate(&self) -> Result<()> {
        if self.remote.url.trim().is_empty() {
            return Err(BackupError::Config(
                "no CTFd URL given: pass it as an argument or set [remote].url".into(),
            ));
        }
        if self.backup.metadata_file.trim().is_empty() {
            return Err(BackupError::Config("[backup].metadata_file cannot be empty".into()));
        }
        if self.performance.large_file_threshold == 0 {
            return Err(BackupError::Config(
                "[performance].large_file_threshold must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
