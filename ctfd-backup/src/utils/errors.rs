//! Error types for the backup engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Metadata store is corrupt: {0}")]
    MetadataCorrupt(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Transfer truncated: expected {expected} bytes, received {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("Cancelled")]
    Cancelled,
}

impl BackupError {
    /// Network-level failures that a later run may not hit again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BackupError::Network(_)
                | BackupError::Http(_)
                | BackupError::Api { .. }
                | BackupError::SizeMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
