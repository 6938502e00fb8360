//! Fetch-or-skip decision for a single remote file.
//!
//! [`decide`] uses only the cheap, remote-supplied signals (size, mtime) and
//! never touches the network or disk. When those cannot rule out a change it
//! answers [`Decision::VerifyLocal`], and [`verify_local`] settles the question
//! by hashing the copy already on disk instead of downloading it again.

use super::metadata_store::FileRecord;
use super::BackupMode;
use crate::fs::digest::file_digest;
use crate::remote::RemoteFile;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Why a file has to be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchReason {
    Forced,
    New,
    SizeChanged,
    MtimeChanged,
    LocalMissing,
    LocalModified,
}

impl fmt::Display for FetchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FetchReason::Forced => "full backup",
            FetchReason::New => "new file",
            FetchReason::SizeChanged => "remote size changed",
            FetchReason::MtimeChanged => "remote mtime changed",
            FetchReason::LocalMissing => "local copy missing",
            FetchReason::LocalModified => "local copy modified",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Fetch(FetchReason),
    /// Remote signals match; compare the local file against the stored hash.
    VerifyLocal,
    Skip,
}

impl Decision {
    pub fn is_fetch(&self) -> bool {
        matches!(self, Decision::Fetch(_))
    }
}

/// Decide from remote metadata alone. Never returns [`Decision::Skip`].
pub fn decide(remote: &RemoteFile, existing: Option<&FileRecord>, mode: BackupMode) -> Decision {
    if mode == BackupMode::Full {
        return Decision::Fetch(FetchReason::Forced);
    }

    let Some(existing) = existing else {
        return Decision::Fetch(FetchReason::New);
    };

    if matches!(remote.size, Some(size) if size != existing.size) {
        return Decision::Fetch(FetchReason::SizeChanged);
    }

    // Equality only: timestamps from different platform versions do not order reliably.
    if matches!(&remote.mtime, Some(mtime) if *mtime != existing.mtime) {
        return Decision::Fetch(FetchReason::MtimeChanged);
    }

    Decision::VerifyLocal
}

/// Check the local copy against the stored record.
pub async fn verify_local(local_path: &Path, existing: &FileRecord) -> Decision {
    match file_digest(local_path).await {
        Ok(hash) if hash == existing.hash => Decision::Skip,
        Ok(_) => Decision::Fetch(FetchReason::LocalModified),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Decision::Fetch(FetchReason::LocalMissing),
        Err(e) => {
            debug!(path = %local_path.display(), error = %e, "Local copy unreadable, refetching");
            Decision::Fetch(FetchReason::LocalModified)
        }
    }
}

/// Full decision: [`decide`], then [`verify_local`] when needed.
pub async fn should_fetch(
    remote: &RemoteFile,
    existing: Option<&FileRecord>,
    mode: BackupMode,
    local_path: &Path,
) -> Decision {
    match (decide(remote, existing, mode), existing) {
        (Decision::VerifyLocal, Some(existing)) => verify_local(local_path, existing).await,
        (Decision::VerifyLocal, None) => Decision::Fetch(FetchReason::New),
        (decision, _) => decision,
    }
}
