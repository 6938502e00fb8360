//! JSON artifacts written next to the downloaded files.

use crate::fs::atomic::write_atomic;
use crate::fs::paths::{join_relative, sanitize_component};
use crate::remote::ChallengeDescriptor;
use crate::utils::errors::Result;
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

pub const CHALLENGE_FILE: &str = "challenge.json";
pub const TEAMS_FILE: &str = "teams/teams.json";
pub const USERS_FILE: &str = "users/users.json";
pub const SCOREBOARD_FILE: &str = "scoreboard/scoreboard.json";

/// Relative directory for a challenge: `challenges/<category>/<name>`.
pub fn challenge_dir(category: Option<&str>, name: &str) -> String {
    let category = sanitize_component(category.unwrap_or_default(), "uncategorized");
    let name = sanitize_component(name, "unknown");
    join_relative(&["challenges", &category, &name])
}

/// Local name for an attachment. The descriptor name is reserved, so an
/// attachment called `challenge.json` (in any case) is stored as `_challenge.json`.
pub fn attachment_name(name: &str) -> String {
    if name.eq_ignore_ascii_case(CHALLENGE_FILE) {
        format!("_{}", name)
    } else {
        name.to_string()
    }
}

/// Sibling that holds an incomplete listing: `users/users.json` -> `users/users.partial.json`.
pub fn partial_path(relative: &str) -> String {
    match relative.strip_suffix(".json") {
        Some(stem) => format!("{}.partial.json", stem),
        None => format!("{}.partial", relative),
    }
}

/// Writes pretty-printed JSON under the backup root, atomically.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    root: PathBuf,
}

impl ArtifactWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Serialize `value` to `<root>/<relative>`. `relative` uses `/` separators.
    pub async fn write_json<T: Serialize + ?Sized>(&self, relative: &str, value: &T) -> Result<()> {
        let target = self.path_of(relative);
        let json = serde_json::to_vec_pretty(value)?;
        write_atomic(&target, &json).await?;
        debug!(path = %relative, bytes = json.len(), "Wrote artifact");
        Ok(())
    }

    /// Write the descriptor as `<dir>/challenge.json`.
    pub async fn write_challenge(&self, dir: &str, challenge: &ChallengeDescriptor) -> Result<()> {
        self.write_json(&join_relative(&[dir, CHALLENGE_FILE]), challenge).await
    }

    /// Remove an artifact if present.
    pub async fn remove(&self, relative: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_of(relative)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn path_of(&self, relative: &str) -> PathBuf {
        relative.split('/').fold(self.root.clone(), |path, part| path.join(part))
    }
}
