//! Write-to-temp then rename, so readers never observe a half-written file.

use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Temporary sibling of `target` in the same directory (rename stays on one filesystem).
pub fn temp_path_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.{}.part", name, Uuid::new_v4().simple()))
}

/// Atomically replace `target` with `contents`.
pub async fn write_atomic(target: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = temp_path_for(target);
    let result = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, target).await
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_path_is_hidden_sibling() {
        let tmp = temp_path_for(Path::new("/backup/challenges/web/a.zip"));
        assert_eq!(tmp.parent(), Some(Path::new("/backup/challenges/web")));

        let name = tmp.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".a.zip."));
        assert!(name.ends_with(".part"));
    }

    #[tokio::test]
    async fn test_write_atomic_creates_and_replaces() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("nested").join("data.json");

        write_atomic(&target, b"first").await?;
        assert_eq!(std::fs::read(&target)?, b"first");

        write_atomic(&target, b"second").await?;
        assert_eq!(std::fs::read(&target)?, b"second");

        // Only the target remains, no leftover temp files
        let entries = std::fs::read_dir(target.parent().unwrap())?.count();
        assert_eq!(entries, 1);
        Ok(())
    }
}
