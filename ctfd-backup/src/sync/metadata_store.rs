//! Persisted record of every successfully synced file.
//!
//! Serialized as `.backup_metadata.json` at the backup root: an object keyed
//! by relative path, each value `{ "size": .., "mtime": .., "hash": .. }`.
//! The whole mapping is rewritten on every save; there are no delta writes.

use crate::fs::atomic::write_atomic;
use crate::remote::Timestamp;
use crate::utils::errors::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const DEFAULT_METADATA_FILE: &str = ".backup_metadata.json";

/// Metadata for one file as of its last successful sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Relative path from the backup root (also the map key)
    #[serde(skip)]
    pub path: String,

    pub size: u64,

    pub mtime: Timestamp,

    /// Hex SHA-256 of the content
    pub hash: String,
}

/// In-memory `path -> FileRecord` map bound to its file on disk.
#[derive(Debug)]
pub struct MetadataStore {
    location: PathBuf,
    records: BTreeMap<String, FileRecord>,
}

impl MetadataStore {
    /// Empty store that will save to `location`.
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            records: BTreeMap::new(),
        }
    }

    /// Load the store from `location`.
    ///
    /// A missing or unparsable file yields an empty store: it only means the
    /// next run has no prior backup to compare against.
    pub async fn load(location: impl Into<PathBuf>) -> Self {
        let location = location.into();
        let data = match tokio::fs::read(&location).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %location.display(), "No metadata store, starting fresh");
                return Self::new(location);
            }
            Err(e) => {
                warn!(path = %location.display(), error = %e, "Failed to read metadata store, starting fresh");
                return Self::new(location);
            }
        };

        match Self::decode(&data) {
            Ok(records) => {
                info!(path = %location.display(), files = records.len(), "Loaded metadata store");
                Self { location, records }
            }
            Err(e) => {
                warn!(path = %location.display(), error = %e, "Ignoring metadata store");
                Self::new(location)
            }
        }
    }

    fn decode(data: &[u8]) -> Result<BTreeMap<String, FileRecord>> {
        let mut records: BTreeMap<String, FileRecord> =
            serde_json::from_slice(data).map_err(|e| BackupError::MetadataCorrupt(e.to_string()))?;
        for (path, record) in records.iter_mut() {
            record.path = path.clone();
        }
        Ok(records)
    }

    /// Atomically replace the file on disk with the full mapping.
    pub async fn save(&self) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.records)?;
        write_atomic(&self.location, &json).await?;
        debug!(path = %self.location.display(), files = self.records.len(), "Saved metadata store");
        Ok(())
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.records.get(path)
    }

    /// Insert or wholesale-replace the record for `record.path`.
    pub fn upsert(&mut self, record: FileRecord) -> Option<FileRecord> {
        self.records.insert(record.path.clone(), record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, size: u64) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            size,
            mtime: Timestamp::Unix(1_700_000_000),
            hash: "ab".repeat(32),
        }
    }

    #[tokio::test]
    async fn test_missing_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::load(dir.path().join(DEFAULT_METADATA_FILE)).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_METADATA_FILE);
        std::fs::write(&path, b"{\"a.zip\": {\"size\": ").unwrap();

        let store = MetadataStore::load(&path).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_METADATA_FILE);

        let mut store = MetadataStore::new(&path);
        store.upsert(record("challenges/web/Web1/a.zip", 10));
        store.upsert(record("challenges/crypto/Crypto1/c.py", 20));
        store.save().await.unwrap();

        let loaded = MetadataStore::load(&path).await;
        assert_eq!(loaded.len(), 2);
        let a = loaded.get("challenges/web/Web1/a.zip").unwrap();
        assert_eq!(a.path, "challenges/web/Web1/a.zip");
        assert_eq!(a, &record("challenges/web/Web1/a.zip", 10));
    }

    #[tokio::test]
    async fn test_persisted_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_METADATA_FILE);

        let mut store = MetadataStore::new(&path);
        store.upsert(FileRecord {
            path: "b.txt".into(),
            size: 3,
            mtime: Timestamp::Text("Wed, 21 Oct 2015 07:28:00 GMT".into()),
            hash: "ff".into(),
        });
        store.save().await.unwrap();

        let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(
            raw,
            serde_json::json!({
                "b.txt": {"size": 3, "mtime": "Wed, 21 Oct 2015 07:28:00 GMT", "hash": "ff"}
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_fields_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_METADATA_FILE);
        std::fs::write(
            &path,
            br#"{"a.zip": {"size": 1, "mtime": 5, "hash": "00", "etag": "W/1", "origin": {"x": 1}}}"#,
        )
        .unwrap();

        let store = MetadataStore::load(&path).await;
        let a = store.get("a.zip").unwrap();
        assert_eq!(a.size, 1);
        assert_eq!(a.mtime, Timestamp::Unix(5));
    }

    #[test]
    fn test_upsert_replaces_wholesale() {
        let mut store = MetadataStore::new("/unused");
        assert!(store.upsert(record("a.zip", 1)).is_none());

        let previous = store.upsert(record("a.zip", 2)).unwrap();
        assert_eq!(previous.size, 1);
        assert_eq!(store.get("a.zip").unwrap().size, 2);
        assert_eq!(store.len(), 1);
    }
}
