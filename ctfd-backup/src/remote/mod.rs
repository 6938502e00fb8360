//! Remote CTF platform access.
//!
//! The sync engine only talks to [`RemoteSource`]; [`ctfd::CtfdClient`] is the
//! implementation over the CTFd REST API.

pub mod ctfd;

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Chunked file content, read progressively.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Modification time as reported by the platform or observed locally.
///
/// Opaque: only ever compared for equality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Unix(i64),
    Text(String),
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Unix(secs) => write!(f, "{}", secs),
            Timestamp::Text(text) => f.write_str(text),
        }
    }
}

/// A file attached to a challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// File name (last URL path segment)
    pub name: String,

    /// Absolute download URL
    pub url: String,

    /// Size in bytes, when the platform reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// Modification time, when the platform reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<Timestamp>,
}

/// Entry of the challenge listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeSummary {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
}

/// Full challenge detail, including attached files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeDescriptor {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub value: Option<i64>,
    #[serde(default)]
    pub files: Vec<RemoteFile>,
}

/// One page of a paginated listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, has_more: bool) -> Self {
        Self { items, has_more }
    }

    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, false)
    }
}

/// An already-authenticated connection to a CTF platform.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn list_challenges_page(&self, page: u32) -> Result<Page<ChallengeSummary>>;

    async fn challenge(&self, id: u64) -> Result<ChallengeDescriptor>;

    /// Open a download stream; the body is not read until polled.
    async fn fetch_file(&self, file: &RemoteFile) -> Result<ByteStream>;

    async fn list_teams_page(&self, page: u32) -> Result<Page<serde_json::Value>>;

    async fn list_users_page(&self, page: u32) -> Result<Page<serde_json::Value>>;

    async fn scoreboard(&self) -> Result<serde_json::Value>;
}
