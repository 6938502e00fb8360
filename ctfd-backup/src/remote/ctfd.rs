//! CTFd REST API client.
//!
//! Speaks `/api/v1` with a pre-issued access token. Responses use the CTFd
//! envelope `{ "success": bool, "data": ..., "meta": { "pagination": ... } }`.

use super::{ByteStream, ChallengeDescriptor, ChallengeSummary, Page, RemoteFile, RemoteSource, Timestamp};
use crate::config::RemoteConfig;
use crate::fs::paths::file_name_from_url;
use crate::utils::errors::{BackupError, Result};
use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, LAST_MODIFIED};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: Option<bool>,
    data: T,
    #[serde(default)]
    meta: Option<Meta>,
}

#[derive(Debug, Default, Deserialize)]
struct Meta {
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Default, Deserialize)]
struct Pagination {
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    next: Option<u32>,
    #[serde(default)]
    pages: Option<u32>,
}

impl Pagination {
    fn has_more(&self) -> bool {
        if self.next.is_some() {
            return true;
        }
        match (self.page, self.pages) {
            (Some(page), Some(pages)) => page < pages,
            _ => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChallengeDetail {
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    value: Option<i64>,
    #[serde(default)]
    files: Vec<String>,
}

/// Prepend `https://` when no scheme is given and drop trailing slashes.
pub fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(BackupError::InvalidUrl("URL cannot be empty".into()));
    }

    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = Url::parse(&with_scheme).map_err(|e| BackupError::InvalidUrl(format!("{}: {}", raw, e)))?;
    if parsed.host_str().is_none() {
        return Err(BackupError::InvalidUrl(format!("{}: missing host", raw)));
    }

    Ok(with_scheme.trim_end_matches('/').to_string())
}

/// Directory name for a CTF instance: `host` or `host:port`.
pub fn site_name(base_url: &str) -> Result<String> {
    let parsed = Url::parse(base_url).map_err(|e| BackupError::InvalidUrl(e.to_string()))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| BackupError::InvalidUrl(format!("{}: missing host", base_url)))?;

    Ok(match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Client for one CTFd instance.
pub struct CtfdClient {
    http: Client,
    base_url: String,
    token: Option<String>,
    request_timeout: Duration,
    probe_file_metadata: bool,
}

impl CtfdClient {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let base_url = normalize_base_url(&config.url)?;

        // No overall timeout here: it would also cap long file downloads.
        // The read timeout bounds each wait for bytes, so a stalled body still fails.
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(format!("ctfd-backup/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url,
            token: config.token.clone().filter(|t| !t.is_empty()),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            probe_file_metadata: config.probe_file_metadata,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, endpoint)
    }

    /// Absolute URL for a file path as listed by CTFd (`/files/<hash>/a.zip?token=..`).
    fn file_url(&self, location: &str) -> String {
        if location.starts_with("http://") || location.starts_with("https://") {
            location.to_string()
        } else {
            format!("{}/{}", self.base_url, location.trim_start_matches('/'))
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("Token {}", token)),
            None => request,
        }
    }

    async fn check_status(response: Response, what: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(BackupError::Authentication(format!(
                "{} returned {}",
                what, status
            ))),
            _ => {
                let message = response.text().await.unwrap_or_default();
                Err(BackupError::Api {
                    status: status.as_u16(),
                    message: format!("{}: {}", what, message.trim()),
                })
            }
        }
    }

    async fn get_envelope<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Envelope<T>> {
        let url = self.api_url(endpoint);
        debug!(url = %url, "GET");

        let request = self
            .http
            .get(&url)
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.request_timeout);
        let response = self.authorized(request).send().await.map_err(network_error)?;
        let response = Self::check_status(response, endpoint).await?;

        let envelope: Envelope<T> = response.json().await?;
        if envelope.success == Some(false) {
            return Err(BackupError::Api {
                status: 200,
                message: format!("{}: success=false", endpoint),
            });
        }
        Ok(envelope)
    }

    async fn get_page<T: DeserializeOwned>(&self, resource: &str, page: u32) -> Result<Page<T>> {
        let envelope: Envelope<Vec<T>> = self.get_envelope(&format!("{}?page={}", resource, page)).await?;
        let has_more = envelope
            .meta
            .and_then(|m| m.pagination)
            .map(|p| p.has_more())
            .unwrap_or(false);
        Ok(Page::new(envelope.data, has_more))
    }

    /// HEAD a file for `Content-Length` and `Last-Modified`. Best effort.
    async fn probe(&self, url: &str) -> (Option<u64>, Option<Timestamp>) {
        let request = self.http.head(url).timeout(self.request_timeout);
        let response = match self.authorized(request).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                debug!(url = %url, status = %resp.status(), "HEAD probe rejected");
                return (None, None);
            }
            Err(e) => {
                debug!(url = %url, error = %e, "HEAD probe failed");
                return (None, None);
            }
        };

        // Read the header directly: a HEAD response has an empty body.
        let size = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let mtime = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(|v| Timestamp::Text(v.to_string()));

        (size, mtime)
    }
}

fn network_error(e: reqwest::Error) -> BackupError {
    if e.is_connect() || e.is_timeout() {
        BackupError::Network(e.to_string())
    } else {
        BackupError::Http(e)
    }
}

#[async_trait]
impl RemoteSource for CtfdClient {
    async fn list_challenges_page(&self, page: u32) -> Result<Page<ChallengeSummary>> {
        self.get_page("challenges", page).await
    }

    async fn challenge(&self, id: u64) -> Result<ChallengeDescriptor> {
        let envelope: Envelope<ChallengeDetail> = self.get_envelope(&format!("challenges/{}", id)).await?;
        let detail = envelope.data;

        let mut files = Vec::with_capacity(detail.files.len());
        for location in &detail.files {
            let url = self.file_url(location);
            let (size, mtime) = if self.probe_file_metadata {
                self.probe(&url).await
            } else {
                (None, None)
            };
            files.push(RemoteFile {
                name: file_name_from_url(location),
                url,
                size,
                mtime,
            });
        }

        Ok(ChallengeDescriptor {
            id: detail.id,
            name: detail.name.unwrap_or_else(|| "unknown".to_string()),
            category: detail.category,
            description: detail.description,
            value: detail.value,
            files,
        })
    }

    async fn fetch_file(&self, file: &RemoteFile) -> Result<ByteStream> {
        let response = self
            .authorized(self.http.get(&file.url))
            .send()
            .await
            .map_err(network_error)?;
        let response = Self::check_status(response, &file.name).await?;

        Ok(response.bytes_stream().map_err(network_error).boxed())
    }

    async fn list_teams_page(&self, page: u32) -> Result<Page<serde_json::Value>> {
        self.get_page("teams", page).await
    }

    async fn list_users_page(&self, page: u32) -> Result<Page<serde_json::Value>> {
        self.get_page("users", page).await
    }

    async fn scoreboard(&self) -> Result<serde_json::Value> {
        let envelope: Envelope<serde_json::Value> = self.get_envelope("scoreboard").await?;
        info!("Fetched scoreboard");
        Ok(envelope.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("demo.ctfd.io").unwrap(), "https://demo.ctfd.io");
        assert_eq!(normalize_base_url("http://localhost:8000/").unwrap(), "http://localhost:8000");
        assert_eq!(normalize_base_url(" https://ctf.example.com/ ").unwrap(), "https://ctf.example.com");
        assert!(matches!(normalize_base_url(""), Err(BackupError::InvalidUrl(_))));
    }

    #[test]
    fn test_site_name() {
        assert_eq!(site_name("https://demo.ctfd.io").unwrap(), "demo.ctfd.io");
        assert_eq!(site_name("http://127.0.0.1:8000").unwrap(), "127.0.0.1:8000");
    }

    #[test]
    fn test_pagination_has_more() {
        let next = Pagination { page: Some(1), next: Some(2), pages: Some(2) };
        assert!(next.has_more());

        let last = Pagination { page: Some(2), next: None, pages: Some(2) };
        assert!(!last.has_more());

        let by_count = Pagination { page: Some(1), next: None, pages: Some(3) };
        assert!(by_count.has_more());

        assert!(!Pagination::default().has_more());
    }

    #[test]
    fn test_file_url() {
        let client = CtfdClient::new(&crate::Config::for_url("ctf.example.com").remote).unwrap();
        assert_eq!(
            client.file_url("/files/ab12/a.zip?token=t"),
            "https://ctf.example.com/files/ab12/a.zip?token=t"
        );
        assert_eq!(client.file_url("https://cdn.example.com/b.txt"), "https://cdn.example.com/b.txt");
    }

    #[test]
    fn test_envelope_ignores_unknown_fields() {
        let envelope: Envelope<ChallengeDetail> = serde_json::from_str(
            r#"{"success": true, "data": {"id": 3, "name": "Web1", "type": "standard",
                "files": ["/files/x/a.zip"], "tags": []}}"#,
        )
        .unwrap();
        assert_eq!(envelope.data.id, 3);
        assert_eq!(envelope.data.files.len(), 1);
        assert!(envelope.meta.is_none());
    }
}
