//! In-memory collaborators for engine tests.

use crate::executor::BackupSummary;
use crate::remote::{ByteStream, ChallengeDescriptor, ChallengeSummary, Page, RemoteFile, RemoteSource};
use crate::report::{Listing, Reporter};
use crate::sync::SyncOutcome;
use crate::utils::errors::{BackupError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

const CHUNK_SIZE: usize = 4;

struct Challenge {
    id: u64,
    name: String,
    category: String,
    files: Vec<String>,
}

#[derive(Default)]
struct State {
    files: HashMap<String, Vec<u8>>,
    fetches: HashMap<String, usize>,
    fail_open: HashSet<String>,
    fail_mid_stream: HashSet<String>,
    hide_sizes: bool,
    challenges: Vec<Challenge>,
    broken_challenges: HashSet<u64>,
    teams: Vec<Vec<serde_json::Value>>,
    users: Vec<Vec<serde_json::Value>>,
    users_fail_on_page: Option<u32>,
    scoreboard: Option<serde_json::Value>,
}

/// A CTF platform held in memory. Files are keyed by name.
pub struct MemorySource {
    state: Mutex<State>,
    challenge_page_size: usize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            challenge_page_size: 2,
        }
    }

    pub fn put_file(&self, name: &str, content: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.files.insert(name.to_string(), content.to_vec());
        state.fail_open.remove(name);
        state.fail_mid_stream.remove(name);
    }

    pub fn fail_open(&self, name: &str) {
        self.state.lock().unwrap().fail_open.insert(name.to_string());
    }

    pub fn fail_mid_stream(&self, name: &str) {
        self.state.lock().unwrap().fail_mid_stream.insert(name.to_string());
    }

    /// Stop reporting file sizes, as a platform without HEAD support would.
    pub fn hide_sizes(&self) {
        self.state.lock().unwrap().hide_sizes = true;
    }

    pub fn fetch_count(&self, name: &str) -> usize {
        self.state.lock().unwrap().fetches.get(name).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.state.lock().unwrap().fetches.values().sum()
    }

    pub fn add_challenge(&self, id: u64, name: &str, category: &str, files: &[(&str, &[u8])]) {
        let mut state = self.state.lock().unwrap();
        for (file, content) in files {
            state.files.insert(file.to_string(), content.to_vec());
        }
        state.challenges.push(Challenge {
            id,
            name: name.to_string(),
            category: category.to_string(),
            files: files.iter().map(|(file, _)| file.to_string()).collect(),
        });
    }

    pub fn break_challenge(&self, id: u64) {
        self.state.lock().unwrap().broken_challenges.insert(id);
    }

    pub fn set_teams(&self, pages: Vec<Vec<serde_json::Value>>) {
        self.state.lock().unwrap().teams = pages;
    }

    pub fn set_users(&self, pages: Vec<Vec<serde_json::Value>>, fail_on_page: Option<u32>) {
        let mut state = self.state.lock().unwrap();
        state.users = pages;
        state.users_fail_on_page = fail_on_page;
    }

    pub fn set_scoreboard(&self, scoreboard: serde_json::Value) {
        self.state.lock().unwrap().scoreboard = Some(scoreboard);
    }

    /// Descriptor as the platform would currently report it.
    pub fn remote_file(&self, name: &str) -> RemoteFile {
        let state = self.state.lock().unwrap();
        Self::describe(&state, name)
    }

    fn describe(state: &State, name: &str) -> RemoteFile {
        let size = if state.hide_sizes {
            None
        } else {
            state.files.get(name).map(|c| c.len() as u64)
        };
        RemoteFile {
            name: name.to_string(),
            url: format!("mem://files/{}", name),
            size,
            mtime: None,
        }
    }

    fn page_of(pages: &[Vec<serde_json::Value>], page: u32) -> Page<serde_json::Value> {
        let index = page as usize - 1;
        Page::new(pages.get(index).cloned().unwrap_or_default(), index + 1 < pages.len())
    }
}

#[async_trait]
impl RemoteSource for MemorySource {
    async fn list_challenges_page(&self, page: u32) -> Result<Page<ChallengeSummary>> {
        let state = self.state.lock().unwrap();
        let start = (page as usize - 1) * self.challenge_page_size;
        let items: Vec<ChallengeSummary> = state
            .challenges
            .iter()
            .skip(start)
            .take(self.challenge_page_size)
            .map(|c| ChallengeSummary {
                id: c.id,
                name: c.name.clone(),
                category: Some(c.category.clone()),
            })
            .collect();
        let has_more = start + items.len() < state.challenges.len();
        Ok(Page::new(items, has_more))
    }

    async fn challenge(&self, id: u64) -> Result<ChallengeDescriptor> {
        let state = self.state.lock().unwrap();
        if state.broken_challenges.contains(&id) {
            return Err(BackupError::Api {
                status: 500,
                message: format!("challenges/{}", id),
            });
        }
        let challenge = state
            .challenges
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| BackupError::Api {
                status: 404,
                message: format!("challenges/{}", id),
            })?;

        Ok(ChallengeDescriptor {
            id,
            name: challenge.name.clone(),
            category: Some(challenge.category.clone()),
            description: Some(format!("Solve {}", challenge.name)),
            value: Some(100),
            files: challenge.files.iter().map(|f| Self::describe(&state, f)).collect(),
        })
    }

    async fn fetch_file(&self, file: &RemoteFile) -> Result<ByteStream> {
        let mut state = self.state.lock().unwrap();
        *state.fetches.entry(file.name.clone()).or_default() += 1;

        if state.fail_open.contains(&file.name) {
            return Err(BackupError::Network(format!("{}: connection refused", file.name)));
        }
        let content = state
            .files
            .get(&file.name)
            .cloned()
            .ok_or_else(|| BackupError::Api {
                status: 404,
                message: file.name.clone(),
            })?;

        let mut chunks: Vec<Result<Bytes>> = content
            .chunks(CHUNK_SIZE)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        if state.fail_mid_stream.contains(&file.name) {
            chunks.truncate(1);
            chunks.push(Err(BackupError::Network("connection reset".into())));
        }

        Ok(stream::iter(chunks).boxed())
    }

    async fn list_teams_page(&self, page: u32) -> Result<Page<serde_json::Value>> {
        let state = self.state.lock().unwrap();
        Ok(Self::page_of(&state.teams, page))
    }

    async fn list_users_page(&self, page: u32) -> Result<Page<serde_json::Value>> {
        let state = self.state.lock().unwrap();
        if state.users_fail_on_page == Some(page) {
            return Err(BackupError::Network(format!("users page {}: timeout", page)));
        }
        Ok(Self::page_of(&state.users, page))
    }

    async fn scoreboard(&self) -> Result<serde_json::Value> {
        let state = self.state.lock().unwrap();
        Ok(state.scoreboard.clone().unwrap_or_else(|| serde_json::json!([])))
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    ChallengeStart(String),
    ChallengeError(String),
    File(String, SyncOutcome),
    Listing(Listing, usize, bool),
    Summary(BackupSummary),
}

/// Keeps every event for later assertions.
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<Event>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn outcomes(&self) -> Vec<(String, SyncOutcome)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::File(path, outcome) => Some((path, outcome)),
                _ => None,
            })
            .collect()
    }

    pub fn outcome_for(&self, path: &str) -> Option<SyncOutcome> {
        self.outcomes().into_iter().rev().find(|(p, _)| p == path).map(|(_, o)| o)
    }

    pub fn summaries(&self) -> Vec<BackupSummary> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Summary(summary) => Some(summary),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl Reporter for RecordingReporter {
    fn on_challenge_start(&self, name: &str) {
        self.push(Event::ChallengeStart(name.to_string()));
    }

    fn on_challenge_error(&self, name: &str, _error: &BackupError) {
        self.push(Event::ChallengeError(name.to_string()));
    }

    fn on_file_outcome(&self, path: &str, outcome: &SyncOutcome) {
        self.push(Event::File(path.to_string(), outcome.clone()));
    }

    fn on_listing_complete(&self, listing: Listing, count: usize, error: Option<&BackupError>) {
        self.push(Event::Listing(listing, count, error.is_some()));
    }

    fn on_run_summary(&self, summary: &BackupSummary) {
        self.push(Event::Summary(summary.clone()));
    }
}
