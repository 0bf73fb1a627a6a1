use crate::config::OutputConfig;
use crate::constants::{AUDIT_FILE, COMBINED_DOCUMENT};
use crate::error::{Result, ScraperError};
use crate::normalize::format::offset_string;
use crate::types::{Event, RunResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Event as handed to persistence: the canonical fields plus both ends
/// rendered at the publication offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedEvent {
    #[serde(flatten)]
    pub event: Event,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl From<&Event> for PublishedEvent {
    fn from(event: &Event) -> Self {
        Self {
            start: offset_string(&event.start_date, &event.start_time),
            end: offset_string(&event.end_date, &event.end_time),
            event: event.clone(),
        }
    }
}

/// Whole-run payload for remote stores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDocument {
    pub count: usize,
    pub completed_at: DateTime<Utc>,
    pub summary: String,
    pub events: BTreeMap<u64, PublishedEvent>,
}

impl From<&RunResult> for RunDocument {
    fn from(run: &RunResult) -> Self {
        Self {
            count: run.count,
            completed_at: run.completed_at,
            summary: run.summary_line(),
            events: published(run.events.iter()),
        }
    }
}

fn published<'a>(events: impl Iterator<Item = (&'a u64, &'a Event)>) -> BTreeMap<u64, PublishedEvent> {
    events.map(|(id, event)| (*id, PublishedEvent::from(event))).collect()
}

/// Persistence collaborator. Receives each finished run exactly once.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn save(&self, run: &RunResult) -> Result<()>;

    /// Where the run went, for logs.
    fn describe(&self) -> String;
}

/// Writes the combined document, one document per source and the audit line
/// into a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn document_path(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{}.json", stem))
    }

    pub fn source_document_path(&self, source_name: &str) -> PathBuf {
        self.document_path(&format!("{}_events", source_name))
    }

    pub fn audit_path(&self) -> PathBuf {
        self.dir.join(AUDIT_FILE)
    }

    async fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        tokio::fs::write(path, json).await?;
        debug!("Wrote {}", path.display());
        Ok(())
    }
}

#[async_trait]
impl EventStore for JsonFileStore {
    #[instrument(skip(self, run), fields(dir = %self.dir.display()))]
    async fn save(&self, run: &RunResult) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        for report in &run.sources {
            let events: BTreeMap<u64, PublishedEvent> = run
                .events_for(&report.name)
                .into_iter()
                .map(|(id, event)| (id, PublishedEvent::from(event)))
                .collect();
            self.write_json(&self.source_document_path(&report.name), &events)
                .await?;
        }

        let combined = published(run.events.iter());
        self.write_json(&self.document_path(COMBINED_DOCUMENT), &combined)
            .await?;

        tokio::fs::write(self.audit_path(), format!("{}\n", run.summary_line())).await?;
        info!("Saved {} events to {}", run.count, self.dir.display());
        Ok(())
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

/// PUTs the run document to a remote endpoint that keeps timestamped versions.
#[derive(Debug, Clone)]
pub struct RemoteStore {
    client: reqwest::Client,
    url: String,
}

impl RemoteStore {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ScraperError::Config(format!("failed to build remote store client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl EventStore for RemoteStore {
    #[instrument(skip(self, run), fields(url = %self.url))]
    async fn save(&self, run: &RunResult) -> Result<()> {
        let document = RunDocument::from(run);
        let resp = self
            .client
            .put(&self.url)
            .json(&document)
            .send()
            .await
            .map_err(|e| ScraperError::Storage {
                message: format!("PUT {} failed: {}", self.url, e),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ScraperError::Storage {
                message: format!("PUT {} answered {}", self.url, status.as_u16()),
            });
        }
        info!("Stored {} events remotely", document.count);
        Ok(())
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Keeps every saved run in memory, newest last.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    runs: Arc<Mutex<Vec<RunResult>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<RunResult> {
        self.runs.lock().ok().and_then(|runs| runs.last().cloned())
    }

    pub fn len(&self) -> usize {
        self.runs.lock().map(|runs| runs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventStore for InMemoryStore {
    async fn save(&self, run: &RunResult) -> Result<()> {
        let mut runs = self.runs.lock().map_err(|_| ScraperError::Storage {
            message: "in-memory store lock poisoned".to_string(),
        })?;
        runs.push(run.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Stores named by the output settings: always the JSON directory, plus the
/// remote endpoint when one is configured.
pub fn stores_for(output: &OutputConfig) -> Result<Vec<Box<dyn EventStore>>> {
    let mut stores: Vec<Box<dyn EventStore>> = vec![Box::new(JsonFileStore::new(&output.dir))];
    if let Some(url) = output.remote_url.as_deref().filter(|u| !u.trim().is_empty()) {
        stores.push(Box::new(RemoteStore::new(url)?));
    }
    Ok(stores)
}
