//! Job source backed by JSON files
//!
//! The jobs file holds an array of objects, one per job, oldest first. The
//! roster file holds an array of `{"id": ..., "name": ...}` entries where ids
//! may be numbers or strings.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dispatch_coordination::{
    Candidate, DispatchError, DispatchResult, Job, JobSource, RecipientId, Roster,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

/// Fields dropped from every job before it is shown to anyone
pub const DEFAULT_IGNORED_FIELDS: &[&str] = &["timestamp"];

#[derive(Debug, Clone)]
pub struct FileJobSource {
    jobs_path: PathBuf,
    roster_path: PathBuf,
    ignored_fields: Vec<String>,
}

impl FileJobSource {
    pub fn new(jobs_path: impl Into<PathBuf>, roster_path: impl Into<PathBuf>) -> Self {
        Self {
            jobs_path: jobs_path.into(),
            roster_path: roster_path.into(),
            ignored_fields: DEFAULT_IGNORED_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn with_ignored_fields(mut self, fields: Vec<String>) -> Self {
        self.ignored_fields = fields;
        self
    }

    fn to_job(&self, record: Map<String, Value>) -> Job {
        Job::new(
            record
                .into_iter()
                .filter(|(name, _)| !self.ignored_fields.iter().any(|f| f == name))
                .map(|(name, value)| (name, display_value(value))),
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(i64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct RosterEntry {
    id: RawId,
    name: String,
}

impl From<RosterEntry> for Candidate {
    fn from(entry: RosterEntry) -> Self {
        let id = match entry.id {
            RawId::Number(n) => RecipientId::from(n),
            RawId::Text(s) => RecipientId::from(s),
        };
        Candidate::new(id, entry.name)
    }
}

fn display_value(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> DispatchResult<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| DispatchError::Source {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
    serde_json::from_str(&raw).map_err(|e| DispatchError::Source {
        message: format!("failed to parse {}: {e}", path.display()),
    })
}

#[async_trait]
impl JobSource for FileJobSource {
    async fn latest_job(&self) -> DispatchResult<Job> {
        let mut records: Vec<Map<String, Value>> = read_json(&self.jobs_path).await?;
        let record = records.pop().ok_or(DispatchError::NoJobAvailable)?;
        let job = self.to_job(record);
        if job.is_empty() {
            return Err(DispatchError::NoJobAvailable);
        }
        debug!(path = %self.jobs_path.display(), fields = job.fields().len(), "Loaded latest job");
        Ok(job)
    }

    async fn roster(&self) -> DispatchResult<Roster> {
        let entries: Vec<RosterEntry> = read_json(&self.roster_path).await?;
        Roster::new(entries.into_iter().map(Candidate::from).collect())
    }
}
