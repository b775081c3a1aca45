//! Durable job outcomes (the checkpoint file).
//!
//! The store is loaded once at startup and rewritten in full, atomically,
//! every time an outcome is recorded. A job only counts as done once
//! `record_outcome` has returned.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Checkpoint format version.
const STORE_VERSION: u32 = 1;

/// Errors from loading or writing the checkpoint.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The checkpoint exists but cannot be parsed.
    #[error("Checkpoint {path} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("Checkpoint I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize checkpoint: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Terminal status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// Persisted outcome for one reference id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub status: JobStatus,
    /// Error text for failed jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of frame pairs written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_pairs: Option<usize>,
    /// RFC 3339 time the outcome was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<String>,
}

impl JobRecord {
    pub fn succeeded(frame_pairs: usize) -> Self {
        Self {
            status: JobStatus::Succeeded,
            error: None,
            frame_pairs: Some(frame_pairs),
            recorded_at: Some(chrono::Utc::now().to_rfc3339()),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            error: Some(error.into()),
            frame_pairs: None,
            recorded_at: Some(chrono::Utc::now().to_rfc3339()),
        }
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == JobStatus::Succeeded
    }
}

/// On-disk layout of the checkpoint.
#[derive(Debug, Serialize, Deserialize)]
struct StoreState {
    version: u32,
    #[serde(default)]
    jobs: BTreeMap<String, JobRecord>,
}

/// Mapping from reference id to outcome, backed by a checkpoint file.
#[derive(Debug)]
pub struct JobStore {
    path: PathBuf,
    records: BTreeMap<String, JobRecord>,
}

impl JobStore {
    /// Load the checkpoint at `path`.
    ///
    /// A missing or blank file yields an empty store. A file that exists
    /// but cannot be parsed is an error: prior progress is never dropped.
    pub fn load(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();

        let records = match fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => {
                let state: StoreState =
                    serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
                        path: path.clone(),
                        message: e.to_string(),
                    })?;
                if state.version != STORE_VERSION {
                    return Err(StoreError::Corrupt {
                        path,
                        message: format!("unsupported version {}", state.version),
                    });
                }
                state.jobs
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        tracing::info!(
            "Loaded {} job records from {}",
            records.len(),
            path.display()
        );
        Ok(Self { path, records })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, reference_id: &str) -> Option<&JobRecord> {
        self.records.get(reference_id)
    }

    /// Whether the job has a succeeded record.
    pub fn is_succeeded(&self, reference_id: &str) -> bool {
        self.get(reference_id).is_some_and(JobRecord::is_succeeded)
    }

    pub fn records(&self) -> &BTreeMap<String, JobRecord> {
        &self.records
    }

    /// Failed records, in reference id order.
    pub fn failed(&self) -> impl Iterator<Item = (&str, &JobRecord)> {
        self.records
            .iter()
            .filter(|(_, r)| !r.is_succeeded())
            .map(|(k, r)| (k.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record an outcome and rewrite the checkpoint.
    ///
    /// An existing record for the same id is replaced.
    pub fn record_outcome(&mut self, reference_id: &str, record: JobRecord) -> StoreResult<()> {
        self.records.insert(reference_id.to_string(), record);
        self.save()
    }

    /// Write the full checkpoint via a temp file and rename.
    fn save(&self) -> StoreResult<()> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let state = StoreState {
            version: STORE_VERSION,
            jobs: self.records.clone(),
        };
        let json = serde_json::to_string_pretty(&state)?;

        let temp_path = temp_path_for(&self.path);
        let mut file = File::create(&temp_path).map_err(io_err)?;
        file.write_all(json.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);
        fs::rename(&temp_path, &self.path).map_err(io_err)?;

        tracing::debug!("Saved {} job records to {}", self.records.len(), self.path.display());
        Ok(())
    }
}

/// `<file name>.tmp` in the same directory, so the rename stays atomic.
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "checkpoint".to_string());
    path.with_file_name(format!("{}.tmp", name))
}
