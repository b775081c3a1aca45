//! Error types for the batch pipeline.
//!
//! Job-level errors are recorded in the checkpoint and never stop the run.
//! Run-level errors are fatal.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::capture::CaptureError;
use crate::correlate::CorrelateError;
use crate::jobs::{DiscoveryError, StoreError};
use crate::output::OutputError;

/// Copying a capture into fast storage failed.
#[derive(Error, Debug)]
pub enum StagingError {
    #[error("Source file missing: {0}")]
    SourceMissing(PathBuf),

    #[error("I/O error in {operation} ({path}): {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StagingError {
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}

/// Why a single job failed. The `Display` text is what the checkpoint
/// records.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Staging failed: {0}")]
    Staging(#[from] StagingError),

    #[error("Decode failed: {0}")]
    Decode(#[from] CaptureError),

    #[error("Correlation failed: {0}")]
    Correlation(#[from] CorrelateError),

    #[error("Output failed: {0}")]
    Output(#[from] OutputError),

    /// The job log could not be created.
    #[error("Failed to open job log: {0}")]
    Log(#[source] io::Error),

    /// A decoder or writer panicked while processing the job.
    #[error("Job panicked: {0}")]
    Panicked(String),
}

/// Result type for per-job operations.
pub type JobResult<T> = Result<T, JobError>;

/// Errors that stop a whole run.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Job discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] StoreError),

    /// Invalid run configuration (missing paths, unreadable time ranges).
    #[error("Run setup failed: {message}")]
    Setup { message: String },

    #[error("{0} thread panicked")]
    WorkerPanicked(&'static str),
}

impl RunError {
    pub fn setup(message: impl Into<String>) -> Self {
        Self::Setup {
            message: message.into(),
        }
    }
}

/// Result type for run-level operations.
pub type RunResult<T> = Result<T, RunError>;
