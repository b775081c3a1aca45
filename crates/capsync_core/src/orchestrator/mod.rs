//! Batch orchestration: staging, per-job processing and the two-stage
//! runner.
//!
//! # Architecture
//!
//! ```text
//! PipelineRunner
//!     ├── discover_jobs + JobStore filter
//!     ├── staging thread     (stage_job)
//!     └── processing threads (JobProcessor -> JobStore::record_outcome)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use capsync_core::capture::ExternalDecoder;
//! use capsync_core::orchestrator::{PipelineRunner, RunConfig};
//!
//! let config = RunConfig::new("/data", "/out", "/state/progress.json", "/fast");
//! let decoder = ExternalDecoder::new("bag-export", vec!["{input}".into(), "{output}".into()]);
//! let runner = PipelineRunner::new(config, decoder);
//! let summary = runner.run().unwrap();
//! println!("{} succeeded, {} failed", summary.succeeded, summary.failed);
//! ```

mod errors;
mod processor;
mod runner;
mod staging;
mod types;

pub use errors::{JobError, JobResult, RunError, RunResult, StagingError};
pub use processor::{JobOutcome, JobProcessor, ProcessOptions};
pub use runner::{CancelHandle, PipelineRunner};
pub use staging::{release_staged, stage_job};
pub use types::{ProgressCallback, RunConfig, RunSummary};
