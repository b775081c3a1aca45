//! Job model, discovery and durable outcome tracking.
//!
//! This module provides:
//! - `Job`: one capture file with its derived output/label/staging paths
//! - `discover_jobs`: recursive scan of the input tree, smallest files first
//! - `JobStore`: checkpoint of per-job outcomes with atomic rewrites

mod discovery;
mod job;
mod store;

pub use discovery::{discover_jobs, DiscoveryError, DiscoveryRoots};
pub use job::Job;
pub use store::{JobRecord, JobStatus, JobStore, StoreError, StoreResult};
