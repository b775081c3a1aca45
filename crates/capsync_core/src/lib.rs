//! capsync core - batch correlation of color/depth sensor captures.
//!
//! This crate contains all business logic with no CLI concerns:
//! frame models, the temporal correlator, capture decoding capabilities,
//! output writers, job tracking and the two-stage batch runner.

pub mod capture;
pub mod config;
pub mod correlate;
pub mod jobs;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod output;

#[cfg(test)]
mod test_support;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
