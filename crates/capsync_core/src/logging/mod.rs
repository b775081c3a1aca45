//! Logging infrastructure for capsync.
//!
//! This module provides:
//! - Global `tracing` setup (stderr, plus an optional run log file)
//! - Per-job log files with progress filtering
//!
//! # Example
//!
//! ```no_run
//! use capsync_core::logging::{JobLogger, LogConfig};
//!
//! let logger = JobLogger::new("site_run.bag", "/path/to/logs", LogConfig::default()).unwrap();
//! logger.phase("Decode");
//! logger.progress(40);
//! logger.success("128 pairs written");
//! ```

mod job_logger;
mod types;

pub use job_logger::JobLogger;
pub use types::{LogConfig, LogLevel, MessagePrefix};

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// File name of the run-wide log inside the log directory.
pub const RUN_LOG_FILE: &str = "capsync.log";

/// Initialize the global tracing subscriber.
///
/// - Respects `RUST_LOG`, falling back to `default_level`
/// - Writes to stderr
/// - When `log_dir` is given, also appends to `<log_dir>/capsync.log`
///   through a non-blocking writer
///
/// The returned guard flushes the file writer on drop and must be held for
/// the lifetime of the program. Should be called once at startup.
pub fn init_tracing(default_level: LogLevel, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_filter_str()));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, RUN_LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false),
        )
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_filter_strings() {
        assert_eq!(LogLevel::Debug.as_filter_str(), "debug");
        assert_eq!(LogLevel::Info.to_string(), "info");
    }
}
