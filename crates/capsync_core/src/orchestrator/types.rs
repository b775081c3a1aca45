//! Run configuration and results.

use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::correlate::{read_time_ranges, TimeRange};
use crate::logging::LogConfig;

use super::errors::{RunError, RunResult};

/// Progress callback: (reference id, decode percent).
pub type ProgressCallback = Box<dyn Fn(&str, u32) + Send + Sync>;

/// Everything a run needs besides the pluggable components.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Root of the capture tree.
    pub input_root: PathBuf,
    /// Root receiving `<name>` and `<name>_label` folders.
    pub output_root: PathBuf,
    /// Checkpoint file.
    pub checkpoint_path: PathBuf,
    /// Fast local storage for staged copies.
    pub staging_dir: PathBuf,
    /// Per-job log files.
    pub log_dir: PathBuf,
    /// Staged jobs buffered between the stages.
    pub queue_capacity: usize,
    pub processing_workers: usize,
    /// Capture file extension, without the dot.
    pub capture_extension: String,
    pub max_skew: f64,
    pub ignore_frame_errors: bool,
    pub metadata_entries: usize,
    pub time_ranges: Vec<TimeRange>,
    pub log_config: LogConfig,
}

impl RunConfig {
    /// Configuration with default tuning. Job logs go to
    /// `<output_root>/.logs`.
    pub fn new(
        input_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
        checkpoint_path: impl Into<PathBuf>,
        staging_dir: impl Into<PathBuf>,
    ) -> Self {
        let output_root = output_root.into();
        let defaults = Settings::default();
        Self {
            input_root: input_root.into(),
            log_dir: output_root.join(".logs"),
            output_root,
            checkpoint_path: checkpoint_path.into(),
            staging_dir: staging_dir.into(),
            queue_capacity: defaults.pipeline.queue_capacity,
            processing_workers: defaults.pipeline.processing_workers,
            capture_extension: defaults.pipeline.capture_extension,
            max_skew: defaults.correlation.max_skew,
            ignore_frame_errors: defaults.pipeline.ignore_frame_errors,
            metadata_entries: defaults.correlation.metadata_entries,
            time_ranges: Vec::new(),
            log_config: defaults.logging.to_log_config(),
        }
    }

    /// Build from loaded settings. All four locations must be set and the
    /// time-range file (if any) must parse.
    pub fn from_settings(settings: &Settings) -> RunResult<Self> {
        settings.validate().map_err(RunError::setup)?;

        let paths = &settings.paths;
        let mut config = Self::new(
            required_path(&paths.input_root, "input_root")?,
            required_path(&paths.output_root, "output_root")?,
            required_path(&paths.checkpoint, "checkpoint")?,
            required_path(&paths.cache_dir, "cache_dir")?,
        );

        if !paths.logs_folder.trim().is_empty() {
            config.log_dir = PathBuf::from(&paths.logs_folder);
        }
        config.queue_capacity = settings.pipeline.queue_capacity;
        config.processing_workers = settings.pipeline.processing_workers;
        config.capture_extension = settings.pipeline.capture_extension.trim().to_string();
        config.ignore_frame_errors = settings.pipeline.ignore_frame_errors;
        config.max_skew = settings.correlation.max_skew;
        config.metadata_entries = settings.correlation.metadata_entries;
        config.log_config = settings.logging.to_log_config();

        if let Some(file) = settings
            .correlation
            .time_ranges_file
            .as_deref()
            .filter(|f| !f.trim().is_empty())
        {
            config.time_ranges = read_time_ranges(Path::new(file))
                .map_err(|e| RunError::setup(format!("time ranges: {}", e)))?;
        }

        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> RunResult<()> {
        if self.queue_capacity == 0 {
            return Err(RunError::setup("queue capacity must be at least 1"));
        }
        if self.processing_workers == 0 {
            return Err(RunError::setup("at least one processing worker is required"));
        }
        if !self.max_skew.is_finite() || self.max_skew <= 0.0 {
            return Err(RunError::setup(format!(
                "max skew must be positive, got {}",
                self.max_skew
            )));
        }
        Ok(())
    }
}

fn required_path(value: &str, name: &str) -> RunResult<PathBuf> {
    if value.trim().is_empty() {
        Err(RunError::setup(format!("paths.{} is not set", name)))
    } else {
        Ok(PathBuf::from(value))
    }
}

/// Counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Capture files found under the input root.
    pub discovered: usize,
    /// Jobs already recorded as succeeded.
    pub skipped: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Pending jobs left unprocessed because the run was cancelled.
    pub not_started: usize,
    pub cancelled: bool,
}
