//! Settings struct with TOML-based sections.
//!
//! Every field has a serde default, so a partial (or empty) file loads
//! cleanly and missing values are filled in.

use serde::{Deserialize, Serialize};

use crate::logging::{LogConfig, LogLevel};

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub paths: PathSettings,

    #[serde(default)]
    pub correlation: CorrelationSettings,

    #[serde(default)]
    pub pipeline: PipelineSettings,

    #[serde(default)]
    pub decoder: DecoderSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Top-level TOML tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSection {
    Paths,
    Correlation,
    Pipeline,
    Decoder,
    Logging,
}

impl ConfigSection {
    pub const ALL: [ConfigSection; 5] = [
        ConfigSection::Paths,
        ConfigSection::Correlation,
        ConfigSection::Pipeline,
        ConfigSection::Decoder,
        ConfigSection::Logging,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Correlation => "correlation",
            ConfigSection::Pipeline => "pipeline",
            ConfigSection::Decoder => "decoder",
            ConfigSection::Logging => "logging",
        }
    }

    /// Comment written above the table in generated files.
    pub fn description(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "Data, output and working locations",
            ConfigSection::Correlation => "Color/depth frame pairing",
            ConfigSection::Pipeline => "Staging and processing stages",
            ConfigSection::Decoder => "External capture export tool",
            ConfigSection::Logging => "Run and per-job logging",
        }
    }
}

/// Locations used by a run. Empty strings mean "not configured".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSettings {
    /// Root of the capture tree to scan.
    #[serde(default)]
    pub input_root: String,

    /// Root receiving per-job output folders.
    #[serde(default)]
    pub output_root: String,

    /// Checkpoint file recording job outcomes.
    #[serde(default)]
    pub checkpoint: String,

    /// Fast local storage for staged copies.
    #[serde(default)]
    pub cache_dir: String,

    /// Folder for run and per-job logs.
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,
}

fn default_logs_folder() -> String {
    ".logs".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            input_root: String::new(),
            output_root: String::new(),
            checkpoint: String::new(),
            cache_dir: String::new(),
            logs_folder: default_logs_folder(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationSettings {
    /// Maximum |color - depth| timestamp difference in seconds (inclusive).
    #[serde(default = "default_max_skew")]
    pub max_skew: f64,

    /// Optional file of `HH:MM:SS.sss-HH:MM:SS.sss` ranges to keep.
    #[serde(default)]
    pub time_ranges_file: Option<String>,

    /// Decoder metadata entries copied into each frame's metadata file.
    #[serde(default = "default_metadata_entries")]
    pub metadata_entries: usize,
}

fn default_max_skew() -> f64 {
    0.1
}

fn default_metadata_entries() -> usize {
    5
}

impl Default for CorrelationSettings {
    fn default() -> Self {
        Self {
            max_skew: default_max_skew(),
            time_ranges_file: None,
            metadata_entries: default_metadata_entries(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Staged jobs waiting for processing before staging blocks.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Number of processing threads.
    #[serde(default = "default_processing_workers")]
    pub processing_workers: usize,

    /// Extension of capture files (case-insensitive, without the dot).
    #[serde(default = "default_capture_extension")]
    pub capture_extension: String,

    /// Skip frames that fail to decode instead of failing the job.
    #[serde(default)]
    pub ignore_frame_errors: bool,
}

fn default_queue_capacity() -> usize {
    4
}

fn default_processing_workers() -> usize {
    1
}

fn default_capture_extension() -> String {
    "bag".to_string()
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            processing_workers: default_processing_workers(),
            capture_extension: default_capture_extension(),
            ignore_frame_errors: false,
        }
    }
}

/// Export tool that splits a capture into per-frame files.
///
/// `{input}` and `{output}` in `args` are replaced with the staged capture
/// and the scratch directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecoderSettings {
    #[serde(default)]
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,
}

impl DecoderSettings {
    pub fn is_configured(&self) -> bool {
        !self.program.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default)]
    pub level: LogLevel,

    /// Only log progress at `progress_step` intervals.
    #[serde(default = "default_true")]
    pub compact: bool,

    #[serde(default = "default_progress_step")]
    pub progress_step: u32,

    /// Warnings kept for the failure summary of a job log.
    #[serde(default = "default_error_tail")]
    pub error_tail: u32,
}

fn default_true() -> bool {
    true
}

fn default_progress_step() -> u32 {
    20
}

fn default_error_tail() -> u32 {
    20
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            compact: true,
            progress_step: default_progress_step(),
            error_tail: default_error_tail(),
        }
    }
}

impl LoggingSettings {
    /// Per-job logger configuration.
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            compact: self.compact,
            progress_step: self.progress_step.max(1),
            error_tail: self.error_tail as usize,
            show_timestamps: true,
        }
    }
}

impl Settings {
    /// Check value ranges. Paths are checked where they are used.
    pub fn validate(&self) -> Result<(), String> {
        let skew = self.correlation.max_skew;
        if !skew.is_finite() || skew <= 0.0 {
            return Err(format!(
                "correlation.max_skew must be a positive number, got {}",
                skew
            ));
        }
        if self.pipeline.queue_capacity == 0 {
            return Err("pipeline.queue_capacity must be at least 1".to_string());
        }
        if self.pipeline.processing_workers == 0 {
            return Err("pipeline.processing_workers must be at least 1".to_string());
        }
        let ext = self.pipeline.capture_extension.trim();
        if ext.is_empty() || ext.starts_with('.') {
            return Err(format!(
                "pipeline.capture_extension must be a bare extension like \"bag\", got {:?}",
                self.pipeline.capture_extension
            ));
        }
        if self.logging.progress_step == 0 || self.logging.progress_step > 100 {
            return Err(format!(
                "logging.progress_step must be between 1 and 100, got {}",
                self.logging.progress_step
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.correlation.max_skew, 0.1);
        assert_eq!(settings.pipeline.queue_capacity, 4);
        assert_eq!(settings.pipeline.capture_extension, "bag");
        assert!(!settings.decoder.is_configured());
    }

    #[test]
    fn empty_document_uses_defaults() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn partial_section_fills_missing_fields() {
        let settings: Settings = toml::from_str("[correlation]\nmax_skew = 0.05\n").unwrap();
        assert_eq!(settings.correlation.max_skew, 0.05);
        assert_eq!(settings.correlation.metadata_entries, 5);
    }

    #[test]
    fn rejects_non_positive_skew() {
        let mut settings = Settings::default();
        settings.correlation.max_skew = 0.0;
        assert!(settings.validate().is_err());
        settings.correlation.max_skew = f64::NAN;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_dotted_extension() {
        let mut settings = Settings::default();
        settings.pipeline.capture_extension = ".bag".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn level_parses_lowercase() {
        let settings: Settings = toml::from_str("[logging]\nlevel = \"debug\"\n").unwrap();
        assert_eq!(settings.logging.level, LogLevel::Debug);
    }
}
