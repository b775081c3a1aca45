//! Configuration management for capsync.
//!
//! This module provides:
//! - TOML-based configuration with logical sections
//! - Atomic file writes (write to temp, then rename)
//! - Section-level updates (only the changed section is rewritten)
//! - Validation on load with automatic defaults
//!
//! # Example
//!
//! ```no_run
//! use capsync_core::config::ConfigManager;
//!
//! let mut config = ConfigManager::new("capsync.toml");
//! config.load_or_create().unwrap();
//! println!("Max skew: {}s", config.settings().correlation.max_skew);
//! ```

mod manager;
mod settings;

pub use manager::{default_config_path, ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    ConfigSection, CorrelationSettings, DecoderSettings, LoggingSettings, PathSettings,
    PipelineSettings, Settings,
};
