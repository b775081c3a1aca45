//! Config manager for loading, saving, and atomic updates.
//!
//! - Atomic writes (write to temp file, then rename)
//! - Section-level updates that keep the rest of the file untouched
//! - Unknown sections and missing defaults are cleaned up on load

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use thiserror::Error;
use toml_edit::{DocumentMut, Item};

use super::settings::{ConfigSection, Settings};

/// Errors that can occur during config operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Failed to parse config for editing: {0}")]
    EditParseError(#[from] toml_edit::TomlError),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Per-user default config location (`<config dir>/capsync/config.toml`).
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "capsync").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Manages the settings file.
pub struct ConfigManager {
    config_path: PathBuf,
    settings: Settings,
}

impl ConfigManager {
    /// Create a manager for `config_path`.
    ///
    /// Does not load the config - call `load()` or `load_or_create()` after.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            settings: Settings::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Changes are only in memory until `save()` or `update_section()`.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn into_settings(self) -> Settings {
        self.settings
    }

    /// Load and validate the config file. Missing file is an error.
    pub fn load(&mut self) -> ConfigResult<()> {
        if !self.config_path.exists() {
            return Err(ConfigError::NotFound(self.config_path.clone()));
        }

        let content = fs::read_to_string(&self.config_path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.validate().map_err(ConfigError::Invalid)?;
        self.settings = settings;
        Ok(())
    }

    /// Load the config, creating it with defaults if it doesn't exist.
    ///
    /// A file with unknown sections or missing fields is rewritten in
    /// canonical form.
    pub fn load_or_create(&mut self) -> ConfigResult<()> {
        if self.config_path.exists() {
            let content = fs::read_to_string(&self.config_path)?;
            let (settings, was_modified) = parse_and_clean(&content)?;
            settings.validate().map_err(ConfigError::Invalid)?;
            self.settings = settings;

            if was_modified {
                tracing::info!("Normalizing config file {}", self.config_path.display());
                self.save()?;
            }
        } else {
            tracing::info!("Creating default config at {}", self.config_path.display());
            self.settings = Settings::default();
            self.save()?;
        }
        Ok(())
    }

    /// Save the entire config atomically.
    pub fn save(&self) -> ConfigResult<()> {
        let content = self.generate_config_with_comments()?;
        self.atomic_write(&content)?;
        Ok(())
    }

    /// Rewrite one section from disk state, leaving the others as they are.
    pub fn update_section(&mut self, section: ConfigSection) -> ConfigResult<()> {
        let current_content = if self.config_path.exists() {
            fs::read_to_string(&self.config_path)?
        } else {
            String::new()
        };

        let mut doc: DocumentMut = if current_content.trim().is_empty() {
            DocumentMut::new()
        } else {
            current_content.parse()?
        };

        let section_doc: DocumentMut = self.section_toml(section)?.parse()?;
        doc[section.table_name()] = Item::Table(section_doc.as_table().clone());

        self.atomic_write(&doc.to_string())?;
        Ok(())
    }

    fn section_toml(&self, section: ConfigSection) -> ConfigResult<String> {
        let content = match section {
            ConfigSection::Paths => toml::to_string_pretty(&self.settings.paths)?,
            ConfigSection::Correlation => toml::to_string_pretty(&self.settings.correlation)?,
            ConfigSection::Pipeline => toml::to_string_pretty(&self.settings.pipeline)?,
            ConfigSection::Decoder => toml::to_string_pretty(&self.settings.decoder)?,
            ConfigSection::Logging => toml::to_string_pretty(&self.settings.logging)?,
        };
        Ok(content)
    }

    fn generate_config_with_comments(&self) -> ConfigResult<String> {
        let mut output = String::new();
        output.push_str("# capsync configuration\n");
        output.push_str("# Command line flags override these values.\n\n");

        for section in ConfigSection::ALL {
            output.push_str(&format!("# {}\n", section.description()));
            output.push_str(&format!("[{}]\n", section.table_name()));
            for line in self.section_toml(section)?.lines() {
                output.push_str(line);
                output.push('\n');
            }
            output.push('\n');
        }

        Ok(output)
    }

    fn atomic_write(&self, content: &str) -> io::Result<()> {
        if let Some(parent) = self.config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.config_path.with_extension("toml.tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.config_path)
    }
}

/// Parse settings and report whether the file differs from its canonical
/// form (unknown sections or missing fields).
fn parse_and_clean(content: &str) -> ConfigResult<(Settings, bool)> {
    let doc: DocumentMut = content.parse()?;
    let settings: Settings = toml::from_str(content)?;

    let known: Vec<&str> = ConfigSection::ALL.iter().map(|s| s.table_name()).collect();
    let has_unknown = doc.iter().any(|(key, _)| !known.contains(&key));

    let missing_defaults = ConfigSection::ALL.iter().any(|section| {
        let expected = match section {
            ConfigSection::Paths => field_count(&settings.paths),
            ConfigSection::Correlation => field_count(&settings.correlation),
            ConfigSection::Pipeline => field_count(&settings.pipeline),
            ConfigSection::Decoder => field_count(&settings.decoder),
            ConfigSection::Logging => field_count(&settings.logging),
        };
        let present = doc
            .get(section.table_name())
            .and_then(Item::as_table_like)
            .map(|t| t.len())
            .unwrap_or(0);
        present < expected
    });

    Ok((settings, has_unknown || missing_defaults))
}

/// Number of keys a section serializes to.
fn field_count<T: serde::Serialize>(section: &T) -> usize {
    toml::to_string(section)
        .ok()
        .and_then(|s| s.parse::<DocumentMut>().ok())
        .map(|d| d.len())
        .unwrap_or(0)
}
