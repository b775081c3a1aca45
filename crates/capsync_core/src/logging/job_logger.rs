//! Per-job log files.
//!
//! Each job gets its own logger that:
//! - Writes to `<log_dir>/<reference>.log`
//! - Mirrors every line to `tracing` with the job reference attached
//! - Filters progress updates to step intervals in compact mode
//! - Keeps recent warnings for the failure summary

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;

use super::types::{LogConfig, LogLevel, MessagePrefix};

/// Logger for one job.
pub struct JobLogger {
    reference: String,
    log_path: PathBuf,
    file_writer: Mutex<Option<BufWriter<File>>>,
    config: LogConfig,
    /// Recent warnings and errors.
    tail_buffer: Mutex<VecDeque<String>>,
    /// Last progress value logged (compact mode).
    last_progress: Mutex<Option<u32>>,
}

impl JobLogger {
    /// Create a logger, truncating any log left by an earlier attempt.
    pub fn new(
        reference: impl Into<String>,
        log_dir: impl AsRef<Path>,
        config: LogConfig,
    ) -> std::io::Result<Self> {
        let reference = reference.into();
        let log_dir = log_dir.as_ref();
        fs::create_dir_all(log_dir)?;

        let log_path = log_dir.join(format!("{}.log", sanitize_filename(&reference)));
        let file = File::create(&log_path)?;

        Ok(Self {
            reference,
            log_path,
            file_writer: Mutex::new(Some(BufWriter::new(file))),
            tail_buffer: Mutex::new(VecDeque::with_capacity(config.error_tail)),
            last_progress: Mutex::new(None),
            config,
        })
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Log a message at the specified level.
    pub fn log(&self, level: LogLevel, message: &str) {
        if level < self.config.level {
            return;
        }

        match level {
            LogLevel::Trace => tracing::trace!(job = %self.reference, "{}", message),
            LogLevel::Debug => tracing::debug!(job = %self.reference, "{}", message),
            LogLevel::Info => tracing::info!(job = %self.reference, "{}", message),
            LogLevel::Warn => tracing::warn!(job = %self.reference, "{}", message),
            LogLevel::Error => tracing::error!(job = %self.reference, "{}", message),
        }

        if level >= LogLevel::Warn && self.config.error_tail > 0 {
            let mut buffer = self.tail_buffer.lock();
            if buffer.len() >= self.config.error_tail {
                buffer.pop_front();
            }
            buffer.push_back(message.to_string());
        }

        let formatted = self.format_message(message);
        self.output(&formatted);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, &MessagePrefix::Warning.format(message));
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, &MessagePrefix::Error.format(message));
    }

    pub fn phase(&self, phase_name: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Phase.format(phase_name));
    }

    pub fn success(&self, message: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Success.format(message));
    }

    /// Log a progress update (filtered in compact mode).
    ///
    /// Returns true if the update was logged.
    pub fn progress(&self, percent: u32) -> bool {
        if self.config.compact {
            let mut last = self.last_progress.lock();
            let step = self.config.progress_step.max(1);

            if let Some(previous) = *last {
                let current_step = percent / step;
                let last_step = previous / step;
                if current_step <= last_step && !(percent >= 100 && previous < 100) {
                    return false;
                }
            }
            *last = Some(percent);
        }

        self.log(LogLevel::Info, &format!("Progress: {}%", percent));
        true
    }

    /// Write the retained warnings under a header, oldest first.
    pub fn show_tail(&self, header: &str) {
        let lines = self.get_tail();
        if lines.is_empty() {
            return;
        }
        self.output(&self.format_message(&format!("[{}/tail]", header)));
        for line in &lines {
            self.output(&self.format_message(line));
        }
    }

    pub fn get_tail(&self) -> Vec<String> {
        self.tail_buffer.lock().iter().cloned().collect()
    }

    pub fn flush(&self) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writer.flush();
        }
    }

    /// Flush and close the log file.
    pub fn close(&self) {
        self.flush();
        *self.file_writer.lock() = None;
    }

    fn format_message(&self, message: &str) -> String {
        if self.config.show_timestamps {
            format!("[{}] {}", Local::now().format("%H:%M:%S"), message)
        } else {
            message.to_string()
        }
    }

    fn output(&self, formatted: &str) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writeln!(writer, "{}", formatted);
        }
    }
}

impl Drop for JobLogger {
    fn drop(&mut self) {
        self.close();
    }
}

/// Replace characters that are not safe in file names.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}
