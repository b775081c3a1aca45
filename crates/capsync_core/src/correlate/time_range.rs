//! Time-range windows for restricting which frames are correlated.
//!
//! Ranges are read from a text file with one `HH:MM:SS.sss-HH:MM:SS.sss`
//! range per line, measured from the start of the capture:
//!
//! ```text
//! 00:01:05.250-00:02:10.000
//! 00:15:00.000-00:17:30.500
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors from reading a time-range file.
#[derive(Error, Debug)]
pub enum TimeRangeError {
    #[error("Failed to read time ranges from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Line {line}: expected 'start-end', got '{text}'")]
    MissingParts { line: usize, text: String },

    #[error("Line {line}: invalid timestamp '{text}'")]
    InvalidTimestamp { line: usize, text: String },

    #[error("Line {line}: range end precedes its start")]
    Reversed { line: usize },
}

/// A window `(start, end)` in seconds from the capture origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Whether `offset` lies strictly inside the window.
    pub fn contains(&self, offset: f64) -> bool {
        self.start < offset && offset < self.end
    }
}

/// Read and parse a time-range file.
pub fn read_time_ranges(path: &Path) -> Result<Vec<TimeRange>, TimeRangeError> {
    let content = fs::read_to_string(path).map_err(|source| TimeRangeError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_time_ranges(&content)
}

/// Parse time ranges, one per non-blank line.
pub fn parse_time_ranges(content: &str) -> Result<Vec<TimeRange>, TimeRangeError> {
    let mut ranges = Vec::new();

    for (idx, raw) in content.lines().enumerate() {
        let line = idx + 1;
        let text = raw.trim();
        if text.is_empty() {
            continue;
        }

        let parts: Vec<&str> = text.split('-').collect();
        if parts.len() != 2 {
            return Err(TimeRangeError::MissingParts {
                line,
                text: text.to_string(),
            });
        }

        let start = parse_clock(parts[0]).ok_or_else(|| TimeRangeError::InvalidTimestamp {
            line,
            text: parts[0].to_string(),
        })?;
        let end = parse_clock(parts[1]).ok_or_else(|| TimeRangeError::InvalidTimestamp {
            line,
            text: parts[1].to_string(),
        })?;
        if end < start {
            return Err(TimeRangeError::Reversed { line });
        }

        ranges.push(TimeRange::new(start, end));
    }

    Ok(ranges)
}

/// Parse `HH:MM:SS[.fff]` into seconds.
fn parse_clock(text: &str) -> Option<f64> {
    let mut fields = text.trim().split(':');
    let hours: u32 = fields.next()?.parse().ok()?;
    let minutes: u32 = fields.next()?.parse().ok()?;
    let seconds: f64 = fields.next()?.parse().ok()?;
    if fields.next().is_some() || minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return None;
    }
    Some(hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ranges_and_skips_blank_lines() {
        let ranges = parse_time_ranges("01:23:45.678-02:00:00.000\n\n00:00:01.5-00:00:03\n").unwrap();
        assert_eq!(ranges.len(), 2);
        assert!((ranges[0].start - 5025.678).abs() < 1e-9);
        assert_eq!(ranges[0].end, 7200.0);
        assert_eq!(ranges[1], TimeRange::new(1.5, 3.0));
    }

    #[test]
    fn contains_is_exclusive() {
        let range = TimeRange::new(1.0, 2.0);
        assert!(range.contains(1.5));
        assert!(!range.contains(1.0));
        assert!(!range.contains(2.0));
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(matches!(
            parse_time_ranges("00:00:01.000"),
            Err(TimeRangeError::MissingParts { line: 1, .. })
        ));
        assert!(matches!(
            parse_time_ranges("00:00:01-00:00:02\n23:45:67.890-34:56:78.901"),
            Err(TimeRangeError::InvalidTimestamp { line: 2, .. })
        ));
        assert!(matches!(
            parse_time_ranges("00:00:05-00:00:02"),
            Err(TimeRangeError::Reversed { line: 1 })
        ));
    }

    #[test]
    fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ranges.txt");
        fs::write(&path, "00:00:10.000-00:00:20.000\n").unwrap();

        let ranges = read_time_ranges(&path).unwrap();
        assert_eq!(ranges, vec![TimeRange::new(10.0, 20.0)]);
        assert!(read_time_ranges(&dir.path().join("missing.txt")).is_err());
    }
}
