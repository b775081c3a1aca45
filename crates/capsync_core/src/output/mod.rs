//! Writing paired frames to disk.
//!
//! This module provides:
//! - `ImageWriter` / `MetadataWriter`: swappable output capabilities
//! - `RasterWriter`: PNG color, 32-bit float TIFF depth, copies stored images
//! - `TextMetadataWriter`: `key: value` text files
//! - `PairWriter`: the per-job folder layout (`frame_000000/...` + label copies)

mod layout;
mod writers;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub(crate) use layout::RESERVED_KEYS;
pub use layout::{frame_file_name, metadata_file_name, PairWriter};
pub use writers::{ImageWriter, MetadataWriter, RasterWriter, TextMetadataWriter};

/// Errors from writing job outputs.
#[derive(Error, Debug)]
pub enum OutputError {
    /// File I/O error.
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Image encoding failed.
    #[error("Failed to encode {path}: {message}")]
    Encode { path: PathBuf, message: String },
}

impl OutputError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn encode(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Encode {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

/// Result type for output operations.
pub type OutputResult<T> = Result<T, OutputError>;
