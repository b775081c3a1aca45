//! Capture decoding capabilities.
//!
//! capsync does not decode any capture container itself. Decoders, sessions
//! and spatial aligners are supplied through the traits in this module:
//!
//! - `CaptureDecoder`: opens a staged capture file
//! - `CaptureSession`: yields frames until end of stream
//! - `SpatialAligner`: reprojects depth frames into the color pixel grid
//!
//! `extract_streams` drives a session and collects the color and depth
//! frames the correlator needs. `FrameDumpDecoder` and `ExternalDecoder`
//! read captures that an external tool has already split into per-frame
//! image files.

mod dump;
mod extract;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::models::{Frame, StreamKind};

pub use dump::{ExternalDecoder, FrameDumpDecoder, FrameDumpSession};
pub use extract::{extract_streams, DecodedStreams, ExtractOptions};

/// Errors reported by decoders and aligners.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// The capture could not be opened.
    #[error("Failed to open capture {path}: {message}")]
    Open { path: PathBuf, message: String },

    /// A single frame could not be decoded.
    #[error("Failed to decode frame: {0}")]
    Frame(String),

    /// Spatial alignment of a depth frame failed.
    #[error("Failed to align depth frame {sequence}: {message}")]
    Align { sequence: u64, message: String },

    /// An external decoding tool failed.
    #[error("{tool} failed with exit code {exit_code}: {message}")]
    CommandFailed {
        tool: String,
        exit_code: i32,
        message: String,
    },

    /// File I/O error.
    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },

    /// Too many consecutive frame errors while skipping is enabled.
    #[error("Gave up after {0} consecutive frame errors")]
    TooManyErrors(usize),
}

impl CaptureError {
    pub fn open(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Open {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }
}

/// Result type for capture operations.
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Opens capture files.
pub trait CaptureDecoder: Send + Sync {
    /// Open a capture for non-realtime playback.
    fn open(&self, path: &Path) -> CaptureResult<Box<dyn CaptureSession>>;
}

/// An open capture being played back as fast as possible.
///
/// Frames may reference resources owned by the session (for example files
/// in a scratch directory), so the session must outlive any use of them.
pub trait CaptureSession {
    /// Total playback duration in seconds.
    fn duration(&self) -> f64;

    /// Current playback position in seconds.
    ///
    /// Monotonic during a single pass; a decrease means playback looped.
    fn position(&self) -> f64;

    /// Block until the next frame is available.
    ///
    /// Returns `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> CaptureResult<Option<(StreamKind, Frame)>>;
}

/// Reprojects depth frames into the color frame's pixel grid.
pub trait SpatialAligner: Send + Sync {
    fn align(&self, depth: Frame, color: &Frame) -> CaptureResult<Frame>;
}

/// Aligner for captures whose depth is already registered to color.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityAligner;

impl SpatialAligner for IdentityAligner {
    fn align(&self, depth: Frame, _color: &Frame) -> CaptureResult<Frame> {
        Ok(depth)
    }
}
