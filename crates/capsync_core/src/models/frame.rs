//! Frame types produced by capture decoders.

use std::fmt;
use std::path::PathBuf;

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// The two streams of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    Color,
    Depth,
}

impl StreamKind {
    /// Name used in output filenames and metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Color => "Color",
            Self::Depth => "Depth",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single-channel depth raster in meters.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthImage {
    pub width: u32,
    pub height: u32,
    /// Row-major depth values in meters.
    pub meters: Vec<f32>,
}

impl DepthImage {
    /// Create a depth image from values already in meters.
    ///
    /// Returns `None` if the buffer does not match `width * height`.
    pub fn new(width: u32, height: u32, meters: Vec<f32>) -> Option<Self> {
        if meters.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            meters,
        })
    }

    /// Convert raw sensor counts into meters using the device depth scale.
    pub fn from_counts(width: u32, height: u32, counts: &[u16], depth_scale: f32) -> Option<Self> {
        let meters = counts.iter().map(|&c| c as f32 * depth_scale).collect();
        Self::new(width, height, meters)
    }
}

/// Image data carried by a frame.
#[derive(Debug, Clone)]
pub enum FrameImage {
    /// 8-bit RGB raster.
    Color(RgbImage),
    /// Floating point depth raster (meters).
    Depth(DepthImage),
    /// Image already encoded on disk by the decoder.
    Stored(PathBuf),
}

impl FrameImage {
    /// File extension the image is written with.
    pub fn extension(&self) -> String {
        match self {
            Self::Color(_) => "png".to_string(),
            Self::Depth(_) => "tiff".to_string(),
            Self::Stored(path) => path
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_else(|| "bin".to_string()),
        }
    }
}

/// Ordered per-frame key/value metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameMetadata {
    entries: Vec<(String, String)>,
}

impl FrameMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, replacing the value if the key already exists.
    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        let key = key.into();
        let value = value.to_string();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Builder variant of `insert`.
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One decoded sample from a stream.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Capture timestamp in seconds.
    pub timestamp: f64,
    /// Stream-local frame number.
    pub sequence_number: u64,
    pub image: FrameImage,
    /// Decoder-provided metadata.
    pub metadata: FrameMetadata,
}

impl Frame {
    pub fn new(timestamp: f64, sequence_number: u64, image: FrameImage) -> Self {
        Self {
            timestamp,
            sequence_number,
            image,
            metadata: FrameMetadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: FrameMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}
