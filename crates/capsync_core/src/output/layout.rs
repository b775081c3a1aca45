//! Per-job output layout.
//!
//! ```text
//! <output_dir>/
//!     frame_000000/
//!         <stem>_Color_t<ts>.png
//!         <stem>_Color_Metadata_t<ts>.txt
//!         <stem>_Depth_t<ts>.tiff
//!         <stem>_Depth_Metadata_t<ts>.txt
//!     frame_000001/
//!     ...
//! <label_dir>/
//!     frame_000000_<stem>_Color_t<ts>.png   (one per pair)
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::models::{Frame, FrameMetadata, FramePair, StreamKind};

use super::writers::{ImageWriter, MetadataWriter};
use super::{OutputError, OutputResult};

/// Image file name for a frame: `<stem>_<Stream>_t<seconds>.<ext>`.
pub fn frame_file_name(stem: &str, kind: StreamKind, timestamp: f64, ext: &str) -> String {
    format!("{}_{}_t{:.9}.{}", stem, kind.as_str(), timestamp, ext)
}

/// Metadata file name for a frame: `<stem>_<Stream>_Metadata_t<seconds>.txt`.
pub fn metadata_file_name(stem: &str, kind: StreamKind, timestamp: f64) -> String {
    format!("{}_{}_Metadata_t{:.9}.txt", stem, kind.as_str(), timestamp)
}

/// Metadata keys generated for every frame; decoder entries with these names
/// are dropped.
pub(crate) const RESERVED_KEYS: [&str; 3] = ["Stream", "frame_number", "frame_timestamp"];

/// Writes the correlated pairs of one job.
pub struct PairWriter<'a> {
    images: &'a dyn ImageWriter,
    metadata: &'a dyn MetadataWriter,
    output_dir: &'a Path,
    label_dir: &'a Path,
    stem: &'a str,
    /// Maximum decoder-provided metadata entries copied per frame.
    metadata_entries: usize,
}

impl<'a> PairWriter<'a> {
    pub fn new(
        images: &'a dyn ImageWriter,
        metadata: &'a dyn MetadataWriter,
        output_dir: &'a Path,
        label_dir: &'a Path,
        stem: &'a str,
    ) -> Self {
        Self {
            images,
            metadata,
            output_dir,
            label_dir,
            stem,
            metadata_entries: usize::MAX,
        }
    }

    pub fn with_metadata_entries(mut self, limit: usize) -> Self {
        self.metadata_entries = limit;
        self
    }

    /// Reset the output and label directories.
    ///
    /// Outputs left by an earlier, unrecorded attempt are removed so a rerun
    /// produces exactly one consistent set of pairs.
    pub fn prepare(&self) -> OutputResult<()> {
        for dir in [self.output_dir, self.label_dir] {
            if dir.exists() {
                tracing::debug!("Clearing previous outputs in {}", dir.display());
                fs::remove_dir_all(dir).map_err(|e| OutputError::io(dir, e))?;
            }
            fs::create_dir_all(dir).map_err(|e| OutputError::io(dir, e))?;
        }
        Ok(())
    }

    /// Write one pair into its `frame_NNNNNN` folder and copy the color image
    /// into the label directory. Label copies carry the folder name as a
    /// prefix since color timestamps may repeat.
    ///
    /// Returns the pair folder.
    pub fn write_pair(&self, pair: &FramePair) -> OutputResult<PathBuf> {
        let folder = self.output_dir.join(pair.folder_name());
        fs::create_dir_all(&folder).map_err(|e| OutputError::io(&folder, e))?;

        self.write_frame(&folder, StreamKind::Depth, &pair.depth)?;
        let color_path = self.write_frame(&folder, StreamKind::Color, &pair.color)?;

        if let Some(name) = color_path.file_name() {
            let label_name = format!("{}_{}", pair.folder_name(), name.to_string_lossy());
            let label_path = self.label_dir.join(label_name);
            fs::copy(&color_path, &label_path).map_err(|e| OutputError::io(&label_path, e))?;
        }

        Ok(folder)
    }

    /// Write image + metadata for one frame, returning the image path.
    fn write_frame(&self, folder: &Path, kind: StreamKind, frame: &Frame) -> OutputResult<PathBuf> {
        let ext = frame.image.extension();
        let image_path = folder.join(frame_file_name(self.stem, kind, frame.timestamp, &ext));
        self.images.write(&frame.image, &image_path)?;

        let meta_path = folder.join(metadata_file_name(self.stem, kind, frame.timestamp));
        let meta = self.frame_metadata(kind, frame);
        self.metadata.write(&meta, &meta_path)?;

        Ok(image_path)
    }

    fn frame_metadata(&self, kind: StreamKind, frame: &Frame) -> FrameMetadata {
        let mut meta = FrameMetadata::new()
            .with("Stream", kind.as_str())
            .with("frame_number", frame.sequence_number)
            .with("frame_timestamp", format!("{:.9}", frame.timestamp));
        let provided = frame
            .metadata
            .iter()
            .filter(|(key, _)| !RESERVED_KEYS.contains(key));
        for (key, value) in provided.take(self.metadata_entries) {
            meta.insert(key, value);
        }
        meta
    }
}
