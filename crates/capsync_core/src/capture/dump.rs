//! Decoders for captures exported as per-frame image files.
//!
//! A frame dump is a directory of files named
//! `<prefix>_Color_t<seconds>.<ext>` and `<prefix>_Depth_t<seconds>.<ext>`,
//! each optionally accompanied by a `<prefix>_<Stream>_Metadata_t<seconds>.txt`
//! file of `key: value` lines.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::models::{Frame, FrameImage, FrameMetadata, StreamKind};
use crate::output::RESERVED_KEYS;

use super::{CaptureDecoder, CaptureError, CaptureResult, CaptureSession};

/// Reads a directory of dumped frames as a capture.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameDumpDecoder;

impl FrameDumpDecoder {
    /// Open a dump directory.
    pub fn open_dir(&self, dir: &Path) -> CaptureResult<FrameDumpSession> {
        if !dir.is_dir() {
            return Err(CaptureError::open(dir, "not a frame dump directory"));
        }

        let entries = fs::read_dir(dir)
            .map_err(|e| CaptureError::io(format!("reading {}", dir.display()), e))?;

        let mut found: Vec<(StreamKind, f64, String, PathBuf)> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CaptureError::io("reading dump entry", e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some((kind, timestamp, raw)) = parse_frame_name(&path) {
                found.push((kind, timestamp, raw, path));
            }
        }

        // Interleave streams by time; color first on ties so depth can align.
        found.sort_by(|a, b| {
            a.1.total_cmp(&b.1)
                .then_with(|| stream_order(a.0).cmp(&stream_order(b.0)))
        });

        let mut color_seq = 0u64;
        let mut depth_seq = 0u64;
        let mut frames = VecDeque::with_capacity(found.len());

        for (kind, timestamp, raw, path) in found {
            let counter = match kind {
                StreamKind::Color => &mut color_seq,
                StreamKind::Depth => &mut depth_seq,
            };
            let (sequence, metadata) = read_metadata(&path, kind, &raw, *counter)?;
            *counter += 1;

            let frame = Frame::new(timestamp, sequence, FrameImage::Stored(path))
                .with_metadata(metadata);
            frames.push_back((kind, frame));
        }

        let origin = frames.front().map(|(_, f)| f.timestamp).unwrap_or(0.0);
        let end = frames.back().map(|(_, f)| f.timestamp).unwrap_or(0.0);

        tracing::debug!("Opened frame dump {} ({} frames)", dir.display(), frames.len());

        Ok(FrameDumpSession {
            frames,
            origin,
            duration: end - origin,
            position: 0.0,
            scratch: None,
        })
    }
}

impl CaptureDecoder for FrameDumpDecoder {
    fn open(&self, path: &Path) -> CaptureResult<Box<dyn CaptureSession>> {
        Ok(Box::new(self.open_dir(path)?))
    }
}

/// Playback over a frame dump.
#[derive(Debug)]
pub struct FrameDumpSession {
    frames: VecDeque<(StreamKind, Frame)>,
    origin: f64,
    duration: f64,
    position: f64,
    /// Directory removed when the session is dropped.
    scratch: Option<PathBuf>,
}

impl FrameDumpSession {
    /// Number of frames not yet played back.
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl CaptureSession for FrameDumpSession {
    fn duration(&self) -> f64 {
        self.duration
    }

    fn position(&self) -> f64 {
        self.position
    }

    fn next_frame(&mut self) -> CaptureResult<Option<(StreamKind, Frame)>> {
        let next = self.frames.pop_front();
        if let Some((_, frame)) = &next {
            self.position = frame.timestamp - self.origin;
        }
        Ok(next)
    }
}

impl Drop for FrameDumpSession {
    fn drop(&mut self) {
        if let Some(dir) = self.scratch.take() {
            if let Err(e) = fs::remove_dir_all(&dir) {
                tracing::warn!("Failed to remove scratch dir {}: {}", dir.display(), e);
            }
        }
    }
}

/// Runs an external export tool, then reads its output as a frame dump.
///
/// `{input}` and `{output}` in the arguments are replaced with the capture
/// path and a scratch directory next to it. The scratch directory lives as
/// long as the returned session.
#[derive(Debug, Clone)]
pub struct ExternalDecoder {
    program: String,
    args: Vec<String>,
}

impl ExternalDecoder {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Scratch directory used for a capture path.
    pub fn scratch_dir(capture: &Path) -> PathBuf {
        let name = capture
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "capture".to_string());
        capture.with_file_name(format!("{}.frames", name))
    }

    fn run(&self, input: &Path, output: &Path) -> CaptureResult<()> {
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| {
                a.replace("{input}", &input.to_string_lossy())
                    .replace("{output}", &output.to_string_lossy())
            })
            .collect();

        tracing::debug!("Running: {} {}", self.program, args.join(" "));

        let result = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| CaptureError::open(input, format!("failed to run {}: {}", self.program, e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(CaptureError::CommandFailed {
                tool: self.program.clone(),
                exit_code: result.status.code().unwrap_or(-1),
                message: stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

impl CaptureDecoder for ExternalDecoder {
    fn open(&self, path: &Path) -> CaptureResult<Box<dyn CaptureSession>> {
        if !path.is_file() {
            return Err(CaptureError::open(path, "capture file not found"));
        }

        let scratch = Self::scratch_dir(path);
        if scratch.exists() {
            fs::remove_dir_all(&scratch)
                .map_err(|e| CaptureError::io("clearing scratch dir", e))?;
        }
        fs::create_dir_all(&scratch).map_err(|e| CaptureError::io("creating scratch dir", e))?;

        let session = self
            .run(path, &scratch)
            .and_then(|_| FrameDumpDecoder.open_dir(&scratch));

        match session {
            Ok(mut session) => {
                session.scratch = Some(scratch);
                Ok(Box::new(session))
            }
            Err(e) => {
                let _ = fs::remove_dir_all(&scratch);
                Err(e)
            }
        }
    }
}

fn stream_order(kind: StreamKind) -> u8 {
    match kind {
        StreamKind::Color => 0,
        StreamKind::Depth => 1,
    }
}

/// Parse `<prefix>_<Stream>_t<seconds>.<ext>`, ignoring metadata files.
///
/// Returns the stream, the timestamp and the timestamp text as written.
fn parse_frame_name(path: &Path) -> Option<(StreamKind, f64, String)> {
    let stem = path.file_stem()?.to_str()?;
    if stem.contains("_Metadata_t") {
        return None;
    }

    for kind in [StreamKind::Color, StreamKind::Depth] {
        let marker = format!("_{}_t", kind.as_str());
        if let Some(idx) = stem.rfind(&marker) {
            let raw = &stem[idx + marker.len()..];
            if let Ok(timestamp) = raw.parse::<f64>() {
                if timestamp.is_finite() {
                    return Some((kind, timestamp, raw.to_string()));
                }
            }
        }
    }
    None
}

/// Read the sibling metadata file of a frame image, if present.
///
/// Returns the frame number (falling back to `fallback_seq`) and the
/// remaining entries.
fn read_metadata(
    image: &Path,
    kind: StreamKind,
    raw_timestamp: &str,
    fallback_seq: u64,
) -> CaptureResult<(u64, FrameMetadata)> {
    let Some(stem) = image.file_stem().and_then(|s| s.to_str()) else {
        return Ok((fallback_seq, FrameMetadata::new()));
    };
    let marker = format!("_{}_t", kind.as_str());
    let Some(idx) = stem.rfind(&marker) else {
        return Ok((fallback_seq, FrameMetadata::new()));
    };

    let meta_name = format!(
        "{}_{}_Metadata_t{}.txt",
        &stem[..idx],
        kind.as_str(),
        raw_timestamp
    );
    let meta_path = image.with_file_name(meta_name);
    if !meta_path.is_file() {
        return Ok((fallback_seq, FrameMetadata::new()));
    }

    let content = fs::read_to_string(&meta_path)
        .map_err(|e| CaptureError::io(format!("reading {}", meta_path.display()), e))?;

    let mut sequence = fallback_seq;
    let mut metadata = FrameMetadata::new();
    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        if key == "frame_number" {
            sequence = value.parse().unwrap_or(fallback_seq);
        }
        if !RESERVED_KEYS.contains(&key) {
            metadata.insert(key, value);
        }
    }

    Ok((sequence, metadata))
}
