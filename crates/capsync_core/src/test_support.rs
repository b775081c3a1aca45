//! Scripted capture decoder for pipeline tests.
//!
//! A "capture" is a text file with one step per line:
//!
//! ```text
//! color 0.000
//! depth 0.020
//! error          # a frame that fails to decode
//! fail           # anywhere in the file: opening fails
//! panic          # the decoder panics when it reaches this step
//! ```

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use image::RgbImage;

use crate::capture::{CaptureDecoder, CaptureError, CaptureResult, CaptureSession};
use crate::models::{DepthImage, Frame, FrameImage, StreamKind};

enum Step {
    Frame(StreamKind, f64),
    Error,
    Panic,
}

pub(crate) struct ScriptedDecoder;

impl CaptureDecoder for ScriptedDecoder {
    fn open(&self, path: &Path) -> CaptureResult<Box<dyn CaptureSession>> {
        let content =
            fs::read_to_string(path).map_err(|e| CaptureError::io("reading script", e))?;

        let mut steps = VecDeque::new();
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let mut parts = line.split_whitespace();
            let step = match (parts.next(), parts.next()) {
                (Some("fail"), _) => return Err(CaptureError::open(path, "scripted open failure")),
                (Some("error"), _) => Step::Error,
                (Some("panic"), _) => Step::Panic,
                (Some("color"), Some(t)) => Step::Frame(StreamKind::Color, t.parse().unwrap()),
                (Some("depth"), Some(t)) => Step::Frame(StreamKind::Depth, t.parse().unwrap()),
                _ => panic!("bad script line: {line}"),
            };
            steps.push_back(step);
        }

        let duration = steps
            .iter()
            .filter_map(|s| match s {
                Step::Frame(_, t) => Some(*t),
                _ => None,
            })
            .fold(0.0, f64::max);

        Ok(Box::new(ScriptedSession {
            steps,
            duration,
            position: 0.0,
            sequence: 0,
        }))
    }
}

struct ScriptedSession {
    steps: VecDeque<Step>,
    duration: f64,
    position: f64,
    sequence: u64,
}

impl CaptureSession for ScriptedSession {
    fn duration(&self) -> f64 {
        self.duration
    }

    fn position(&self) -> f64 {
        self.position
    }

    fn next_frame(&mut self) -> CaptureResult<Option<(StreamKind, Frame)>> {
        match self.steps.pop_front() {
            None => Ok(None),
            Some(Step::Error) => Err(CaptureError::Frame("scripted frame error".into())),
            Some(Step::Panic) => panic!("scripted decoder panic"),
            Some(Step::Frame(kind, t)) => {
                self.position = t;
                self.sequence += 1;
                let image = match kind {
                    StreamKind::Color => FrameImage::Color(RgbImage::new(2, 2)),
                    StreamKind::Depth => {
                        FrameImage::Depth(DepthImage::new(2, 2, vec![1.5; 4]).unwrap())
                    }
                };
                Ok(Some((kind, Frame::new(t, self.sequence, image))))
            }
        }
    }
}

/// Write a scripted capture file, creating parent directories.
pub(crate) fn write_capture(path: &Path, lines: &[&str]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, lines.join("\n")).unwrap();
}
