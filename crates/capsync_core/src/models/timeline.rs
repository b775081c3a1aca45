//! Sorted frame sequence for one stream.

use crate::correlate::{first_unsorted, CorrelateError, CorrelateResult, TimeRange};

use super::frame::{Frame, StreamKind};

/// Frames of one stream, sorted ascending by timestamp.
///
/// Equal timestamps are allowed; decreasing or NaN timestamps are rejected
/// at construction so the correlator can rely on the ordering.
#[derive(Debug, Clone)]
pub struct FrameTimeline {
    kind: StreamKind,
    frames: Vec<Frame>,
}

impl FrameTimeline {
    /// Build a timeline, validating the ordering.
    pub fn new(kind: StreamKind, frames: Vec<Frame>) -> CorrelateResult<Self> {
        if let Some(index) = first_unsorted(frames.iter().map(|f| f.timestamp)) {
            return Err(CorrelateError::Unsorted {
                stream: kind,
                index,
                timestamp: frames[index].timestamp,
            });
        }
        Ok(Self { kind, frames })
    }

    /// An empty timeline.
    pub fn empty(kind: StreamKind) -> Self {
        Self {
            kind,
            frames: Vec::new(),
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Timestamp of the first frame, if any.
    pub fn first_timestamp(&self) -> Option<f64> {
        self.frames.first().map(|f| f.timestamp)
    }

    pub fn timestamps(&self) -> Vec<f64> {
        self.frames.iter().map(|f| f.timestamp).collect()
    }

    /// Keep only frames whose offset from `origin` lies in one of `ranges`.
    ///
    /// An empty range list keeps everything.
    pub fn retain_within(&mut self, ranges: &[TimeRange], origin: f64) {
        if ranges.is_empty() {
            return;
        }
        self.frames
            .retain(|f| ranges.iter().any(|r| r.contains(f.timestamp - origin)));
    }

    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FrameImage;
    use std::path::PathBuf;

    fn frames(ts: &[f64]) -> Vec<Frame> {
        ts.iter()
            .enumerate()
            .map(|(i, &t)| Frame::new(t, i as u64, FrameImage::Stored(PathBuf::from("f.png"))))
            .collect()
    }

    #[test]
    fn accepts_sorted_with_ties() {
        let tl = FrameTimeline::new(StreamKind::Color, frames(&[0.0, 0.1, 0.1, 0.2])).unwrap();
        assert_eq!(tl.len(), 4);
        assert_eq!(tl.first_timestamp(), Some(0.0));
    }

    #[test]
    fn rejects_unsorted() {
        let err = FrameTimeline::new(StreamKind::Depth, frames(&[0.0, 0.3, 0.2])).unwrap_err();
        match err {
            CorrelateError::Unsorted { stream, index, .. } => {
                assert_eq!(stream, StreamKind::Depth);
                assert_eq!(index, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_nan() {
        assert!(FrameTimeline::new(StreamKind::Color, frames(&[f64::NAN])).is_err());
        assert!(FrameTimeline::new(StreamKind::Color, frames(&[0.0, f64::NAN])).is_err());
    }

    #[test]
    fn retain_within_uses_origin_offset() {
        let mut tl =
            FrameTimeline::new(StreamKind::Color, frames(&[10.0, 11.0, 12.0, 13.0])).unwrap();
        tl.retain_within(&[TimeRange::new(0.5, 2.5)], 10.0);
        assert_eq!(tl.timestamps(), vec![11.0, 12.0]);
    }
}
