//! Correlator output.

use super::frame::Frame;

/// A color frame and a depth frame judged to show the same instant.
#[derive(Debug, Clone)]
pub struct FramePair {
    /// Ordinal assigned by the correlator, dense from zero.
    pub index: usize,
    pub color: Frame,
    pub depth: Frame,
}

impl FramePair {
    /// Absolute timestamp difference between the two frames.
    pub fn skew(&self) -> f64 {
        (self.color.timestamp - self.depth.timestamp).abs()
    }

    /// Output folder name for this pair (`frame_000042`).
    pub fn folder_name(&self) -> String {
        format!("frame_{:06}", self.index)
    }
}
