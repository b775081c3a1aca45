//! Temporal correlation of color and depth streams.
//!
//! Pure functions, no I/O. The correlator pairs frames from two sorted
//! timelines with a two-pointer sweep:
//!
//! ```text
//! color  c0 ---- c1 -------- c2
//!         \                  |
//! depth    d0 ------- d1 --- d2 ---- d3
//! ```
//!
//! Pairs never cross, each frame is used at most once, and the first
//! depth frame reached within tolerance wins. Frames left after either
//! stream runs out are dropped.

mod time_range;

use thiserror::Error;

use crate::models::{FramePair, FrameTimeline, StreamKind};

pub use time_range::{parse_time_ranges, read_time_ranges, TimeRange, TimeRangeError};

/// Errors raised when correlation preconditions are violated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CorrelateError {
    /// Timestamps are not ascending (or are NaN).
    #[error("{stream} timeline is not sorted: frame {index} has timestamp {timestamp}")]
    Unsorted {
        stream: StreamKind,
        index: usize,
        timestamp: f64,
    },

    /// A timeline of the wrong stream kind was supplied.
    #[error("Expected a {expected} timeline, got {actual}")]
    StreamMismatch {
        expected: StreamKind,
        actual: StreamKind,
    },

    /// The skew tolerance must be positive and finite.
    #[error("Invalid maximum skew: {0}")]
    InvalidSkew(f64),
}

/// Result type for correlation operations.
pub type CorrelateResult<T> = Result<T, CorrelateError>;

/// Counters describing one correlation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelationStats {
    pub color_frames: usize,
    pub depth_frames: usize,
    pub pairs: usize,
    /// Depth frames the sweep moved past, matched or not.
    pub depth_consumed: usize,
}

impl CorrelationStats {
    /// Fraction of the depth stream the sweep covered (0-100).
    pub fn depth_progress_pct(&self) -> u32 {
        if self.depth_frames == 0 {
            return 100;
        }
        ((self.depth_consumed as f64 / self.depth_frames as f64) * 100.0) as u32
    }
}

/// Output of `correlate`.
#[derive(Debug, Clone)]
pub struct Correlation {
    pub pairs: Vec<FramePair>,
    pub stats: CorrelationStats,
}

/// Match two sorted timestamp sequences.
///
/// Returns `(color_index, depth_index)` pairs in sweep order. Both index
/// sequences are strictly increasing. Unsorted or NaN input is rejected
/// rather than mis-paired.
pub fn sweep(color: &[f64], depth: &[f64], max_skew: f64) -> CorrelateResult<Vec<(usize, usize)>> {
    check_skew(max_skew)?;
    for (stream, ts) in [(StreamKind::Color, color), (StreamKind::Depth, depth)] {
        if let Some(index) = first_unsorted(ts.iter().copied()) {
            return Err(CorrelateError::Unsorted {
                stream,
                index,
                timestamp: ts[index],
            });
        }
    }
    Ok(sweep_sorted(color, depth, max_skew, |_| {}))
}

/// Index of the first timestamp that is NaN or smaller than its predecessor.
pub(crate) fn first_unsorted<I>(timestamps: I) -> Option<usize>
where
    I: IntoIterator<Item = f64>,
{
    let mut previous: Option<f64> = None;
    for (index, t) in timestamps.into_iter().enumerate() {
        if t.is_nan() || previous.is_some_and(|p| t < p) {
            return Some(index);
        }
        previous = Some(t);
    }
    None
}

fn check_skew(max_skew: f64) -> CorrelateResult<()> {
    if !max_skew.is_finite() || max_skew <= 0.0 {
        return Err(CorrelateError::InvalidSkew(max_skew));
    }
    Ok(())
}

/// The sweep itself. Inputs must already be sorted; reports the number of
/// depth frames consumed after each step that advances the depth cursor.
fn sweep_sorted<F>(
    color: &[f64],
    depth: &[f64],
    max_skew: f64,
    mut on_depth_consumed: F,
) -> Vec<(usize, usize)>
where
    F: FnMut(usize),
{
    let mut matches = Vec::with_capacity(color.len().min(depth.len()));
    let mut ci = 0;
    let mut di = 0;

    while ci < color.len() && di < depth.len() {
        let delta = color[ci] - depth[di];
        if delta < -max_skew {
            ci += 1;
        } else if delta > max_skew {
            di += 1;
            on_depth_consumed(di);
        } else {
            matches.push((ci, di));
            ci += 1;
            di += 1;
            on_depth_consumed(di);
        }
    }

    matches
}

/// Correlate a color timeline with a depth timeline.
///
/// Consumes both timelines; matched frames move into the returned pairs and
/// everything else is dropped. Pair indices are assigned densely from zero.
pub fn correlate(
    color: FrameTimeline,
    depth: FrameTimeline,
    max_skew: f64,
) -> CorrelateResult<Correlation> {
    check_skew(max_skew)?;
    expect_kind(&color, StreamKind::Color)?;
    expect_kind(&depth, StreamKind::Depth)?;

    let mut stats = CorrelationStats {
        color_frames: color.len(),
        depth_frames: depth.len(),
        ..Default::default()
    };

    let matches = sweep_sorted(
        &color.timestamps(),
        &depth.timestamps(),
        max_skew,
        |consumed| stats.depth_consumed = consumed,
    );

    let mut color_frames = color.into_frames().into_iter().enumerate();
    let mut depth_frames = depth.into_frames().into_iter().enumerate();
    let mut pairs = Vec::with_capacity(matches.len());

    for (index, &(ci, di)) in matches.iter().enumerate() {
        // Match indices are strictly increasing, so `find` only moves forward.
        let color_frame = color_frames.find(|(i, _)| *i == ci).map(|(_, f)| f);
        let depth_frame = depth_frames.find(|(i, _)| *i == di).map(|(_, f)| f);
        if let (Some(color), Some(depth)) = (color_frame, depth_frame) {
            pairs.push(FramePair {
                index,
                color,
                depth,
            });
        }
    }

    stats.pairs = pairs.len();
    Ok(Correlation { pairs, stats })
}

fn expect_kind(timeline: &FrameTimeline, expected: StreamKind) -> CorrelateResult<()> {
    if timeline.kind() != expected {
        return Err(CorrelateError::StreamMismatch {
            expected,
            actual: timeline.kind(),
        });
    }
    Ok(())
}
