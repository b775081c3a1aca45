//! Data models for capsync.
//!
//! This module contains the frame-level data structures shared by the
//! decoder, the correlator and the output writers:
//! - `StreamKind`, `Frame`, `FrameImage`, `FrameMetadata`
//! - `FrameTimeline`: sorted frames of one stream
//! - `FramePair`: correlator output

mod frame;
mod pair;
mod timeline;

pub use frame::{DepthImage, Frame, FrameImage, FrameMetadata, StreamKind};
pub use pair::FramePair;
pub use timeline::FrameTimeline;
