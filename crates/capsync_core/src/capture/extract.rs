//! Pull color and depth frames out of a capture session.

use crate::models::{Frame, StreamKind};

use super::{CaptureError, CaptureResult, CaptureSession, SpatialAligner};

/// Consecutive frame errors tolerated when skipping is enabled.
const MAX_CONSECUTIVE_ERRORS: usize = 100;

/// Options for `extract_streams`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    /// Log and skip frames that fail to decode or align.
    pub ignore_frame_errors: bool,
}

/// Frames read from one session, in playback order.
#[derive(Debug, Default)]
pub struct DecodedStreams {
    pub color: Vec<Frame>,
    pub depth: Vec<Frame>,
    /// Frames skipped because of errors.
    pub skipped: usize,
    /// Depth frames that arrived before any color frame.
    pub unaligned_depth: usize,
}

/// Read every frame of a session.
///
/// Stops at end of stream or when the playback position moves backwards.
/// Each depth frame is aligned against the most recent color frame; depth
/// frames seen before the first color frame cannot be aligned and are
/// dropped. `on_progress` receives playback progress in percent; each value
/// is reported once and the last report is always 100.
pub fn extract_streams<F>(
    session: &mut dyn CaptureSession,
    aligner: &dyn SpatialAligner,
    options: ExtractOptions,
    mut on_progress: F,
) -> CaptureResult<DecodedStreams>
where
    F: FnMut(u32),
{
    let duration = session.duration();
    let mut streams = DecodedStreams::default();
    let mut last_position = session.position();
    let mut consecutive_errors = 0;
    let mut last_reported: Option<u32> = None;
    let mut report = |pct: u32| {
        if last_reported != Some(pct) {
            last_reported = Some(pct);
            on_progress(pct);
        }
    };

    loop {
        let (kind, frame) = match session.next_frame() {
            Ok(Some(next)) => next,
            Ok(None) => break,
            Err(e) => {
                skip_or_fail(e, options, &mut streams, &mut consecutive_errors)?;
                continue;
            }
        };

        let position = session.position();
        if position < last_position {
            tracing::debug!(
                "Playback looped ({:.3}s -> {:.3}s), stopping",
                last_position,
                position
            );
            break;
        }
        last_position = position;

        match kind {
            StreamKind::Color => streams.color.push(frame),
            StreamKind::Depth => {
                let Some(color) = streams.color.last() else {
                    streams.unaligned_depth += 1;
                    continue;
                };
                match aligner.align(frame, color) {
                    Ok(aligned) => streams.depth.push(aligned),
                    Err(e) => {
                        skip_or_fail(e, options, &mut streams, &mut consecutive_errors)?;
                        continue;
                    }
                }
            }
        }
        consecutive_errors = 0;

        if duration > 0.0 {
            report(((position / duration) * 100.0).clamp(0.0, 100.0) as u32);
        }
    }

    report(100);
    Ok(streams)
}

fn skip_or_fail(
    error: CaptureError,
    options: ExtractOptions,
    streams: &mut DecodedStreams,
    consecutive_errors: &mut usize,
) -> CaptureResult<()> {
    if !options.ignore_frame_errors {
        return Err(error);
    }
    *consecutive_errors += 1;
    if *consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
        return Err(CaptureError::TooManyErrors(*consecutive_errors));
    }
    tracing::warn!("Skipping frame: {}", error);
    streams.skipped += 1;
    Ok(())
}
