//! Processing of a single staged capture.
//!
//! ```text
//! staged file -> decoder session -> color/depth timelines
//!             -> time-range filter -> correlate -> pair folders
//! ```

use crate::capture::{
    extract_streams, CaptureDecoder, DecodedStreams, ExtractOptions, SpatialAligner,
};
use crate::correlate::{correlate, CorrelationStats, TimeRange};
use crate::jobs::Job;
use crate::logging::JobLogger;
use crate::models::{FrameTimeline, StreamKind};
use crate::output::{ImageWriter, MetadataWriter, PairWriter};

use super::errors::JobResult;

/// Per-run processing parameters.
#[derive(Debug, Clone, Copy)]
pub struct ProcessOptions<'a> {
    pub max_skew: f64,
    pub ignore_frame_errors: bool,
    pub metadata_entries: usize,
    /// Offsets from the session origin to keep; empty keeps everything.
    pub time_ranges: &'a [TimeRange],
}

/// What a successful job produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobOutcome {
    pub pairs: usize,
    pub stats: CorrelationStats,
    /// Frames dropped because they failed to decode or align.
    pub skipped_frames: usize,
}

/// Turns one staged capture into correlated pair folders.
pub struct JobProcessor<'a> {
    decoder: &'a dyn CaptureDecoder,
    aligner: &'a dyn SpatialAligner,
    images: &'a dyn ImageWriter,
    metadata: &'a dyn MetadataWriter,
    options: ProcessOptions<'a>,
}

impl<'a> JobProcessor<'a> {
    pub fn new(
        decoder: &'a dyn CaptureDecoder,
        aligner: &'a dyn SpatialAligner,
        images: &'a dyn ImageWriter,
        metadata: &'a dyn MetadataWriter,
        options: ProcessOptions<'a>,
    ) -> Self {
        Self {
            decoder,
            aligner,
            images,
            metadata,
            options,
        }
    }

    /// Process the job's staged copy.
    ///
    /// Outputs from any earlier attempt are cleared first. `on_progress`
    /// receives decode progress in percent.
    pub fn process<F>(&self, job: &Job, logger: &JobLogger, mut on_progress: F) -> JobResult<JobOutcome>
    where
        F: FnMut(u32),
    {
        let writer = PairWriter::new(
            self.images,
            self.metadata,
            job.output_dir(),
            job.label_dir(),
            job.stem(),
        )
        .with_metadata_entries(self.options.metadata_entries);
        writer.prepare()?;

        logger.phase("Decode");
        // Frames may point into resources owned by the session, so it stays
        // open until every pair is written.
        let mut session = self.decoder.open(job.staging_path())?;
        let DecodedStreams {
            color,
            depth,
            skipped,
            unaligned_depth,
        } = extract_streams(
            session.as_mut(),
            self.aligner,
            ExtractOptions {
                ignore_frame_errors: self.options.ignore_frame_errors,
            },
            |pct| {
                logger.progress(pct);
                on_progress(pct);
            },
        )?;

        logger.info(&format!(
            "Decoded {} color and {} depth frames",
            color.len(),
            depth.len()
        ));
        if skipped > 0 {
            logger.warn(&format!("Skipped {} undecodable frames", skipped));
        }
        if unaligned_depth > 0 {
            logger.debug(&format!(
                "Dropped {} depth frames received before the first color frame",
                unaligned_depth
            ));
        }

        let mut color = FrameTimeline::new(StreamKind::Color, color)?;
        let mut depth = FrameTimeline::new(StreamKind::Depth, depth)?;

        let ranges = self.options.time_ranges;
        if !ranges.is_empty() {
            let origin = session_origin(&color, &depth);
            color.retain_within(ranges, origin);
            depth.retain_within(ranges, origin);
            logger.info(&format!(
                "Kept {} color and {} depth frames inside {} time ranges",
                color.len(),
                depth.len(),
                ranges.len()
            ));
        }

        logger.phase("Correlate");
        let correlation = correlate(color, depth, self.options.max_skew)?;
        let stats = correlation.stats;
        logger.info(&format!(
            "{} pairs within {:.3}s (depth coverage {}%)",
            stats.pairs,
            self.options.max_skew,
            stats.depth_progress_pct()
        ));

        logger.phase("Write");
        for pair in &correlation.pairs {
            writer.write_pair(pair)?;
        }
        drop(session);

        Ok(JobOutcome {
            pairs: correlation.pairs.len(),
            stats,
            skipped_frames: skipped,
        })
    }
}

/// Earliest timestamp across both streams.
fn session_origin(color: &FrameTimeline, depth: &FrameTimeline) -> f64 {
    match (color.first_timestamp(), depth.first_timestamp()) {
        (Some(c), Some(d)) => c.min(d),
        (Some(t), None) | (None, Some(t)) => t,
        (None, None) => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::IdentityAligner;
    use crate::logging::LogConfig;
    use crate::orchestrator::JobError;
    use crate::output::{RasterWriter, TextMetadataWriter};
    use crate::test_support::{write_capture, ScriptedDecoder};
    use std::fs;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    const NO_RANGES: &[TimeRange] = &[];

    fn options(time_ranges: &[TimeRange]) -> ProcessOptions<'_> {
        ProcessOptions {
            max_skew: 0.1,
            ignore_frame_errors: false,
            metadata_entries: 5,
            time_ranges,
        }
    }

    /// Job whose staged copy holds the given script.
    fn staged_job(dir: &TempDir, lines: &[&str]) -> Job {
        let data = dir.path().join("data");
        let source = data.join("site/run.bag");
        write_capture(&source, lines);
        let job = Job::new(
            &source,
            &data,
            &dir.path().join("out"),
            &dir.path().join("fast"),
            0,
        )
        .unwrap();
        write_capture(job.staging_path(), lines);
        job
    }

    fn run(job: &Job, logs: &Path, options: ProcessOptions<'_>) -> JobResult<JobOutcome> {
        let logger = JobLogger::new(job.reference_id(), logs, LogConfig::default()).unwrap();
        JobProcessor::new(
            &ScriptedDecoder,
            &IdentityAligner,
            &RasterWriter,
            &TextMetadataWriter,
            options,
        )
        .process(job, &logger, |_| {})
    }

    #[test]
    fn writes_one_folder_per_pair() {
        let dir = tempdir().unwrap();
        let job = staged_job(
            &dir,
            &[
                "color 0.00",
                "depth 0.02",
                "color 0.50",
                "depth 0.55",
                "color 1.00",
                "depth 1.40",
            ],
        );

        let outcome = run(&job, &dir.path().join("logs"), options(NO_RANGES)).unwrap();

        assert_eq!(outcome.pairs, 2);
        assert_eq!(outcome.stats.color_frames, 3);
        let folder = job.output_dir().join("frame_000001");
        assert!(folder.join("run_Color_t0.500000000.png").is_file());
        assert!(folder.join("run_Depth_t0.550000000.tiff").is_file());
        assert!(!job.output_dir().join("frame_000002").exists());
        assert_eq!(fs::read_dir(job.label_dir()).unwrap().count(), 2);
    }

    #[test]
    fn time_ranges_filter_before_pairing() {
        let dir = tempdir().unwrap();
        let job = staged_job(
            &dir,
            &[
                "color 10.0",
                "depth 10.0",
                "color 11.0",
                "depth 11.0",
                "color 12.0",
                "depth 12.0",
            ],
        );
        // Offsets 0, 1, 2 from the origin; only 1 is strictly inside.
        let ranges = [TimeRange::new(0.5, 1.5)];

        let outcome = run(&job, &dir.path().join("logs"), options(&ranges)).unwrap();

        assert_eq!(outcome.pairs, 1);
        let folder = job.output_dir().join("frame_000000");
        assert!(folder.join("run_Color_t11.000000000.png").is_file());
    }

    #[test]
    fn decode_error_fails_the_job() {
        let dir = tempdir().unwrap();
        let job = staged_job(&dir, &["color 0.0", "error", "depth 0.0"]);

        let err = run(&job, &dir.path().join("logs"), options(NO_RANGES)).unwrap_err();
        assert!(matches!(err, JobError::Decode(_)));
    }

    #[test]
    fn decode_errors_skipped_when_ignored() {
        let dir = tempdir().unwrap();
        let job = staged_job(&dir, &["color 0.0", "error", "depth 0.0"]);
        let opts = ProcessOptions {
            ignore_frame_errors: true,
            ..options(NO_RANGES)
        };

        let outcome = run(&job, &dir.path().join("logs"), opts).unwrap();
        assert_eq!(outcome.pairs, 1);
        assert_eq!(outcome.skipped_frames, 1);
    }

    #[test]
    fn repeated_timestamps_are_accepted() {
        let dir = tempdir().unwrap();
        let job = staged_job(&dir, &["color 0.5", "depth 0.5", "color 0.5", "depth 0.5"]);

        let outcome = run(&job, &dir.path().join("logs"), options(NO_RANGES)).unwrap();
        assert_eq!(outcome.pairs, 2);
        let labels = fs::read_dir(job.label_dir()).unwrap().count();
        assert_eq!(labels, outcome.pairs);
    }

    #[test]
    fn open_failure_fails_the_job() {
        let dir = tempdir().unwrap();
        let job = staged_job(&dir, &["color 0.0", "fail"]);

        let err = run(&job, &dir.path().join("logs"), options(NO_RANGES)).unwrap_err();
        assert!(err.to_string().contains("scripted open failure"));
    }

    #[test]
    fn rerun_replaces_previous_outputs() {
        let dir = tempdir().unwrap();
        let job = staged_job(&dir, &["color 0.0", "depth 0.0"]);
        fs::create_dir_all(job.output_dir().join("frame_000042")).unwrap();

        run(&job, &dir.path().join("logs"), options(NO_RANGES)).unwrap();

        assert!(!job.output_dir().join("frame_000042").exists());
        assert!(job.output_dir().join("frame_000000").is_dir());
    }

    #[test]
    fn empty_capture_succeeds_with_no_pairs() {
        let dir = tempdir().unwrap();
        let job = staged_job(&dir, &[]);

        let outcome = run(&job, &dir.path().join("logs"), options(NO_RANGES)).unwrap();
        assert_eq!(outcome.pairs, 0);
        assert!(job.output_dir().is_dir());
    }
}
