//! Two-stage batch runner.
//!
//! ```text
//! discover -> filter succeeded -> [staging thread] --bounded queue--> [processing thread(s)]
//!                                   copy to fast disk                 decode, correlate, write
//!                                                                     record outcome, release
//! ```
//!
//! Staging runs ahead of processing by at most `queue_capacity` jobs, so
//! fast storage never holds more than `queue_capacity + processing_workers
//! + 1` staged copies.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::capture::{CaptureDecoder, IdentityAligner, SpatialAligner};
use crate::jobs::{discover_jobs, DiscoveryRoots, Job, JobRecord, JobStore, StoreError};
use crate::logging::JobLogger;
use crate::output::{ImageWriter, MetadataWriter, RasterWriter, TextMetadataWriter};

use super::errors::{JobError, JobResult, RunError, RunResult, StagingError};
use super::processor::{JobOutcome, JobProcessor, ProcessOptions};
use super::staging::{release_staged, stage_job};
use super::types::{ProgressCallback, RunConfig, RunSummary};

/// Handle for cancelling a running pipeline.
///
/// Staging stops before its next job; processing stops after the job in
/// flight has been recorded.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Unit of work handed from staging to processing.
enum StagedJob<'a> {
    Ready(&'a Job),
    Failed(&'a Job, StagingError),
}

/// State shared by the processing workers.
struct Shared {
    store: Mutex<JobStore>,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    /// First checkpoint write failure.
    fatal: Mutex<Option<StoreError>>,
}

/// Runs every pending job through staging and processing.
pub struct PipelineRunner {
    config: RunConfig,
    decoder: Box<dyn CaptureDecoder>,
    aligner: Box<dyn SpatialAligner>,
    images: Box<dyn ImageWriter>,
    metadata: Box<dyn MetadataWriter>,
    progress: Option<ProgressCallback>,
    cancel: CancelHandle,
}

impl PipelineRunner {
    /// Runner with the identity aligner and the raster/text writers.
    pub fn new(config: RunConfig, decoder: impl CaptureDecoder + 'static) -> Self {
        Self {
            config,
            decoder: Box::new(decoder),
            aligner: Box::new(IdentityAligner),
            images: Box::new(RasterWriter),
            metadata: Box::new(TextMetadataWriter),
            progress: None,
            cancel: CancelHandle::new(),
        }
    }

    pub fn with_aligner(mut self, aligner: impl SpatialAligner + 'static) -> Self {
        self.aligner = Box::new(aligner);
        self
    }

    pub fn with_image_writer(mut self, writer: impl ImageWriter + 'static) -> Self {
        self.images = Box::new(writer);
        self
    }

    pub fn with_metadata_writer(mut self, writer: impl MetadataWriter + 'static) -> Self {
        self.metadata = Box::new(writer);
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Get a cancellation handle for this runner.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run all pending jobs to completion (or cancellation).
    ///
    /// Job failures are recorded and do not stop the run. A corrupt
    /// checkpoint, a failed discovery or a failed checkpoint write is
    /// fatal; in the last case jobs already in flight finish first.
    pub fn run(&self) -> RunResult<RunSummary> {
        let cfg = &self.config;
        cfg.validate()?;

        let store = JobStore::load(&cfg.checkpoint_path)?;
        let roots = DiscoveryRoots {
            input_root: &cfg.input_root,
            output_root: &cfg.output_root,
            staging_dir: &cfg.staging_dir,
        };
        let jobs = discover_jobs(&roots, &cfg.capture_extension)?;

        let pending: Vec<&Job> = jobs
            .iter()
            .filter(|job| !store.is_succeeded(job.reference_id()))
            .collect();
        let mut summary = RunSummary {
            discovered: jobs.len(),
            skipped: jobs.len() - pending.len(),
            ..RunSummary::default()
        };
        tracing::info!(
            "{} jobs discovered, {} already done, {} to run",
            summary.discovered,
            summary.skipped,
            pending.len()
        );

        let shared = Shared {
            store: Mutex::new(store),
            succeeded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            fatal: Mutex::new(None),
        };
        let processor = JobProcessor::new(
            self.decoder.as_ref(),
            self.aligner.as_ref(),
            self.images.as_ref(),
            self.metadata.as_ref(),
            ProcessOptions {
                max_skew: cfg.max_skew,
                ignore_frame_errors: cfg.ignore_frame_errors,
                metadata_entries: cfg.metadata_entries,
                time_ranges: &cfg.time_ranges,
            },
        );

        let (tx, rx) = bounded::<StagedJob<'_>>(cfg.queue_capacity);
        let panicked = thread::scope(|scope| {
            let pending = &pending;
            let shared = &shared;
            let processor = &processor;

            let staging = scope.spawn(move || self.staging_stage(pending, tx));
            let workers: Vec<_> = (0..cfg.processing_workers)
                .map(|_| {
                    let rx = rx.clone();
                    scope.spawn(move || self.processing_stage(rx, processor, shared))
                })
                .collect();
            drop(rx);

            let mut panicked = None;
            for worker in workers {
                if worker.join().is_err() {
                    self.cancel.cancel();
                    panicked = Some("processing");
                }
            }
            if staging.join().is_err() {
                panicked = Some("staging");
            }
            panicked
        });

        if let Some(stage) = panicked {
            return Err(RunError::WorkerPanicked(stage));
        }
        if let Some(e) = shared.fatal.into_inner() {
            return Err(RunError::Checkpoint(e));
        }

        summary.succeeded = shared.succeeded.into_inner();
        summary.failed = shared.failed.into_inner();
        summary.not_started = pending.len() - summary.succeeded - summary.failed;
        summary.cancelled = self.cancel.is_cancelled();

        tracing::info!(
            "Run finished: {} succeeded, {} failed, {} skipped, {} not started",
            summary.succeeded,
            summary.failed,
            summary.skipped,
            summary.not_started
        );
        Ok(summary)
    }

    /// Stage jobs in order until done, cancelled, or processing stops.
    fn staging_stage<'j>(&self, pending: &[&'j Job], tx: Sender<StagedJob<'j>>) {
        for &job in pending {
            if self.cancel.is_cancelled() {
                tracing::info!("Cancellation requested, staging stopped");
                break;
            }

            let staged = match stage_job(job) {
                Ok(_) => StagedJob::Ready(job),
                Err(e) => {
                    tracing::warn!("Staging {} failed: {}", job.reference_id(), e);
                    StagedJob::Failed(job, e)
                }
            };

            // Blocks while the queue is full; errors once every worker exited.
            if tx.send(staged).is_err() {
                break;
            }
        }
    }

    /// Process staged jobs until the queue closes or the run is cancelled.
    fn processing_stage(&self, rx: Receiver<StagedJob<'_>>, processor: &JobProcessor<'_>, shared: &Shared) {
        for staged in rx.iter() {
            if self.cancel.is_cancelled() {
                break;
            }

            let (job, result) = match staged {
                StagedJob::Ready(job) => (job, self.process_guarded(job, processor)),
                StagedJob::Failed(job, e) => (job, Err(JobError::Staging(e))),
            };

            let record = match &result {
                Ok(outcome) => JobRecord::succeeded(outcome.pairs),
                Err(e) => JobRecord::failed(e.to_string()),
            };
            let recorded = shared.store.lock().record_outcome(job.reference_id(), record);
            release_staged(job);

            if let Err(e) = recorded {
                tracing::error!("Failed to record outcome of {}: {}", job.reference_id(), e);
                shared.fatal.lock().get_or_insert(e);
                self.cancel.cancel();
                break;
            }

            match result {
                Ok(_) => shared.succeeded.fetch_add(1, Ordering::SeqCst),
                Err(_) => shared.failed.fetch_add(1, Ordering::SeqCst),
            };

            if self.cancel.is_cancelled() {
                tracing::info!("Cancellation requested, processing stopped");
                break;
            }
        }
    }

    /// `process_one`, turning a panic into a job failure so the outcome is
    /// still recorded and the staged copy released.
    fn process_guarded(&self, job: &Job, processor: &JobProcessor<'_>) -> JobResult<JobOutcome> {
        panic::catch_unwind(AssertUnwindSafe(|| self.process_one(job, processor))).unwrap_or_else(
            |payload| {
                let message = panic_message(payload.as_ref());
                tracing::error!("{} panicked: {}", job.reference_id(), message);
                Err(JobError::Panicked(message))
            },
        )
    }

    fn process_one(&self, job: &Job, processor: &JobProcessor<'_>) -> JobResult<JobOutcome> {
        let cfg = &self.config;
        let reference = job.reference_id();
        tracing::info!("Processing {}", reference);

        let logger = JobLogger::new(reference, &cfg.log_dir, cfg.log_config.clone())
            .map_err(JobError::Log)?;
        logger.info(&format!("Source: {}", job.source_path().display()));
        logger.info(&format!("Output: {}", job.output_dir().display()));

        let result = processor.process(job, &logger, |pct| {
            if let Some(ref callback) = self.progress {
                callback(reference, pct);
            }
        });

        match &result {
            Ok(outcome) => {
                logger.success(&format!("{} frame pairs written", outcome.pairs));
                tracing::info!("{}: {} pairs", reference, outcome.pairs);
            }
            Err(e) => {
                logger.error(&e.to_string());
                logger.show_tail("warnings");
                tracing::warn!("{} failed: {}", reference, e);
            }
        }
        result
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobStatus;
    use crate::models::FrameImage;
    use crate::output::OutputResult;
    use crate::test_support::{write_capture, ScriptedDecoder};
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    const GOOD: &[&str] = &["color 0.00", "depth 0.02", "color 0.50", "depth 0.53"];

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: tempdir().unwrap(),
            }
        }

        fn data(&self) -> PathBuf {
            self.dir.path().join("data")
        }

        fn out(&self) -> PathBuf {
            self.dir.path().join("out")
        }

        fn fast(&self) -> PathBuf {
            self.dir.path().join("fast")
        }

        fn checkpoint(&self) -> PathBuf {
            self.dir.path().join("progress.json")
        }

        fn capture(&self, relative: &str, lines: &[&str]) {
            write_capture(&self.data().join(relative), lines);
        }

        fn config(&self) -> RunConfig {
            RunConfig::new(self.data(), self.out(), self.checkpoint(), self.fast())
        }

        fn runner(&self) -> PipelineRunner {
            PipelineRunner::new(self.config(), ScriptedDecoder)
        }

        fn staged_files(&self) -> usize {
            match fs::read_dir(self.fast()) {
                Ok(entries) => entries.count(),
                Err(_) => 0,
            }
        }
    }

    /// Raster writer that records how many staged copies exist while a job
    /// is being written, and writes slowly so staging can run ahead.
    struct SlowWriter {
        fast: PathBuf,
        max_staged: Arc<AtomicUsize>,
    }

    impl ImageWriter for SlowWriter {
        fn write(&self, image: &FrameImage, path: &Path) -> OutputResult<()> {
            let staged = fs::read_dir(&self.fast).map(|e| e.count()).unwrap_or(0);
            self.max_staged.fetch_max(staged, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            RasterWriter.write(image, path)
        }
    }

    fn pair_folders(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().starts_with("frame_"))
            .count()
    }

    #[test]
    fn processes_every_capture() {
        let fx = Fixture::new();
        fx.capture("site/a.bag", GOOD);
        fx.capture("site/day2/b.bag", GOOD);
        fx.capture("site/notes.txt", &["ignored"]);

        let summary = fx.runner().run().unwrap();

        assert_eq!(
            summary,
            RunSummary {
                discovered: 2,
                succeeded: 2,
                ..RunSummary::default()
            }
        );
        assert_eq!(pair_folders(&fx.out().join("site_a")), 2);
        assert_eq!(pair_folders(&fx.out().join("site_day2_b")), 2);
        assert_eq!(fs::read_dir(fx.out().join("site_day2_b_label")).unwrap().count(), 2);

        let store = JobStore::load(fx.checkpoint()).unwrap();
        assert_eq!(store.get("site_a.bag").unwrap().frame_pairs, Some(2));
        assert!(store.is_succeeded("site_day2_b.bag"));
        assert!(fx.out().join(".logs/site_a.bag.log").is_file());
    }

    #[test]
    fn failing_job_does_not_stop_the_run() {
        let fx = Fixture::new();
        fx.capture("a.bag", GOOD);
        fx.capture("broken.bag", &["fail"]);
        fx.capture("c.bag", GOOD);

        let summary = fx.runner().run().unwrap();

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        let store = JobStore::load(fx.checkpoint()).unwrap();
        let record = store.get("broken.bag").unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert!(record.error.as_deref().unwrap().contains("scripted open failure"));
    }

    #[test]
    fn rerun_after_success_is_a_no_op() {
        let fx = Fixture::new();
        fx.capture("a.bag", GOOD);
        fx.capture("b.bag", GOOD);
        fx.runner().run().unwrap();
        let before = fs::read(fx.checkpoint()).unwrap();

        let summary = fx.runner().run().unwrap();

        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.succeeded + summary.failed, 0);
        assert_eq!(fs::read(fx.checkpoint()).unwrap(), before);
    }

    #[test]
    fn failed_jobs_are_retried() {
        let fx = Fixture::new();
        fx.capture("a.bag", GOOD);
        fx.capture("b.bag", &["fail"]);
        fx.runner().run().unwrap();

        fx.capture("b.bag", GOOD);
        let summary = fx.runner().run().unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.succeeded, 1);
        assert!(JobStore::load(fx.checkpoint()).unwrap().is_succeeded("b.bag"));
    }

    #[test]
    fn unrecorded_job_is_redone_from_scratch() {
        let fx = Fixture::new();
        fx.capture("a.bag", GOOD);
        // Outputs of an attempt that crashed before its outcome was recorded.
        fs::create_dir_all(fx.out().join("a/frame_000007")).unwrap();
        fs::create_dir_all(fx.out().join("a_label")).unwrap();
        fs::write(fx.out().join("a_label/stale.png"), b"x").unwrap();

        let summary = fx.runner().run().unwrap();

        assert_eq!(summary.succeeded, 1);
        assert!(!fx.out().join("a/frame_000007").exists());
        assert!(!fx.out().join("a_label/stale.png").exists());
        assert_eq!(pair_folders(&fx.out().join("a")), 2);
    }

    #[test]
    fn staged_copies_are_released() {
        let fx = Fixture::new();
        for name in ["a.bag", "b.bag", "c.bag", "d.bag", "e.bag"] {
            fx.capture(name, GOOD);
        }
        fx.capture("f.bag", &["fail"]);
        let mut config = fx.config();
        config.queue_capacity = 1;

        let summary = PipelineRunner::new(config, ScriptedDecoder).run().unwrap();

        assert_eq!(summary.succeeded + summary.failed, 6);
        assert_eq!(fx.staged_files(), 0);
    }

    #[test]
    fn several_workers_share_the_queue() {
        let fx = Fixture::new();
        for i in 0..6 {
            fx.capture(&format!("run{}.bag", i), GOOD);
        }
        let mut config = fx.config();
        config.processing_workers = 3;
        config.queue_capacity = 2;

        let summary = PipelineRunner::new(config, ScriptedDecoder).run().unwrap();

        assert_eq!(summary.succeeded, 6);
        assert_eq!(JobStore::load(fx.checkpoint()).unwrap().len(), 6);
    }

    #[test]
    fn cancel_before_start_processes_nothing() {
        let fx = Fixture::new();
        fx.capture("a.bag", GOOD);
        fx.capture("b.bag", GOOD);

        let runner = fx.runner();
        runner.cancel_handle().cancel();
        let summary = runner.run().unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.not_started, 2);
        assert!(!fx.checkpoint().exists());
        assert!(!fx.out().join("a").exists());
    }

    #[test]
    fn cancel_during_run_finishes_current_job() {
        let fx = Fixture::new();
        for name in ["a.bag", "b.bag", "c.bag"] {
            fx.capture(name, GOOD);
        }

        let runner = fx.runner();
        let handle = runner.cancel_handle();
        let runner = runner.with_progress_callback(Box::new(move |_, pct| {
            if pct == 100 {
                handle.cancel();
            }
        }));
        let summary = runner.run().unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.not_started, 2);
        assert_eq!(JobStore::load(fx.checkpoint()).unwrap().len(), 1);
    }

    #[test]
    fn checkpoint_write_failure_is_fatal() {
        let fx = Fixture::new();
        fx.capture("a.bag", GOOD);
        fx.capture("b.bag", GOOD);
        // A directory where the temp file should go makes every save fail.
        fs::create_dir_all(fx.dir.path().join("progress.json.tmp")).unwrap();

        let runner = fx.runner();
        let result = runner.run();

        assert!(matches!(result, Err(RunError::Checkpoint(StoreError::Io { .. }))));
        assert!(runner.cancel_handle().is_cancelled());
    }

    #[test]
    fn corrupt_checkpoint_stops_before_any_work() {
        let fx = Fixture::new();
        fx.capture("a.bag", GOOD);
        fs::write(fx.checkpoint(), "{ truncated").unwrap();

        let result = fx.runner().run();

        assert!(matches!(result, Err(RunError::Checkpoint(StoreError::Corrupt { .. }))));
        assert!(!fx.out().exists());
    }

    #[test]
    fn missing_input_root_is_fatal() {
        let fx = Fixture::new();
        assert!(matches!(fx.runner().run(), Err(RunError::Discovery(_))));
    }

    #[test]
    fn progress_reported_per_job() {
        let fx = Fixture::new();
        fx.capture("a.bag", GOOD);
        fx.capture("b.bag", GOOD);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let summary = fx
            .runner()
            .with_progress_callback(Box::new(move |reference, pct| {
                if pct == 100 {
                    sink.lock().push(reference.to_string());
                }
            }))
            .run()
            .unwrap();

        assert_eq!(summary.succeeded, 2);
        let mut finished = seen.lock().clone();
        finished.sort();
        assert_eq!(finished, vec!["a.bag", "b.bag"]);
    }

    #[test]
    fn staging_blocks_when_the_queue_is_full() {
        let fx = Fixture::new();
        for i in 0..6 {
            fx.capture(&format!("run{}.bag", i), GOOD);
        }
        let mut config = fx.config();
        config.queue_capacity = 1;
        config.processing_workers = 1;

        let max_staged = Arc::new(AtomicUsize::new(0));
        let writer = SlowWriter {
            fast: fx.fast(),
            max_staged: Arc::clone(&max_staged),
        };
        let summary = PipelineRunner::new(config, ScriptedDecoder)
            .with_image_writer(writer)
            .run()
            .unwrap();

        assert_eq!(summary.succeeded, 6);
        // One job processing, one queued, one waiting in a blocked send.
        let observed = max_staged.load(Ordering::SeqCst);
        assert!(observed >= 1 && observed <= 3, "{} staged copies", observed);
        assert_eq!(fx.staged_files(), 0);
    }

    #[test]
    fn jobs_are_processed_smallest_first() {
        let fx = Fixture::new();
        let longer: Vec<&str> = GOOD.iter().copied().chain(["color 1.00", "depth 1.02"]).collect();
        let longest: Vec<&str> = longer.iter().copied().chain(["color 1.50", "depth 1.53"]).collect();
        fx.capture("a.bag", &longest);
        fx.capture("b.bag", GOOD);
        fx.capture("c.bag", &longer);

        let order = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&order);
        let summary = fx
            .runner()
            .with_progress_callback(Box::new(move |reference, pct| {
                if pct == 100 {
                    sink.lock().push(reference.to_string());
                }
            }))
            .run()
            .unwrap();

        assert_eq!(summary.succeeded, 3);
        assert_eq!(*order.lock(), vec!["b.bag", "c.bag", "a.bag"]);
    }

    #[test]
    fn panicking_job_is_recorded_as_failed() {
        let fx = Fixture::new();
        fx.capture("a.bag", GOOD);
        fx.capture("b.bag", &["color 0.00", "panic"]);
        fx.capture("c.bag", GOOD);

        let summary = fx.runner().run().unwrap();

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert!(!summary.cancelled);
        let store = JobStore::load(fx.checkpoint()).unwrap();
        let record = store.get("b.bag").unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert!(record.error.as_deref().unwrap().contains("scripted decoder panic"));
        assert_eq!(fx.staged_files(), 0);
    }
}
