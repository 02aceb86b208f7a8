//! Run coordinator - orchestrates the two-phase run
//!
//! The coordinator is responsible for:
//! - Phase 1: the parallel archive scan
//! - Phase 2: extraction, started only after the scan pool has drained
//! - Periodic progress sampling on a ticker thread
//! - Signal handling (cancel pools, kill live subprocesses)
//! - Final statistics
//!
//! Pools, the ticker and subprocesses are released on every exit path:
//! pools and the ticker join on drop, and the extractor's live children are
//! killed whenever the run is cancelled or fails.

use crate::config::WalkConfig;
use crate::error::Result;
use crate::extract::scheduler::{ExtractionScheduler, FailedArchive};
use crate::extract::tool::Extractor;
use crate::stats::{ProgressSnapshot, RunCounters};
use crate::walker::pool::WorkerPool;
use crate::walker::scanner::TreeWalker;
use crossbeam_channel::{bounded, select, tick, Sender};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often the coordinator re-checks the shutdown flag while waiting
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How often progress is sampled
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Which phase the run is in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Scanning = 0,
    Extracting = 1,
}

impl Phase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Phase::Extracting,
            _ => Phase::Scanning,
        }
    }
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Root that was scanned
    pub root: PathBuf,

    /// Counters after every worker joined
    pub stats: ProgressSnapshot,

    /// Archives that failed to extract
    pub failures: Vec<FailedArchive>,

    /// Archives not attempted because the run was cancelled
    pub not_attempted: u64,

    /// Wall time
    pub duration: Duration,

    /// Whether the run completed (vs was interrupted)
    pub completed: bool,

    /// Extraction was skipped on purpose
    pub dry_run: bool,
}

impl RunResult {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Coordinates scan and extraction for one run
pub struct RunCoordinator {
    config: Arc<WalkConfig>,
    extractor: Arc<dyn Extractor>,
    counters: Arc<RunCounters>,
    shutdown: Arc<AtomicBool>,
}

impl RunCoordinator {
    pub fn new(config: WalkConfig, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            config: Arc::new(config),
            extractor,
            counters: Arc::new(RunCounters::default()),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a clone of the shutdown flag (for signal handlers)
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Shared counters, readable at any time
    pub fn counters(&self) -> Arc<RunCounters> {
        Arc::clone(&self.counters)
    }

    /// Run both phases without progress reporting
    pub fn run(&self) -> Result<RunResult> {
        self.run_with_progress(|_, _| {})
    }

    /// Run both phases, calling `progress` every [`PROGRESS_INTERVAL`] and
    /// once more after all workers have joined
    pub fn run_with_progress<F>(&self, progress: F) -> Result<RunResult>
    where
        F: Fn(Phase, ProgressSnapshot) + Send + 'static,
    {
        let start = Instant::now();
        let phase = Arc::new(AtomicU8::new(Phase::Scanning as u8));

        let ticker = ProgressTicker::spawn(
            Arc::clone(&self.counters),
            Arc::clone(&phase),
            start,
            progress,
        )?;

        let result = self.run_phases(&phase, start);
        if result.is_err() {
            self.extractor.cancel_all();
        }
        ticker.stop();

        result
    }

    fn run_phases(&self, phase: &AtomicU8, start: Instant) -> Result<RunResult> {
        info!(
            root = %self.config.root.display(),
            workers = self.config.worker_count,
            extensions = ?self.config.extensions,
            "Starting run"
        );

        // Phase 1: discovery
        let walker = TreeWalker::new(Arc::clone(&self.config), Arc::clone(&self.counters));
        let pool = walker.start()?;
        let scanned = self.drive(&pool);
        let archives = walker.finish(pool)?;

        if !scanned {
            warn!("Run interrupted during scan");
            return Ok(self.result(start, Vec::new(), 0, false));
        }

        if archives.is_empty() {
            info!("No archives found");
            return Ok(self.result(start, Vec::new(), 0, true));
        }

        if self.config.dry_run {
            for archive in &archives {
                info!(archive = %archive.path.display(), size = archive.size, "Found archive");
            }
            info!(archives = archives.len(), "Dry run, skipping extraction");
            return Ok(self.result(start, Vec::new(), 0, true));
        }

        // Phase 2: extraction, strictly after the scan pool has joined
        phase.store(Phase::Extracting as u8, Ordering::SeqCst);
        let scheduler = ExtractionScheduler::new(
            Arc::clone(&self.extractor),
            Arc::clone(&self.counters),
            self.config.worker_count,
        );
        let pool = scheduler.start(archives)?;
        let extracted = self.drive(&pool);
        let report = scheduler.finish(pool)?;

        if !extracted {
            warn!(not_attempted = report.not_attempted, "Run interrupted during extraction");
        }

        Ok(self.result(start, report.failed, report.not_attempted, extracted))
    }

    /// Wait for `pool` to drain, cancelling it if shutdown is requested.
    /// Returns `false` if the run was interrupted.
    fn drive<T: Send + 'static>(&self, pool: &WorkerPool<T>) -> bool {
        while !pool.wait_timeout(POLL_INTERVAL) {
            if self.shutdown.load(Ordering::SeqCst) && !pool.is_cancelled() {
                info!(
                    pending = pool.pending(),
                    active = pool.active(),
                    "Shutdown requested, cancelling"
                );
                pool.cancel();
                self.extractor.cancel_all();
            }
        }
        !self.shutdown.load(Ordering::SeqCst)
    }

    fn result(
        &self,
        start: Instant,
        failures: Vec<FailedArchive>,
        not_attempted: u64,
        completed: bool,
    ) -> RunResult {
        let duration = start.elapsed();
        let stats = self.counters.snapshot(duration);

        info!(
            folders = stats.processed_folders,
            unreadable = stats.unreadable_folders,
            archives = stats.total_archives,
            succeeded = stats.success_count,
            failed = stats.fail_count,
            duration_secs = duration.as_secs(),
            completed,
            "Run finished"
        );

        RunResult {
            root: self.config.root.clone(),
            stats,
            failures,
            not_attempted,
            duration,
            completed,
            dry_run: self.config.dry_run,
        }
    }
}

/// Background thread sampling the counters at a fixed interval
struct ProgressTicker {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressTicker {
    fn spawn<F>(
        counters: Arc<RunCounters>,
        phase: Arc<AtomicU8>,
        start: Instant,
        callback: F,
    ) -> Result<Self>
    where
        F: Fn(Phase, ProgressSnapshot) + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(0);

        let handle = thread::Builder::new()
            .name("progress".to_string())
            .spawn(move || {
                let ticker = tick(PROGRESS_INTERVAL);
                let sample = || {
                    let phase = Phase::from_u8(phase.load(Ordering::SeqCst));
                    callback(phase, counters.snapshot(start.elapsed()));
                };

                loop {
                    select! {
                        recv(ticker) -> _ => sample(),
                        recv(stop_rx) -> _ => {
                            sample();
                            break;
                        }
                    }
                }
                debug!("Progress ticker stopped");
            })
            .map_err(|e| crate::error::WorkerError::SpawnFailed {
                id: 0,
                reason: e.to_string(),
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Take a final sample and join
    fn stop(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        drop(self.stop_tx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Progress callback panicked");
            }
        }
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::tool::ExtractionOutcome;
    use parking_lot::Mutex;
    use std::path::Path;
    use tempfile::tempdir;

    struct AlwaysOk;

    impl Extractor for AlwaysOk {
        fn extract(&self, _archive: &Path, _dest: &Path) -> ExtractionOutcome {
            ExtractionOutcome::Success
        }
    }

    fn config(root: &Path) -> WalkConfig {
        WalkConfig::new(root.canonicalize().unwrap(), 2)
    }

    #[test]
    fn test_phase_roundtrip() {
        assert_eq!(Phase::from_u8(Phase::Scanning as u8), Phase::Scanning);
        assert_eq!(Phase::from_u8(Phase::Extracting as u8), Phase::Extracting);
    }

    #[test]
    fn test_run_counts_converge() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.zip"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.7z"), b"x").unwrap();

        let coordinator = RunCoordinator::new(config(dir.path()), Arc::new(AlwaysOk));
        let result = coordinator.run().unwrap();

        assert!(result.completed);
        assert_eq!(result.stats.total_archives, 2);
        assert_eq!(result.stats.success_count + result.stats.fail_count, 2);
        assert_eq!(result.stats.processed_folders, 2);
    }

    #[test]
    fn test_final_progress_sample_after_join() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.zip"), b"x").unwrap();

        let samples = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&samples);
        let coordinator = RunCoordinator::new(config(dir.path()), Arc::new(AlwaysOk));
        coordinator
            .run_with_progress(move |phase, snap| sink.lock().push((phase, snap)))
            .unwrap();

        let samples = samples.lock();
        let (phase, last) = samples.last().copied().unwrap();
        assert_eq!(phase, Phase::Extracting);
        assert_eq!(last.success_count, 1);
    }

    #[test]
    fn test_dry_run_skips_extraction() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.zip"), b"x").unwrap();

        let mut cfg = config(dir.path());
        cfg.dry_run = true;
        let result = RunCoordinator::new(cfg, Arc::new(AlwaysOk)).run().unwrap();

        assert!(result.completed);
        assert!(result.dry_run);
        assert_eq!(result.stats.total_archives, 1);
        assert_eq!(result.stats.extracted(), 0);
    }

    /// Raises the shutdown flag on its first call, then works slowly
    #[derive(Default)]
    struct StopsRunOnFirstCall {
        shutdown: Mutex<Option<Arc<AtomicBool>>>,
        cancel_calls: AtomicU8,
    }

    impl Extractor for StopsRunOnFirstCall {
        fn extract(&self, _archive: &Path, _dest: &Path) -> ExtractionOutcome {
            if let Some(flag) = self.shutdown.lock().as_ref() {
                flag.store(true, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_millis(300));
            ExtractionOutcome::Success
        }

        fn cancel_all(&self) {
            self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_shutdown_during_extraction_discards_queue() {
        let dir = tempdir().unwrap();
        for i in 0..20 {
            std::fs::write(dir.path().join(format!("a{}.zip", i)), b"x").unwrap();
        }

        let extractor = Arc::new(StopsRunOnFirstCall::default());
        let coordinator = RunCoordinator::new(config(dir.path()), extractor.clone());
        *extractor.shutdown.lock() = Some(coordinator.shutdown_flag());

        let result = coordinator.run().unwrap();
        let stats = result.stats;

        assert!(!result.completed);
        assert_eq!(stats.total_archives, 20);
        assert!(result.not_attempted > 0);
        assert_eq!(
            stats.success_count + stats.fail_count + result.not_attempted,
            stats.total_archives
        );
        assert!(extractor.cancel_calls.load(Ordering::SeqCst) >= 1);

        let live = coordinator.counters().snapshot(Duration::ZERO);
        assert_eq!(live.success_count, stats.success_count);
    }

    #[test]
    fn test_shutdown_before_run_reports_interrupted() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.zip"), b"x").unwrap();

        let coordinator = RunCoordinator::new(config(dir.path()), Arc::new(AlwaysOk));
        coordinator.shutdown_flag().store(true, Ordering::SeqCst);
        let result = coordinator.run().unwrap();

        assert!(!result.completed);
        assert_eq!(result.stats.extracted(), 0);
    }
}
