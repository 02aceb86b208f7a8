//! Extraction phase
//!
//! The complete archive list is queued up front and drained by a
//! [`WorkerPool`]. Workers pull the next archive as soon as they are free,
//! so one slow archive never holds back the rest. Each archive is extracted
//! exactly once; failures are counted and logged, never retried.

use crate::error::Result;
use crate::extract::tool::{ExtractionOutcome, Extractor};
use crate::stats::RunCounters;
use crate::walker::pool::{PoolHandle, WorkerPool};
use crate::walker::scanner::ArchiveRecord;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// An archive that did not extract cleanly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedArchive {
    pub path: PathBuf,
    pub reason: String,
}

/// Totals for one extraction phase
#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    /// Archives extracted successfully
    pub succeeded: u64,

    /// Archives that failed, in completion order
    pub failed: Vec<FailedArchive>,

    /// Archives never attempted (run cancelled)
    pub not_attempted: u64,
}

struct ExtractContext {
    extractor: Arc<dyn Extractor>,
    counters: Arc<RunCounters>,
    succeeded: AtomicU64,
    failed: Mutex<Vec<FailedArchive>>,
}

/// Drives extraction of a discovered archive set
pub struct ExtractionScheduler {
    context: Arc<ExtractContext>,
    worker_count: usize,
}

impl ExtractionScheduler {
    pub fn new(extractor: Arc<dyn Extractor>, counters: Arc<RunCounters>, worker_count: usize) -> Self {
        Self {
            context: Arc::new(ExtractContext {
                extractor,
                counters,
                succeeded: AtomicU64::new(0),
                failed: Mutex::new(Vec::new()),
            }),
            worker_count,
        }
    }

    /// Spawn the extraction pool and queue every archive
    pub fn start(&self, archives: Vec<ArchiveRecord>) -> Result<WorkerPool<ArchiveRecord>> {
        info!(
            archives = archives.len(),
            workers = self.worker_count,
            "Starting extraction"
        );

        let ctx = Arc::clone(&self.context);
        let pool = WorkerPool::new(
            "extract",
            self.worker_count,
            move |record: ArchiveRecord, _: &PoolHandle<ArchiveRecord>| extract_one(&ctx, &record),
        )?;

        for record in archives {
            pool.submit(record)?;
        }
        Ok(pool)
    }

    /// Join the pool and report
    pub fn finish(&self, pool: WorkerPool<ArchiveRecord>) -> Result<ExtractionReport> {
        pool.wait();
        let not_attempted = pool.discarded();
        pool.shutdown()?;

        let report = ExtractionReport {
            succeeded: self.context.succeeded.load(Ordering::Relaxed),
            failed: std::mem::take(&mut *self.context.failed.lock()),
            not_attempted,
        };

        info!(
            succeeded = report.succeeded,
            failed = report.failed.len(),
            not_attempted = report.not_attempted,
            "Extraction finished"
        );
        Ok(report)
    }

    /// Extract every archive and wait for all of them
    pub fn run(&self, archives: Vec<ArchiveRecord>) -> Result<ExtractionReport> {
        let pool = self.start(archives)?;
        self.finish(pool)
    }
}

fn extract_one(ctx: &ExtractContext, record: &ArchiveRecord) {
    let outcome = ctx.extractor.extract(&record.path, &record.dest);

    match &outcome {
        ExtractionOutcome::Success => {
            ctx.counters.record_success();
            ctx.succeeded.fetch_add(1, Ordering::Relaxed);
            info!(archive = %record.path.display(), "Extracted");
            return;
        }
        ExtractionOutcome::ToolFailure { code, detail, .. } => {
            warn!(
                archive = %record.path.display(),
                code = ?code,
                reason = %outcome.reason().unwrap_or_default(),
                detail = detail.as_deref().unwrap_or(""),
                "Extraction failed"
            );
        }
        ExtractionOutcome::LaunchFailure { error } => {
            error!(archive = %record.path.display(), error = %error, "Extraction tool did not start");
        }
    }

    ctx.counters.record_failure();
    ctx.failed.lock().push(FailedArchive {
        path: record.path.clone(),
        reason: outcome.reason().unwrap_or_default(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::tool::ExitClass;
    use std::collections::HashMap;
    use std::path::Path;

    /// Fails archives whose name contains "bad", counts calls per path
    #[derive(Default)]
    struct ScriptedExtractor {
        calls: Mutex<HashMap<PathBuf, usize>>,
    }

    impl Extractor for ScriptedExtractor {
        fn extract(&self, archive: &Path, _dest: &Path) -> ExtractionOutcome {
            *self.calls.lock().entry(archive.to_path_buf()).or_default() += 1;
            if archive.to_string_lossy().contains("bad") {
                ExtractionOutcome::ToolFailure {
                    code: Some(2),
                    class: ExitClass::Fatal,
                    detail: None,
                }
            } else {
                ExtractionOutcome::Success
            }
        }
    }

    fn records(names: &[&str]) -> Vec<ArchiveRecord> {
        names
            .iter()
            .map(|n| ArchiveRecord::new(PathBuf::from(format!("/data/{}", n)), 1))
            .collect()
    }

    #[test]
    fn test_every_archive_extracted_once() {
        let extractor = Arc::new(ScriptedExtractor::default());
        let counters = Arc::new(RunCounters::default());
        let scheduler = ExtractionScheduler::new(extractor.clone(), Arc::clone(&counters), 4);

        let names: Vec<String> = (0..50).map(|i| format!("a{}.zip", i)).collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let report = scheduler.run(records(&names)).unwrap();

        assert_eq!(report.succeeded, 50);
        assert!(report.failed.is_empty());
        let calls = extractor.calls.lock();
        assert_eq!(calls.len(), 50);
        assert!(calls.values().all(|&n| n == 1));
        assert_eq!(counters.snapshot(Default::default()).success_count, 50);
    }

    #[test]
    fn test_failure_does_not_stop_others() {
        let extractor = Arc::new(ScriptedExtractor::default());
        let counters = Arc::new(RunCounters::default());
        let scheduler = ExtractionScheduler::new(extractor, Arc::clone(&counters), 2);

        let report = scheduler
            .run(records(&["a.zip", "bad.rar", "c.7z", "d.tar"]))
            .unwrap();

        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].path, PathBuf::from("/data/bad.rar"));
        assert_eq!(report.failed[0].reason, "Fatal error occurred (exit code 2)");

        let snap = counters.snapshot(Default::default());
        assert_eq!(snap.success_count, 3);
        assert_eq!(snap.fail_count, 1);
    }

    #[test]
    fn test_empty_archive_list() {
        let scheduler = ExtractionScheduler::new(
            Arc::new(ScriptedExtractor::default()),
            Arc::new(RunCounters::default()),
            2,
        );
        let report = scheduler.run(Vec::new()).unwrap();
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.not_attempted, 0);
    }
}
