//! Concurrent archive discovery
//!
//! Breadth-first listing of the directory tree on a [`WorkerPool`]. Each task
//! lists one directory, records matching archive files in the shared
//! collection and submits every not-yet-visited subdirectory as a new task.
//! Directories that cannot be listed are logged and treated as empty.

use crate::config::WalkConfig;
use crate::error::Result;
use crate::stats::RunCounters;
use crate::walker::pool::{PoolHandle, WorkerPool};
use crate::walker::queue::{DirTask, VisitedSet};
use parking_lot::Mutex;
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// An archive found during the walk
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveRecord {
    /// Absolute path of the archive file
    pub path: PathBuf,

    /// Extraction destination (the containing directory)
    pub dest: PathBuf,

    /// File size in bytes
    pub size: u64,
}

impl ArchiveRecord {
    pub fn new(path: PathBuf, size: u64) -> Self {
        let dest = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self { path, dest, size }
    }

    /// File name for display
    pub fn file_name(&self) -> Cow<'_, str> {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| self.path.to_string_lossy())
    }
}

/// Outcome of listing a single directory
#[derive(Debug)]
pub enum ScanOutcome {
    /// Directory listed
    Listed {
        archives: usize,
        subdirs: usize,
    },

    /// Directory could not be listed; contributes nothing
    Unreadable { reason: String },

    /// Pool was cancelled while children were being queued
    Cancelled,
}

/// State shared by every scan task
struct ScanContext {
    config: Arc<WalkConfig>,
    counters: Arc<RunCounters>,
    visited: VisitedSet,
    archives: Mutex<Vec<ArchiveRecord>>,
}

/// Parallel directory walker collecting archive files
pub struct TreeWalker {
    context: Arc<ScanContext>,
}

impl TreeWalker {
    /// Create a walker for `config.root`
    pub fn new(config: Arc<WalkConfig>, counters: Arc<RunCounters>) -> Self {
        Self {
            context: Arc::new(ScanContext {
                config,
                counters,
                visited: VisitedSet::new(),
                archives: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Spawn the scan pool and seed it with the root directory.
    ///
    /// The returned pool is running; wait on it (or cancel it) and then
    /// hand it to [`finish`](Self::finish).
    pub fn start(&self) -> Result<WorkerPool<DirTask>> {
        let ctx = Arc::clone(&self.context);
        let root = ctx.config.root.clone();

        info!(
            root = %root.display(),
            workers = ctx.config.worker_count,
            "Starting archive scan"
        );

        let pool = WorkerPool::new("scan", ctx.config.worker_count, {
            let ctx = Arc::clone(&ctx);
            move |task: DirTask, handle: &PoolHandle<DirTask>| process_task(&ctx, task, handle)
        })?;

        ctx.visited.insert(&root);
        ctx.counters.record_folder_queued();
        pool.submit(DirTask::root(root))?;

        Ok(pool)
    }

    /// Join the scan pool and take the discovered archives, sorted by path
    pub fn finish(&self, pool: WorkerPool<DirTask>) -> Result<Vec<ArchiveRecord>> {
        pool.wait();
        pool.shutdown()?;

        let mut archives = std::mem::take(&mut *self.context.archives.lock());
        archives.sort_by(|a, b| a.path.cmp(&b.path));

        info!(
            directories = self.context.visited.len(),
            archives = archives.len(),
            "Archive scan finished"
        );
        Ok(archives)
    }

    /// Scan the whole tree and return every archive found
    pub fn run(&self) -> Result<Vec<ArchiveRecord>> {
        let pool = self.start()?;
        self.finish(pool)
    }

    /// Distinct directories enqueued so far
    pub fn directories_seen(&self) -> usize {
        self.context.visited.len()
    }
}

fn process_task(ctx: &ScanContext, task: DirTask, handle: &PoolHandle<DirTask>) {
    let outcome = scan_directory(ctx, &task, handle);
    ctx.counters.record_folder_processed();

    match &outcome {
        ScanOutcome::Listed { archives, subdirs } => {
            trace!(
                path = %task.path.display(),
                depth = task.depth,
                archives = archives,
                subdirs = subdirs,
                "Directory listed"
            );
        }
        ScanOutcome::Unreadable { reason } => {
            ctx.counters.record_folder_unreadable();
            warn!(path = %task.path.display(), reason = %reason, "Cannot list directory, skipping");
        }
        ScanOutcome::Cancelled => {
            debug!(path = %task.path.display(), "Scan cancelled mid-directory");
        }
    }
}

/// List one directory: record archives, queue unseen subdirectories
fn scan_directory(ctx: &ScanContext, task: &DirTask, handle: &PoolHandle<DirTask>) -> ScanOutcome {
    let entries = match fs::read_dir(&task.path) {
        Ok(entries) => entries,
        Err(e) => {
            return ScanOutcome::Unreadable {
                reason: e.to_string(),
            }
        }
    };

    let mut archives = 0;
    let mut subdirs = 0;

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!(path = %task.path.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(e) => {
                debug!(path = %entry.path().display(), error = %e, "Cannot stat entry");
                continue;
            }
        };
        let path = entry.path();

        // Symlinked directories are followed; the visited set breaks cycles.
        let is_dir = file_type.is_dir() || (file_type.is_symlink() && path.is_dir());

        if is_dir {
            if ctx.config.is_excluded(&path) {
                debug!(path = %path.display(), "Directory excluded");
                continue;
            }
            if !ctx.visited.insert(&path) {
                trace!(path = %path.display(), "Directory already visited");
                continue;
            }

            ctx.counters.record_folder_queued();
            if handle.submit(task.child(path)).is_err() {
                return ScanOutcome::Cancelled;
            }
            subdirs += 1;
        } else if file_type.is_file() && ctx.config.is_archive(&path) {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            ctx.archives.lock().push(ArchiveRecord::new(path, size));
            ctx.counters.record_archive(size);
            archives += 1;
        }
    }

    ScanOutcome::Listed { archives, subdirs }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"archive").unwrap();
    }

    fn walker(root: &Path, workers: usize) -> (TreeWalker, Arc<RunCounters>) {
        let config = Arc::new(WalkConfig::new(root.canonicalize().unwrap(), workers));
        let counters = Arc::new(RunCounters::default());
        (TreeWalker::new(config, Arc::clone(&counters)), counters)
    }

    #[test]
    fn test_archive_record_dest_is_parent() {
        let record = ArchiveRecord::new(PathBuf::from("/data/sub/a.zip"), 10);
        assert_eq!(record.dest, PathBuf::from("/data/sub"));
        assert_eq!(record.file_name(), "a.zip");
    }

    #[test]
    fn test_finds_nested_archives() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("a.zip"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("sub/b.RAR"));
        touch(&dir.path().join("sub/deep/c.7z"));
        touch(&dir.path().join("sub/deep/d.tar.gz"));
        fs::create_dir_all(dir.path().join("empty/nested")).unwrap();

        let (walker, counters) = walker(dir.path(), 4);
        let archives = walker.run().unwrap();

        let names: Vec<_> = archives.iter().map(|a| a.file_name().into_owned()).collect();
        assert_eq!(names, vec!["a.zip", "b.RAR", "c.7z", "d.tar.gz"]);

        let snap = counters.snapshot(Default::default());
        assert_eq!(snap.total_archives, 4);
        assert_eq!(snap.archive_bytes, 4 * 7);
        // root, sub, sub/deep, empty, empty/nested
        assert_eq!(snap.total_folders, 5);
        assert_eq!(snap.processed_folders, 5);
        assert_eq!(walker.directories_seen(), 5);
    }

    #[test]
    fn test_excluded_directories_are_skipped() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("keep/a.zip"));
        touch(&dir.path().join(".git/objects/b.zip"));

        let mut config = WalkConfig::new(dir.path().canonicalize().unwrap(), 2);
        config.exclude_patterns = vec![regex::Regex::new(r"/\.git$").unwrap()];
        let walker = TreeWalker::new(Arc::new(config), Arc::new(RunCounters::default()));

        let archives = walker.run().unwrap();
        assert_eq!(archives.len(), 1);
        assert!(archives[0].path.ends_with("keep/a.zip"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_cycle_listed_once() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("sub/a.zip"));
        std::os::unix::fs::symlink(dir.path(), dir.path().join("sub/back-to-root")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("sub"), dir.path().join("alias")).unwrap();

        let (walker, counters) = walker(dir.path(), 3);
        let archives = walker.run().unwrap();

        assert_eq!(archives.len(), 1);
        assert_eq!(counters.processed_folders.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_unlistable_directory_contributes_nothing() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("sibling/a.zip"));
        touch(&dir.path().join("gone/b.zip"));
        // A regular file fails read_dir (ENOTDIR) even for privileged users
        touch(&dir.path().join("not-a-dir.zip"));

        let (walker, counters) = walker(dir.path(), 2);
        let ctx = Arc::clone(&walker.context);
        let pool = WorkerPool::new("scan", 2, {
            let ctx = Arc::clone(&ctx);
            move |task: DirTask, handle: &PoolHandle<DirTask>| process_task(&ctx, task, handle)
        })
        .unwrap();

        let root = dir.path().canonicalize().unwrap();
        let gone = root.join("gone");
        fs::remove_dir_all(&gone).unwrap();
        for task in [
            DirTask::new(root.join("sibling"), 1),
            DirTask::new(root.join("not-a-dir.zip"), 1),
            DirTask::new(gone, 1),
        ] {
            ctx.visited.insert(&task.path);
            counters.record_folder_queued();
            pool.submit(task).unwrap();
        }

        let archives = walker.finish(pool).unwrap();
        assert_eq!(archives.len(), 1);
        assert!(archives[0].path.ends_with("sibling/a.zip"));

        let snap = counters.snapshot(Default::default());
        assert_eq!(snap.unreadable_folders, 2);
        assert_eq!(snap.total_archives, 1);
        assert_eq!(snap.processed_folders, snap.total_folders);
        assert_eq!(snap.total_folders, 3);
    }

    #[test]
    fn test_empty_root() {
        let dir = tempdir().unwrap();
        let (walker, counters) = walker(dir.path(), 2);
        assert!(walker.run().unwrap().is_empty());
        assert_eq!(counters.processed_folders.load(Ordering::Relaxed), 1);
    }
}
