//! Shared run counters
//!
//! Every counter is an independent atomic. Readers take a
//! [`ProgressSnapshot`] that may be momentarily stale across counters;
//! nothing here relies on a single atomic view of all of them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters shared by every worker for the lifetime of one run
#[derive(Debug, Default)]
pub struct RunCounters {
    /// Directories enqueued for listing (root included)
    pub total_folders: AtomicU64,

    /// Directories whose listing finished (successfully or not)
    pub processed_folders: AtomicU64,

    /// Directories that could not be listed
    pub unreadable_folders: AtomicU64,

    /// Archives discovered
    pub total_archives: AtomicU64,

    /// Sum of discovered archive sizes
    pub archive_bytes: AtomicU64,

    /// Archives extracted successfully
    pub success_count: AtomicU64,

    /// Archives that failed to extract
    pub fail_count: AtomicU64,
}

impl RunCounters {
    pub fn record_folder_queued(&self) {
        self.total_folders.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_folder_processed(&self) {
        self.processed_folders.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_folder_unreadable(&self) {
        self.unreadable_folders.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_archive(&self, size: u64) {
        self.total_archives.fetch_add(1, Ordering::Relaxed);
        self.archive_bytes.fetch_add(size, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.fail_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Read every counter once
    pub fn snapshot(&self, elapsed: Duration) -> ProgressSnapshot {
        ProgressSnapshot {
            total_folders: self.total_folders.load(Ordering::Relaxed),
            processed_folders: self.processed_folders.load(Ordering::Relaxed),
            unreadable_folders: self.unreadable_folders.load(Ordering::Relaxed),
            total_archives: self.total_archives.load(Ordering::Relaxed),
            archive_bytes: self.archive_bytes.load(Ordering::Relaxed),
            success_count: self.success_count.load(Ordering::Relaxed),
            fail_count: self.fail_count.load(Ordering::Relaxed),
            elapsed,
        }
    }
}

/// Point-in-time copy of [`RunCounters`] for display
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total_folders: u64,
    pub processed_folders: u64,
    pub unreadable_folders: u64,
    pub total_archives: u64,
    pub archive_bytes: u64,
    pub success_count: u64,
    pub fail_count: u64,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// Archives that have an outcome
    pub fn extracted(&self) -> u64 {
        self.success_count + self.fail_count
    }

    /// Scan phase completion, 0.0..=100.0
    pub fn scan_percent(&self) -> f64 {
        percent(self.processed_folders, self.total_folders)
    }

    /// Extraction phase completion, 0.0..=100.0
    pub fn extract_percent(&self) -> f64 {
        percent(self.extracted(), self.total_archives)
    }

    /// Directories listed per second
    pub fn folders_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.processed_folders as f64 / secs
        } else {
            0.0
        }
    }
}

// Counters are read independently, so `done` may briefly exceed `total`.
fn percent(done: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (done as f64 / total as f64 * 100.0).min(100.0)
}
