//! archive-walker - Recursive Archive Discovery and Extraction
//!
//! Walks a directory tree, finds every archive by extension and extracts
//! each one in place (into the folder that contains it) with an external
//! 7-Zip compatible tool. Built for large shares with many thousands of
//! folders.
//!
//! # Features
//!
//! - **Parallel Scanning**: A pool of worker threads lists directories
//!   concurrently. Symlinked directories are followed, cycles are not.
//!
//! - **Two Phases**: Extraction starts only after the scan has finished,
//!   so the archive set is fixed and progress has a real denominator.
//!
//! - **Bounded Extraction**: At most one tool process per worker, each
//!   archive attempted exactly once. A failure never stops the run.
//!
//! - **Log File**: Every run appends a timestamped log of each extraction
//!   and every unreadable folder.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Root folder                             │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ read_dir
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   Phase 1: TreeWalker                            │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐         ┌─────────┐     │
//! │  │Worker 1 │  │Worker 2 │  │Worker 3 │  ...    │Worker N │     │
//! │  └────┬────┘  └────┬────┘  └────┬────┘         └────┬────┘     │
//! │       └────────────┴─────┬──────┴───────────────────┘          │
//! │                          ▼                                      │
//! │                 archive list (sorted)                           │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ scan pool drained
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                Phase 2: ExtractionScheduler                      │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐         ┌─────────┐     │
//! │  │  7z x   │  │  7z x   │  │  7z x   │  ...    │  7z x   │     │
//! │  └─────────┘  └─────────┘  └─────────┘         └─────────┘     │
//! └─────────────────────────────────────────────────────────────────┘
//!          │                                          │
//!          ▼                                          ▼
//!   RunCounters ──► progress bars             archive-walker-*.log
//! ```
//!
//! # Example
//!
//! ```bash
//! # Extract everything under a share
//! archive-walker /mnt/share
//!
//! # List what would be extracted, skipping backup folders
//! archive-walker /mnt/share --dry-run --exclude '/backup/'
//!
//! # One archive at a time
//! archive-walker /mnt/share --sequential
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod logging;
pub mod progress;
pub mod stats;
pub mod walker;

pub use config::{CliArgs, WalkConfig};
pub use error::{Result, WalkerError};
pub use extract::{ExtractionOutcome, Extractor, SevenZip};
pub use stats::{ProgressSnapshot, RunCounters};
pub use walker::{Phase, RunCoordinator, RunResult};
