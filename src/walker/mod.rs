//! Parallel archive discovery
//!
//! The scan is a breadth-first walk driven by a pool of worker threads.
//! Each worker lists one directory, records the archives it finds and
//! queues every subdirectory back onto the same pool.
//!
//! # Architecture
//!
//! ```text
//!                     ┌─────────────────────────┐
//!                     │     RunCoordinator      │
//!                     │  - waits on the pool    │
//!                     │  - samples progress     │
//!                     └───────────┬─────────────┘
//!                                 │
//!       ┌─────────────────────────┼─────────────────────────┐
//!       │                         │                         │
//! ┌─────▼─────┐             ┌─────▼─────┐             ┌─────▼─────┐
//! │  Worker 1 │             │  Worker 2 │             │  Worker N │
//! │  read_dir │             │  read_dir │             │  read_dir │
//! └─────┬─────┘             └─────┬─────┘             └─────┬─────┘
//!       │                         │                         │
//!       └──────── subdirectories back onto the queue ───────┘
//! ```

pub mod coordinator;
pub mod pool;
pub mod queue;
pub mod scanner;

pub use coordinator::{Phase, RunCoordinator, RunResult, PROGRESS_INTERVAL};
pub use pool::{PoolHandle, WorkerPool};
pub use queue::{DirTask, VisitedSet};
pub use scanner::{ArchiveRecord, ScanOutcome, TreeWalker};
