//! Error types for archive-walker
//!
//! This module defines the error hierarchy for:
//! - Configuration and CLI errors
//! - The external extraction tool (resolution and launch)
//! - Worker pool / thread errors
//!
//! Per-item failures (one unreadable directory, one archive the tool
//! rejects) are not errors at this level. They are reported as values
//! (`ExtractionOutcome`, logged warnings) so they never abort a run.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the archive-walker application
#[derive(Error, Debug)]
pub enum WalkerError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Extraction tool errors
    #[error("Extractor error: {0}")]
    Extractor(#[from] ExtractorError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// Interrupted by signal
    #[error("Operation interrupted by signal")]
    Interrupted,
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Root path missing or not a directory
    #[error("Invalid root directory '{path}': {reason}")]
    InvalidRoot { path: PathBuf, reason: String },

    /// Invalid exclude pattern
    #[error("Invalid exclude pattern '{pattern}': {reason}")]
    InvalidExcludePattern { pattern: String, reason: String },

    /// Extension list unusable
    #[error("Invalid archive extension '{ext}': {reason}")]
    InvalidExtension { ext: String, reason: String },

    /// Log file cannot be created
    #[error("Invalid log file '{path}': {reason}")]
    InvalidLogFile { path: PathBuf, reason: String },
}

/// External extraction tool errors
#[derive(Error, Debug, Clone)]
pub enum ExtractorError {
    /// The tool is not resolvable on PATH
    #[error("Extraction tool '{tool}' not found on PATH: {reason}")]
    ToolNotFound { tool: String, reason: String },

    /// The OS refused to start the tool
    #[error("Failed to launch extraction tool for '{archive}': {reason}")]
    Spawn { archive: PathBuf, reason: String },
}

/// Worker pool errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Thread could not be spawned
    #[error("Failed to spawn worker {id}: {reason}")]
    SpawnFailed { id: usize, reason: String },

    /// Worker panicked
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Pool is shut down and no longer accepts work
    #[error("Failed to submit task: pool is closed")]
    PoolClosed,
}

/// Result type alias for WalkerError
pub type Result<T> = std::result::Result<T, WalkerError>;
