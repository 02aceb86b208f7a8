//! Logging setup
//!
//! Every run writes an append-only log file with one timestamped, leveled
//! line per event. Workers log concurrently; the file writer is a mutex, so
//! each event is written whole. A second, quieter layer goes to stderr;
//! while progress bars are drawn it only passes errors, since anything
//! printed under a live bar tears it.

use crate::error::ConfigError;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Subscriber;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Open (append) the log file and install the global subscriber.
///
/// Returns the absolute log file path for display.
pub fn init(path: &Path, verbose: bool, progress: bool) -> Result<PathBuf, ConfigError> {
    let file = open_log_file(path)?;

    subscriber(file, verbose, Some(console_directive(verbose, progress)))
        .try_init()
        .map_err(|e| ConfigError::InvalidLogFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    Ok(std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()))
}

/// Create or append to the log file
pub fn open_log_file(path: &Path) -> Result<File, ConfigError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ConfigError::InvalidLogFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Filter for the stderr layer
pub fn console_directive(verbose: bool, progress: bool) -> &'static str {
    match (progress, verbose) {
        (true, _) => "error",
        (false, true) => "archive_walker=debug,warn",
        (false, false) => "warn",
    }
}

/// Build the subscriber: file layer always, stderr layer when a console
/// directive is given
pub fn subscriber(
    file: File,
    verbose: bool,
    console: Option<&str>,
) -> impl Subscriber + Send + Sync + 'static {
    let file_filter = if verbose {
        EnvFilter::new("archive_walker=debug,warn")
    } else {
        EnvFilter::new("archive_walker=info,warn")
    };

    let file_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .with_thread_names(true)
        .with_filter(file_filter);

    let console_layer = console.map(|directive| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .with_filter(EnvFilter::new(directive))
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
}
