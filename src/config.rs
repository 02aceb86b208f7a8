//! Configuration types for archive-walker
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - Worker count derivation from detected parallelism

use crate::error::ConfigError;
use chrono::Local;
use clap::Parser;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Maximum accepted worker count
pub const MAX_WORKERS: usize = 64;

/// Default pool size bounds
const MIN_DEFAULT_WORKERS: usize = 2;
const MAX_DEFAULT_WORKERS: usize = 16;

/// Extensions recognized when `--ext` is not given
pub const DEFAULT_EXTENSIONS: &[&str] = &["zip", "rar", "7z", "tar", "gz", "bz2"];

/// Extraction tool looked up on PATH by default
pub const DEFAULT_TOOL: &str = "7z";

/// Recursively find archives under a directory and extract each in place
#[derive(Parser, Debug, Clone)]
#[command(
    name = "archive-walker",
    version,
    about = "Recursively find archives and extract each one in place",
    long_about = "Walks a directory tree in parallel, collects every archive \
                  (zip, rar, 7z, tar, gz, bz2) and extracts each one into its \
                  own directory using an external 7-Zip binary.\n\n\
                  Discovery finishes before extraction starts, so progress \
                  percentages are exact.",
    after_help = "EXAMPLES:\n    \
        archive-walker ~/Downloads\n    \
        archive-walker /data/dumps -w 4 --log-file dumps.log\n    \
        archive-walker /data --exclude '\\.git$' --dry-run\n    \
        archive-walker /data --tool 7za --ext zip --ext 7z"
)]
pub struct CliArgs {
    /// Directory to scan for archives
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,

    /// Number of worker threads (directory listing and extraction)
    #[arg(short = 'w', long, default_value_t = default_workers(), value_name = "NUM")]
    pub workers: usize,

    /// Run with a single worker
    #[arg(long, conflicts_with = "workers")]
    pub sequential: bool,

    /// Extraction tool to resolve on PATH
    #[arg(long, default_value = DEFAULT_TOOL, value_name = "NAME")]
    pub tool: String,

    /// Archive extension to look for (can be repeated; replaces the defaults)
    #[arg(long = "ext", value_name = "EXT", action = clap::ArgAction::Append)]
    pub extensions: Vec<String>,

    /// Skip directories whose path matches pattern (can be repeated)
    #[arg(long = "exclude", value_name = "PATTERN", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// Log file for this run
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Only discover archives, do not extract
    #[arg(long)]
    pub dry_run: bool,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Pool size derived from detected parallelism: 75% of logical cores,
/// clamped to 2..=16
pub fn default_workers() -> usize {
    workers_for_cores(num_cpus::get())
}

fn workers_for_cores(cores: usize) -> usize {
    (cores * 3 / 4).clamp(MIN_DEFAULT_WORKERS, MAX_DEFAULT_WORKERS)
}

/// Timestamped log file name in the current directory
pub fn default_log_path() -> PathBuf {
    PathBuf::from(format!(
        "archive-walker-{}.log",
        Local::now().format("%Y%m%d-%H%M%S")
    ))
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct WalkConfig {
    /// Canonical root directory
    pub root: PathBuf,

    /// Number of worker threads
    pub worker_count: usize,

    /// Extraction tool name (resolved later)
    pub tool: String,

    /// Lower-case extensions without the leading dot
    pub extensions: Vec<String>,

    /// Compiled exclude patterns
    pub exclude_patterns: Vec<Regex>,

    /// Log file path
    pub log_path: PathBuf,

    /// Discover only
    pub dry_run: bool,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl WalkConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let root = validate_root(&args.root)?;

        let worker_count = if args.sequential { 1 } else { args.workers };
        if worker_count == 0 || worker_count > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: worker_count,
                max: MAX_WORKERS,
            });
        }

        let extensions = if args.extensions.is_empty() {
            DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
        } else {
            args.extensions
                .iter()
                .map(|e| normalize_extension(e))
                .collect::<Result<Vec<_>, _>>()?
        };

        let exclude_patterns = args
            .exclude_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ConfigError::InvalidExcludePattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let log_path = args.log_file.unwrap_or_else(default_log_path);
        if let Some(parent) = log_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(ConfigError::InvalidLogFile {
                    path: log_path.clone(),
                    reason: format!("Parent directory '{}' does not exist", parent.display()),
                });
            }
        }

        Ok(Self {
            root,
            worker_count,
            tool: args.tool,
            extensions,
            exclude_patterns,
            log_path,
            dry_run: args.dry_run,
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }

    /// Minimal configuration for library use: defaults everywhere
    pub fn new(root: impl Into<PathBuf>, worker_count: usize) -> Self {
        Self {
            root: root.into(),
            worker_count: worker_count.max(1),
            tool: DEFAULT_TOOL.to_string(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            exclude_patterns: Vec::new(),
            log_path: default_log_path(),
            dry_run: false,
            show_progress: false,
            verbose: false,
        }
    }

    /// Check if a directory should be skipped
    pub fn is_excluded(&self, path: &Path) -> bool {
        if self.exclude_patterns.is_empty() {
            return false;
        }
        let path = path.to_string_lossy();
        self.exclude_patterns.iter().any(|re| re.is_match(&path))
    }

    /// Case-insensitive extension match against the configured set
    pub fn is_archive(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.extensions.iter().any(|known| known.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }
}

fn validate_root(path: &Path) -> Result<PathBuf, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidRoot {
        path: path.to_path_buf(),
        reason,
    };

    let canonical = path.canonicalize().map_err(|e| invalid(e.to_string()))?;
    if !canonical.is_dir() {
        return Err(invalid("not a directory".into()));
    }
    Ok(canonical)
}

fn normalize_extension(raw: &str) -> Result<String, ConfigError> {
    let ext = raw.trim().trim_start_matches('.').to_ascii_lowercase();
    if ext.is_empty() || ext.contains(['/', '\\', '.']) {
        return Err(ConfigError::InvalidExtension {
            ext: raw.to_string(),
            reason: "expected a single extension such as 'zip'".into(),
        });
    }
    Ok(ext)
}
