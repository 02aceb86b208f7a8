//! Progress reporting for the archive walker
//!
//! Provides real-time progress display using indicatif progress bars: one
//! bar for the scan, a second one added when extraction starts.

use crate::stats::ProgressSnapshot;
use crate::walker::{Phase, RunResult};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use std::path::Path;
use std::time::Duration;

/// Failed archives listed in the summary before eliding the rest
const MAX_LISTED_FAILURES: usize = 10;

/// Progress reporter that displays run status
pub struct ProgressReporter {
    multi: MultiProgress,

    /// Scan phase bar
    scan: ProgressBar,

    /// Extraction phase bar, created when the phase starts
    extract: Mutex<Option<ProgressBar>>,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let multi = MultiProgress::new();
        let scan = multi.add(ProgressBar::new(0));
        scan.set_style(bar_style("cyan/blue"));
        scan.set_prefix("Scanning  ");
        scan.enable_steady_tick(Duration::from_millis(100));

        Self {
            multi,
            scan,
            extract: Mutex::new(None),
        }
    }

    /// Update the display from a counter sample
    pub fn update(&self, phase: Phase, progress: &ProgressSnapshot) {
        match phase {
            Phase::Scanning => {
                self.scan.set_length(progress.total_folders);
                self.scan.set_position(progress.processed_folders);
                self.scan.set_message(scan_message(progress));
            }
            Phase::Extracting => {
                if !self.scan.is_finished() {
                    self.scan.set_length(progress.total_folders);
                    self.scan.set_position(progress.processed_folders);
                    self.scan.finish_with_message(scan_message(progress));
                }

                let mut extract = self.extract.lock();
                let bar = extract.get_or_insert_with(|| {
                    let bar = self.multi.add(ProgressBar::new(progress.total_archives));
                    bar.set_style(bar_style("green/white"));
                    bar.set_prefix("Extracting");
                    bar.enable_steady_tick(Duration::from_millis(100));
                    bar
                });
                bar.set_length(progress.total_archives);
                bar.set_position(progress.extracted());
                bar.set_message(extract_message(progress));
            }
        }
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        if !self.scan.is_finished() {
            self.scan.finish_with_message(message.to_string());
        }
        if let Some(bar) = self.extract.lock().as_ref() {
            bar.finish_with_message(message.to_string());
        }
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.scan.finish_and_clear();
        if let Some(bar) = self.extract.lock().as_ref() {
            bar.finish_and_clear();
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn bar_style(colors: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(&format!(
            "{{spinner:.green}} {{prefix}} [{{elapsed_precise}}] [{{bar:30.{}}}] {{msg}}",
            colors
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

fn scan_message(progress: &ProgressSnapshot) -> String {
    format!(
        "{:>5.1}% | Folders: {}/{} | Archives: {} | Rate: {:.0}/s",
        progress.scan_percent(),
        format_number(progress.processed_folders),
        format_number(progress.total_folders),
        format_number(progress.total_archives),
        progress.folders_per_second(),
    )
}

fn extract_message(progress: &ProgressSnapshot) -> String {
    format!(
        "{:>5.1}% | {}/{} | OK: {} | Failed: {}",
        progress.extract_percent(),
        format_number(progress.extracted()),
        format_number(progress.total_archives),
        format_number(progress.success_count),
        format_number(progress.fail_count),
    )
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of the run
pub fn print_summary(result: &RunResult, log_path: &Path) {
    let stats = &result.stats;
    let duration_secs = result.duration.as_secs_f64();

    println!();
    let title = if !result.completed {
        style("Run Interrupted").yellow().bold()
    } else if result.dry_run {
        style("Scan Complete (dry run)").green().bold()
    } else {
        style("Extraction Complete").green().bold()
    };
    println!("{}", title);
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style("Folders:").bold(),
        format_number(stats.processed_folders)
    );
    if stats.unreadable_folders > 0 {
        println!(
            "  {} {}",
            style("Unreadable:").yellow().bold(),
            format_number(stats.unreadable_folders)
        );
    }
    println!(
        "  {} {} ({})",
        style("Archives:").bold(),
        format_number(stats.total_archives),
        format_size(stats.archive_bytes, BINARY)
    );

    if !result.dry_run {
        println!(
            "  {} {}",
            style("Extracted:").green().bold(),
            format_number(stats.success_count)
        );
        if stats.fail_count > 0 {
            println!(
                "  {} {}",
                style("Failed:").red().bold(),
                format_number(stats.fail_count)
            );
        }
        if result.not_attempted > 0 {
            println!(
                "  {} {}",
                style("Skipped:").yellow().bold(),
                format_number(result.not_attempted)
            );
        }
    }

    println!("  {} {:.1}s", style("Duration:").bold(), duration_secs);
    println!("  {} {}", style("Log file:").bold(), log_path.display());

    if result.has_failures() {
        println!();
        println!("{}", style("Failed archives:").red().bold());
        for failure in result.failures.iter().take(MAX_LISTED_FAILURES) {
            println!("  {} - {}", failure.path.display(), failure.reason);
        }
        if result.failures.len() > MAX_LISTED_FAILURES {
            println!(
                "  ... and {} more (see log file)",
                result.failures.len() - MAX_LISTED_FAILURES
            );
        }
        println!();
        println!(
            "{} retry the failed archives manually; they may be password \
             protected, corrupted or split into parts.",
            style("Tip:").cyan().bold()
        );
    }
    println!();
}

/// Print a header at the start of the run
pub fn print_header(root: &Path, workers: usize, tool: &Path, log_path: &Path) {
    println!();
    println!(
        "{} {}",
        style("archive-walker").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Root:").bold(), root.display());
    println!("  {} {}", style("Workers:").bold(), workers);
    println!("  {} {}", style("Tool:").bold(), tool.display());
    println!("  {} {}", style("Log file:").bold(), log_path.display());
    println!();
}
