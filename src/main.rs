//! archive-walker - Recursive Archive Discovery and Extraction
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use archive_walker::config::{CliArgs, WalkConfig};
use archive_walker::error::WalkerError;
use archive_walker::extract::SevenZip;
use archive_walker::logging;
use archive_walker::progress::{print_header, print_summary, ProgressReporter};
use archive_walker::walker::RunCoordinator;
use clap::Parser;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Validate and create config
    let config = WalkConfig::from_args(args).context("Invalid configuration")?;

    // Setup logging
    let log_path = logging::init(&config.log_path, config.verbose, config.show_progress)
        .context("Failed to open log file")?;

    // The tool must resolve before anything is scanned
    let extractor = SevenZip::locate(&config.tool).context("Extraction tool unavailable")?;
    info!(tool = %extractor.program().display(), "Using extraction tool");

    // Print header
    if config.show_progress {
        print_header(
            &config.root,
            config.worker_count,
            extractor.program(),
            &log_path,
        );
    }

    let show_progress = config.show_progress;
    let coordinator = RunCoordinator::new(config, Arc::new(extractor));

    // Setup signal handler for graceful shutdown
    let shutdown_flag = coordinator.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, shutting down...");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    // Create progress reporter
    let progress = show_progress.then(|| Arc::new(ProgressReporter::new()));

    // Run both phases
    let result = match &progress {
        Some(reporter) => {
            let reporter = Arc::clone(reporter);
            coordinator.run_with_progress(move |phase, snapshot| reporter.update(phase, &snapshot))
        }
        None => coordinator.run(),
    }
    .context("Run failed")?;

    // Finish progress
    if let Some(ref p) = progress {
        if result.completed {
            p.finish("Done");
        } else {
            p.finish("Interrupted");
        }
    }

    // Print summary
    print_summary(&result, &log_path);

    if result.has_failures() {
        info!(failed = result.failures.len(), "Run completed with failed archives");
    }

    if !result.completed {
        return Err(WalkerError::Interrupted.into());
    }

    Ok(())
}
