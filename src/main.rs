//! phonelist - Parallel, resumable phone number range generator
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use phonelist::config::{CliArgs, RunConfig};
use phonelist::engine::{RunController, RunState};
use phonelist::progress::{print_header, print_summary, ProgressReporter};
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(RunState::Failed) => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<RunState> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    // Validate and create config
    let config = RunConfig::from_args(args).context("Invalid configuration")?;

    let controller = RunController::new(config.clone());

    // Setup signal handler for graceful shutdown
    let shutdown_flag = controller.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, finishing in-flight chunks...");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    if config.show_progress {
        print_header(&config, controller.resume_point().map(|r| r.start_from));
    }

    let progress = config
        .show_progress
        .then(|| ProgressReporter::new(config.total_numbers()));
    if let Some(ref p) = progress {
        p.set_status("Starting workers...");
    }

    let outcome = controller
        .run_with(|snapshot| {
            if let Some(ref p) = progress {
                p.update(snapshot);
            }
        })
        .context("Generation failed")?;

    if let Some(ref p) = progress {
        match outcome.state {
            RunState::Completed => p.finish("Generation completed"),
            RunState::Interrupted => p.finish("Generation interrupted"),
            _ => p.finish("Generation failed"),
        }
    }

    if config.show_progress {
        print_summary(&outcome, &config.checkpoint_path);
    }

    for failure in &outcome.failed {
        error!(chunk = %failure.chunk, error = %failure.error, "Chunk was not written");
    }
    if outcome.abandoned {
        warn!("Some in-flight chunks were abandoned; they will be regenerated on resume");
    }
    if outcome.state == RunState::Interrupted {
        info!(
            path = %config.checkpoint_path.display(),
            "Run interrupted, progress saved"
        );
    }

    Ok(outcome.state)
}

fn setup_logging(verbose: bool) -> Result<()> {
    let default = if verbose {
        "phonelist=debug,warn"
    } else {
        "phonelist=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
