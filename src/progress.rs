//! Progress reporting for generation runs
//!
//! Provides a live progress bar using indicatif and the header and summary
//! printed around a run.

use crate::config::RunConfig;
use crate::engine::{RunOutcome, RunProgress, RunState};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// Progress bar over the numbers a run writes
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a reporter for a run of `total` numbers
    pub fn new(total: u64) -> Self {
        let bar = ProgressBar::new(total);

        // Template is a constant; fall back to the default style if it ever fails to parse
        let bar_style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}")
            .map(|s| s.progress_chars("=>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(bar_style);
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, progress: &RunProgress) {
        self.bar.set_length(progress.numbers_total);
        self.bar.set_position(progress.numbers_written);

        let mut msg = format!(
            "{} / {} numbers | Chunks: {}/{} | Rate: {:.0}/s",
            format_number(progress.numbers_written),
            format_number(progress.numbers_total),
            progress.chunks_written,
            progress.chunks_total,
            progress.numbers_per_second(),
        );
        if progress.chunks_failed > 0 {
            msg.push_str(&format!(" | Failed: {}", progress.chunks_failed));
        }
        if progress.draining {
            msg.push_str(" | draining");
        }
        self.bar.set_message(msg);
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Print a header at the start of the run
pub fn print_header(config: &RunConfig, resume_from: Option<u64>) {
    let prefixes: Vec<String> = config
        .prefixes
        .iter()
        .map(|p| p.dial_string(config.format))
        .collect();

    println!();
    println!(
        "{} {}",
        style("phonelist").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Prefixes:").bold(), prefixes.join(", "));
    println!(
        "  {} {}",
        style("Numbers:").bold(),
        format_number(config.total_numbers())
    );
    println!("  {} {}", style("Workers:").bold(), config.worker_count);
    println!(
        "  {} {}",
        style("Chunk size:").bold(),
        format_number(config.chunk_size)
    );
    for output in &config.outputs {
        println!("  {} {}", style("Output:").bold(), output.display());
    }
    if let Some(offset) = resume_from {
        println!(
            "  {} from {}",
            style("Resuming:").yellow().bold(),
            format_number(offset)
        );
    }
    println!();
}

/// Print a summary of the run
pub fn print_summary(outcome: &RunOutcome, progress_file: &Path) {
    let secs = outcome.duration.as_secs_f64();
    let rate = if secs > 0.0 {
        outcome.numbers_written as f64 / secs
    } else {
        0.0
    };

    let title = match outcome.state {
        RunState::Completed => style("Generation Complete").green().bold(),
        RunState::Interrupted => style("Generation Interrupted").yellow().bold(),
        _ => style("Generation Failed").red().bold(),
    };

    println!();
    println!("{}", title);
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style("Numbers:").bold(),
        format_number(outcome.numbers_written)
    );
    println!(
        "  {} {}/{}",
        style("Chunks:").bold(),
        outcome.chunks_written,
        outcome.chunks_total
    );
    println!(
        "  {} {:.1}s ({:.0} numbers/sec)",
        style("Duration:").bold(),
        secs,
        rate
    );
    if !outcome.failed.is_empty() {
        println!(
            "  {} {}",
            style("Failed chunks:").red().bold(),
            outcome.failed.len()
        );
    }

    for path in &outcome.outputs {
        match std::fs::metadata(path) {
            Ok(meta) => println!(
                "  {} {} ({})",
                style("Output:").bold(),
                path.display(),
                format_size(meta.len(), BINARY)
            ),
            Err(_) => println!("  {} {} (removed)", style("Output:").bold(), path.display()),
        }
    }

    if outcome.state != RunState::Completed {
        println!(
            "  {} {} ({} numbers remaining)",
            style("Progress:").bold(),
            progress_file.display(),
            format_number(outcome.numbers_remaining())
        );
        println!("  Run again with the same options to resume.");
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(10_000_000), "10,000,000");
        assert_eq!(format_number(1234567890), "1,234,567,890");
    }
}
