//! Configuration types for phonelist
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - Output file naming

use crate::checkpoint::{RunIdentity, DEFAULT_PROGRESS_FILE};
use crate::error::ConfigError;
use crate::plan::DEFAULT_CHUNK_SIZE;
use crate::types::{NumberFormat, Prefix, SUBSCRIBER_SPACE};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 512;

/// Directory generated file names are placed in
pub const DEFAULT_OUTPUT_DIR: &str = "lists";

/// Label used in merged file names when none is given
const DEFAULT_LABEL: &str = "Custom";

/// Enumerate every subscriber number for a set of dialing prefixes
#[derive(Parser, Debug, Clone)]
#[command(
    name = "phonelist",
    version,
    about = "Generate every subscriber number (0000000-9999999) for a set of dialing prefixes",
    long_about = "Expands each country code + area code prefix into its 10,000,000 numbers,\n\
                  writing them with a pool of worker threads.\n\n\
                  Progress is checkpointed; an interrupted run (Ctrl-C) resumes where it left\n\
                  off when started again with the same prefixes and output.",
    after_help = "EXAMPLES:\n    \
        phonelist -c 1 -a 212,646 --label \"New York\"\n    \
        phonelist -c 1 -a 212 --format plus -o nyc.txt -w 8\n    \
        phonelist -p 1:212 -p 44:20 --layout per-prefix --output-dir out\n    \
        phonelist -c 1 -a 212 --resume no   # discard saved progress"
)]
pub struct CliArgs {
    /// Country code for --area-code (e.g. 1 for USA)
    #[arg(short = 'c', long, value_name = "CC")]
    pub country_code: Option<String>,

    /// Area codes to expand (repeatable or comma-separated)
    #[arg(
        short = 'a',
        long = "area-code",
        value_name = "AC",
        value_delimiter = ',',
        action = clap::ArgAction::Append
    )]
    pub area_codes: Vec<String>,

    /// Explicit prefix as COUNTRY:AREA (repeatable)
    #[arg(short = 'p', long = "prefix", value_name = "CC:AC", action = clap::ArgAction::Append)]
    pub prefixes: Vec<String>,

    /// Number of worker threads
    #[arg(short = 'w', long, default_value_t = default_workers(), value_name = "NUM")]
    pub workers: usize,

    /// Numbers per chunk (unit of work and checkpoint granularity)
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, value_name = "NUM")]
    pub chunk_size: u64,

    /// One shared output file or one file per prefix
    #[arg(long, value_enum, default_value_t = OutputLayout::Merged)]
    pub layout: OutputLayout,

    /// Line format
    #[arg(long, value_enum, default_value_t = NumberFormat::Plain)]
    pub format: NumberFormat,

    /// Output file for the merged layout (default: dated name in --output-dir)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Directory for generated file names
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR, value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Label for the merged file name (e.g. a state name)
    #[arg(long, value_name = "NAME")]
    pub label: Option<String>,

    /// Whether to continue from saved progress
    #[arg(long, value_enum, default_value_t = ResumeMode::Auto)]
    pub resume: ResumeMode,

    /// Progress file
    #[arg(long, default_value = DEFAULT_PROGRESS_FILE, value_name = "FILE")]
    pub checkpoint: PathBuf,

    /// Save progress after this many written chunks
    #[arg(long, default_value = "4", value_name = "CHUNKS")]
    pub checkpoint_every: u64,

    /// Seconds to wait for in-flight chunks after an interrupt
    #[arg(long, default_value = "30", value_name = "SECS")]
    pub drain_timeout: u64,

    /// Keep generating when a chunk fails to write
    #[arg(long)]
    pub keep_going: bool,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// How prefixes map to output files
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputLayout {
    /// Every prefix appends to one file
    Merged,
    /// Each prefix gets its own file
    PerPrefix,
}

/// Resume decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ResumeMode {
    /// Resume when a matching progress record exists
    Auto,
    /// Same as auto, but note when there is nothing to resume
    Yes,
    /// Start over, truncating outputs
    No,
}

/// What the controller does with a failed chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop scheduling, drain, save progress, report failure
    Abort,
    /// Record the failure and keep going; the run still ends as failed
    Continue,
}

fn default_workers() -> usize {
    num_cpus::get()
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Prefixes in run order
    pub prefixes: Vec<Prefix>,

    /// Output layout
    pub layout: OutputLayout,

    /// Output files, in target order
    pub outputs: Vec<PathBuf>,

    /// Output index for each prefix
    pub routes: Vec<usize>,

    /// Line format
    pub format: NumberFormat,

    /// Number of worker threads
    pub worker_count: usize,

    /// Numbers per chunk
    pub chunk_size: u64,

    /// Resume decision
    pub resume: ResumeMode,

    /// Progress file
    pub checkpoint_path: PathBuf,

    /// Chunks between progress saves
    pub checkpoint_every: u64,

    /// Grace period for in-flight chunks
    pub drain_timeout: Duration,

    /// Failed chunk handling
    pub failure_policy: FailurePolicy,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl RunConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let prefixes = resolve_prefixes(&args)?;

        if args.workers == 0 || args.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.workers,
                max: MAX_WORKERS,
            });
        }

        if args.chunk_size == 0 || args.chunk_size > SUBSCRIBER_SPACE {
            return Err(ConfigError::InvalidChunkSize {
                size: args.chunk_size,
                max: SUBSCRIBER_SPACE,
            });
        }

        if args.checkpoint_every == 0 {
            return Err(ConfigError::InvalidCheckpointInterval(0));
        }

        let (outputs, routes) = match args.layout {
            OutputLayout::Merged => {
                let path = match &args.output {
                    Some(path) => {
                        check_parent_exists(path)?;
                        path.clone()
                    }
                    None => args.output_dir.join(merged_file_name(
                        &prefixes[0].country_code,
                        args.label.as_deref(),
                        &chrono::Local::now().format("%Y-%m-%d").to_string(),
                    )),
                };
                (vec![path], vec![0; prefixes.len()])
            }
            OutputLayout::PerPrefix => {
                if let Some(path) = &args.output {
                    return Err(ConfigError::InvalidOutputPath {
                        path: path.clone(),
                        reason: "--output only applies to the merged layout; use --output-dir"
                            .to_string(),
                    });
                }
                per_prefix_targets(&prefixes, &args.output_dir, args.format)
            }
        };

        check_parent_exists(&args.checkpoint)?;

        Ok(Self {
            prefixes,
            layout: args.layout,
            outputs,
            routes,
            format: args.format,
            worker_count: args.workers,
            chunk_size: args.chunk_size,
            resume: args.resume,
            checkpoint_path: args.checkpoint,
            checkpoint_every: args.checkpoint_every,
            drain_timeout: Duration::from_secs(args.drain_timeout),
            failure_policy: if args.keep_going {
                FailurePolicy::Continue
            } else {
                FailurePolicy::Abort
            },
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }

    /// Identity a saved progress record must match
    pub fn identity(&self) -> RunIdentity {
        RunIdentity::new(&self.prefixes, &self.outputs, self.format)
    }

    /// Numbers a full (non-resumed) run produces
    pub fn total_numbers(&self) -> u64 {
        self.prefixes.len() as u64 * SUBSCRIBER_SPACE
    }
}

/// Collect prefixes from --country-code/--area-code and --prefix, in that order
fn resolve_prefixes(args: &CliArgs) -> Result<Vec<Prefix>, ConfigError> {
    let mut prefixes = Vec::new();

    let area_codes: Vec<&str> = args
        .area_codes
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .collect();

    match (&args.country_code, area_codes.is_empty()) {
        (Some(cc), false) => {
            for area in area_codes {
                prefixes.push(Prefix::new(cc, area)?);
            }
        }
        (None, false) => return Err(ConfigError::MissingCountryCode),
        (Some(cc), true) => {
            // Validate even when unused so typos are not silently ignored
            Prefix::new(cc, "0")?;
        }
        (None, true) => {}
    }

    for value in &args.prefixes {
        prefixes.push(Prefix::parse(value)?);
    }

    if prefixes.is_empty() {
        return Err(ConfigError::NoPrefixes);
    }
    Ok(prefixes)
}

fn check_parent_exists(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(ConfigError::InvalidOutputPath {
                path: path.to_path_buf(),
                reason: format!("Parent directory '{}' does not exist", parent.display()),
            });
        }
    }
    Ok(())
}

/// One file per distinct prefix; repeated prefixes share a file
fn per_prefix_targets(
    prefixes: &[Prefix],
    dir: &Path,
    format: NumberFormat,
) -> (Vec<PathBuf>, Vec<usize>) {
    let mut outputs: Vec<PathBuf> = Vec::new();
    let mut routes = Vec::with_capacity(prefixes.len());

    for prefix in prefixes {
        let path = dir.join(format!("numbers_{}.txt", prefix.dial_string(format)));
        let index = match outputs.iter().position(|p| *p == path) {
            Some(i) => i,
            None => {
                outputs.push(path);
                outputs.len() - 1
            }
        };
        routes.push(index);
    }

    (outputs, routes)
}

/// `<Country>_<Label>_<date>.txt`, e.g. `US_New York_2024-05-01.txt`
pub fn merged_file_name(country_code: &str, label: Option<&str>, date: &str) -> String {
    let country = if country_code == "1" {
        "US".to_string()
    } else {
        format!("Country{}", country_code)
    };
    format!("{}_{}_{}.txt", country, safe_label(label), date)
}

/// Keep alphanumerics, spaces and dashes; replace everything else with `_`
fn safe_label(label: Option<&str>) -> String {
    let label = label.map(str::trim).unwrap_or_default();
    if label.is_empty() {
        return DEFAULT_LABEL.to_string();
    }
    label
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
