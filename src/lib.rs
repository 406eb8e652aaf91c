//! phonelist - Parallel, resumable phone number range generator
//!
//! Expands dialing prefixes (country code + area code) into every one of
//! their 10,000,000 subscriber numbers and writes them to text files, one
//! number per line.
//!
//! # Features
//!
//! - **Parallel Generation**: The number space is cut into fixed-size
//!   chunks that a pool of worker threads renders concurrently.
//!
//! - **Bounded Memory**: Chunks are planned lazily and queued through
//!   bounded channels, so memory does not grow with the number of prefixes.
//!
//! - **Whole-Chunk Appends**: Each output file is owned by one writer
//!   thread that appends a chunk's lines in a single write, so lines never
//!   interleave or tear.
//!
//! - **Resumable**: Progress is checkpointed to a JSON file; an interrupted
//!   run continues where it stopped without duplicating or skipping numbers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  PrefixSet   │────▶│ ChunkPlanner │────▶│ Worker Pool  │
//! │ (validated)  │     │ (lazy plan)  │     │ (N threads)  │
//! └──────────────┘     └──────────────┘     └──────┬───────┘
//!                                                  │
//!                                                  ▼
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ progress.json│◀────│RunController │◀────│   Writers    │
//! │ (resume)     │     │ (watermarks) │     │ (1 per file) │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # All of New York City's 212 and 646 numbers into lists/
//! phonelist -c 1 -a 212,646 --label "New York"
//!
//! # E.164-style lines, one file per prefix
//! phonelist -p 1:212 -p 44:20 --format plus --layout per-prefix
//! ```

pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod error;
pub mod output;
pub mod plan;
pub mod progress;
pub mod types;

pub use checkpoint::{ProgressRecord, ProgressStore, RunIdentity};
pub use config::{CliArgs, FailurePolicy, OutputLayout, ResumeMode, RunConfig};
pub use engine::{RunController, RunOutcome, RunProgress, RunState};
pub use error::{GenError, Result};
pub use plan::{plan, plan_from_offsets, ChunkPlan};
pub use types::{Chunk, NumberFormat, Prefix};
