//! Run controller - drives one generation run from configuration to exit
//!
//! The controller is responsible for:
//! - Deciding whether to resume from saved progress
//! - Planning the remaining chunks
//! - Starting the writers and the worker pool
//! - Tracking completion and checkpointing progress
//! - Interrupt and failure handling (drain, save, report)
//!
//! ```text
//! Configuring ──▶ Planning ──▶ Running ──┬──▶ Completed
//!                                        ├──▶ Interrupted
//!                                        └──▶ Failed
//! ```
//!
//! The controller is the only writer of the progress file. Because the
//! chunk queue is FIFO, the chunks handed out before a stop always form a
//! prefix of the plan; once they are drained, each prefix's completed
//! range is contiguous and its watermark is an exact resume point.

use crate::checkpoint::{ProgressRecord, ProgressStore, RunIdentity};
use crate::config::{FailurePolicy, ResumeMode, RunConfig};
use crate::engine::pool::{event_channel, WorkerPool};
use crate::error::{ChunkOutcome, Result, WriteError};
use crate::output::OutputSink;
use crate::plan::plan_from_offsets;
use crate::types::{Chunk, SUBSCRIBER_SPACE};
use crossbeam_channel::RecvTimeoutError;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How often the event loop wakes to check the shutdown flag
const TICK: Duration = Duration::from_millis(100);

/// Rendered chunks each writer may hold before workers block
const WRITER_QUEUE_DEPTH: usize = 2;

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Configuring,
    Planning,
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunState {
    /// Whether the run has ended
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Interrupted | Self::Failed)
    }
}

/// Snapshot passed to the progress observer after every chunk outcome
#[derive(Debug, Clone)]
pub struct RunProgress {
    /// Numbers written this run
    pub numbers_written: u64,

    /// Numbers this run set out to write
    pub numbers_total: u64,

    /// Chunks written this run
    pub chunks_written: u64,

    /// Chunks planned this run
    pub chunks_total: u64,

    /// Chunks that failed
    pub chunks_failed: u64,

    /// Time since the run started
    pub elapsed: Duration,

    /// Whether a stop (interrupt or failure) is draining the pool
    pub draining: bool,
}

impl RunProgress {
    /// Numbers per second
    pub fn numbers_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.numbers_written as f64 / secs
        } else {
            0.0
        }
    }

    /// Fraction of this run's numbers written, 0.0..=1.0
    pub fn fraction(&self) -> f64 {
        if self.numbers_total == 0 {
            1.0
        } else {
            self.numbers_written as f64 / self.numbers_total as f64
        }
    }
}

/// A chunk that was not written
#[derive(Debug, Clone)]
pub struct ChunkFailure {
    pub chunk: Chunk,
    pub error: WriteError,
}

/// Result of a finished run
#[derive(Debug)]
pub struct RunOutcome {
    /// Terminal state
    pub state: RunState,

    /// Numbers written this run
    pub numbers_written: u64,

    /// Chunks written this run
    pub chunks_written: u64,

    /// Chunks planned this run
    pub chunks_total: u64,

    /// Chunks that could not be written
    pub failed: Vec<ChunkFailure>,

    /// Lowest offset the run resumed from, if it resumed
    pub resumed_from: Option<u64>,

    /// Resume offset per prefix at the end of the run
    pub offsets: Vec<u64>,

    /// Time taken
    pub duration: Duration,

    /// Output files
    pub outputs: Vec<PathBuf>,

    /// Whether in-flight chunks were abandoned after the drain timeout
    pub abandoned: bool,
}

/// Why the event loop stopped scheduling work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Interrupted,
    Failed,
}

/// Per-prefix contiguous completion tracking
///
/// Chunks finish out of order; a prefix's watermark only advances over a
/// gap-free run of completed chunks starting at its current value.
#[derive(Debug)]
struct Watermarks {
    marks: Vec<u64>,
    pending: Vec<BTreeMap<u64, u64>>,
}

impl Watermarks {
    fn new(offsets: Vec<u64>) -> Self {
        let pending = offsets.iter().map(|_| BTreeMap::new()).collect();
        Self {
            marks: offsets,
            pending,
        }
    }

    /// Record a written chunk; returns true if the prefix's watermark moved
    fn complete(&mut self, chunk: &Chunk) -> bool {
        let i = chunk.prefix_index;
        let Some(mark) = self.marks.get_mut(i) else {
            return false;
        };

        if chunk.start != *mark {
            self.pending[i].insert(chunk.start, chunk.end);
            return false;
        }

        *mark = chunk.end;
        while let Some(end) = self.pending[i].remove(&*mark) {
            *mark = end;
        }
        true
    }

    fn offsets(&self) -> Vec<u64> {
        self.marks.clone()
    }

    fn all_done(&self) -> bool {
        self.marks.iter().all(|&m| m >= SUBSCRIBER_SPACE)
    }
}

/// Drives a generation run
pub struct RunController {
    /// Configuration
    config: Arc<RunConfig>,

    /// Progress file
    store: ProgressStore,

    /// Identity saved progress must match
    identity: RunIdentity,

    /// Saved progress this run continues from
    resume: Option<ProgressRecord>,

    /// Shutdown signal
    shutdown: Arc<AtomicBool>,

    /// Current state
    state: RunState,
}

impl RunController {
    /// Create a controller and make the resume decision
    pub fn new(config: RunConfig) -> Self {
        let store = ProgressStore::new(&config.checkpoint_path);
        let identity = config.identity();

        let resume = match config.resume {
            ResumeMode::No => None,
            ResumeMode::Auto => store.load(&identity),
            ResumeMode::Yes => {
                let record = store.load(&identity);
                if record.is_none() {
                    info!("No matching progress to resume, starting from the beginning");
                }
                record
            }
        };

        if let Some(record) = &resume {
            info!(
                start_from = record.start_from,
                path = %store.path().display(),
                "Resuming from saved progress"
            );
        }

        Self {
            config: Arc::new(config),
            store,
            identity,
            resume,
            shutdown: Arc::new(AtomicBool::new(false)),
            state: RunState::Configuring,
        }
    }

    /// Get shutdown flag for signal handling
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Current state
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Saved progress this run will continue from
    pub fn resume_point(&self) -> Option<&ProgressRecord> {
        self.resume.as_ref()
    }

    /// Per-prefix start offsets for this run
    pub fn start_offsets(&self) -> Vec<u64> {
        let count = self.config.prefixes.len();
        match &self.resume {
            Some(record) => record.offsets_for(count),
            None => vec![0; count],
        }
    }

    fn transition(&mut self, next: RunState) {
        debug!(from = ?self.state, to = ?next, "Run state change");
        self.state = next;
    }

    /// Run to a terminal state
    pub fn run(self) -> Result<RunOutcome> {
        self.run_with(|_| {})
    }

    /// Run to a terminal state, calling `observer` after every chunk outcome
    pub fn run_with<F>(mut self, mut observer: F) -> Result<RunOutcome>
    where
        F: FnMut(&RunProgress),
    {
        let start_time = Instant::now();

        // Planning
        self.transition(RunState::Planning);
        let offsets = self.start_offsets();
        let plan = plan_from_offsets(&self.config.prefixes, &offsets, self.config.chunk_size);
        let chunks_total = plan.len() as u64;
        let numbers_total = plan.remaining_numbers();
        let resumed = self.resume.is_some();

        info!(
            prefixes = self.config.prefixes.len(),
            chunks = chunks_total,
            numbers = numbers_total,
            chunk_size = self.config.chunk_size,
            resumed,
            "Run planned"
        );

        for output in &self.config.outputs {
            if let Some(parent) = output.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
        }

        let (events_tx, events_rx) = event_channel();
        let (sink, handle) = OutputSink::open_files(
            &self.config.outputs,
            self.config.routes.clone(),
            offsets.clone(),
            !resumed,
            WRITER_QUEUE_DEPTH,
            events_tx.clone(),
        )?;

        if !resumed {
            // Outputs were just truncated; any older record no longer applies
            self.store
                .save(&ProgressRecord::new(self.identity.clone(), offsets.clone()))?;
        }

        // Running
        self.transition(RunState::Running);
        let pool = WorkerPool::run(
            plan,
            self.config.worker_count,
            self.config.format,
            handle,
            events_tx,
        )?;

        let mut marks = Watermarks::new(offsets);
        let mut progress = RunProgress {
            numbers_written: 0,
            numbers_total,
            chunks_written: 0,
            chunks_total,
            chunks_failed: 0,
            elapsed: Duration::ZERO,
            draining: false,
        };
        let mut failed = Vec::new();
        let mut stop_reason = None;
        let mut drain_deadline = None;
        let mut since_checkpoint = 0u64;
        let mut abandoned = false;

        loop {
            if stop_reason.is_none() && self.shutdown.load(Ordering::SeqCst) {
                info!("Shutdown signal received, finishing in-flight chunks");
                stop_reason = Some(StopReason::Interrupted);
                pool.stop();
                drain_deadline = Some(Instant::now() + self.config.drain_timeout);
            }

            if drain_deadline.is_some_and(|d| Instant::now() >= d) {
                warn!(
                    timeout_secs = self.config.drain_timeout.as_secs(),
                    "Drain timed out, abandoning in-flight chunks"
                );
                abandoned = true;
                break;
            }

            let outcome = match events_rx.recv_timeout(TICK) {
                Ok(outcome) => outcome,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            match outcome {
                ChunkOutcome::Written { chunk, lines, .. } => {
                    progress.numbers_written += lines;
                    progress.chunks_written += 1;
                    marks.complete(&chunk);
                    since_checkpoint += 1;
                    if since_checkpoint >= self.config.checkpoint_every {
                        self.checkpoint(&marks);
                        since_checkpoint = 0;
                    }
                }
                ChunkOutcome::Failed { chunk, error } => {
                    error!(chunk = %chunk, error = %error, "Chunk failed");
                    progress.chunks_failed += 1;
                    failed.push(ChunkFailure { chunk, error });

                    if self.config.failure_policy == FailurePolicy::Abort && stop_reason.is_none() {
                        warn!("Stopping run after failed chunk");
                        stop_reason = Some(StopReason::Failed);
                        pool.stop();
                        drain_deadline = Some(Instant::now() + self.config.drain_timeout);
                    }
                }
            }

            progress.elapsed = start_time.elapsed();
            progress.draining = stop_reason.is_some();
            observer(&progress);
        }

        if let Some(reason) = stop_reason {
            debug!(?reason, "Run stopped early");
        }

        let join_result = if abandoned {
            // Threads still running are detached; the process exit reaps them
            Ok(())
        } else {
            pool.join()
                .map(|summary| debug!(?summary, "Pool joined"))
                .and_then(|_| sink.finish())
        };

        let final_offsets = marks.offsets();
        let state = if !failed.is_empty() {
            RunState::Failed
        } else if marks.all_done() && join_result.is_ok() {
            RunState::Completed
        } else {
            RunState::Interrupted
        };
        self.transition(state);

        match state {
            RunState::Completed => {
                self.store.clear()?;
                remove_empty_outputs(&self.config.outputs);
            }
            _ => {
                self.store
                    .save(&ProgressRecord::new(self.identity.clone(), final_offsets.clone()))?;
                info!(
                    state = ?state,
                    path = %self.store.path().display(),
                    "Progress saved"
                );
            }
        }

        join_result?;

        let duration = start_time.elapsed();
        info!(
            state = ?state,
            numbers = progress.numbers_written,
            chunks = progress.chunks_written,
            failed = failed.len(),
            duration_secs = duration.as_secs_f64(),
            "Run finished"
        );

        Ok(RunOutcome {
            state,
            numbers_written: progress.numbers_written,
            chunks_written: progress.chunks_written,
            chunks_total,
            failed,
            resumed_from: self.resume.as_ref().map(|r| r.start_from),
            offsets: final_offsets,
            duration,
            outputs: self.config.outputs.clone(),
            abandoned,
        })
    }

    /// Periodic save; a failure here is retried at the next checkpoint
    fn checkpoint(&self, marks: &Watermarks) {
        let record = ProgressRecord::new(self.identity.clone(), marks.offsets());
        if let Err(e) = self.store.save(&record) {
            warn!(error = %e, "Failed to save progress");
        }
    }
}

/// Delete outputs that ended up empty
fn remove_empty_outputs(outputs: &[PathBuf]) {
    for path in outputs {
        match fs::metadata(path) {
            Ok(meta) if meta.is_file() && meta.len() == 0 => {
                if let Err(e) = fs::remove_file(path) {
                    warn!(path = %path.display(), error = %e, "Failed to remove empty output");
                } else {
                    debug!(path = %path.display(), "Removed empty output");
                }
            }
            _ => {}
        }
    }
}

impl RunOutcome {
    /// Whether every planned chunk was written
    pub fn is_complete(&self) -> bool {
        self.state == RunState::Completed
    }

    /// Remaining numbers across all prefixes
    pub fn numbers_remaining(&self) -> u64 {
        self.offsets
            .iter()
            .map(|&o| SUBSCRIBER_SPACE.saturating_sub(o))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Prefix;

    fn chunk(prefix_index: usize, start: u64, end: u64) -> Chunk {
        Chunk::new(
            prefix_index,
            Arc::new(Prefix::new("1", "212").unwrap()),
            start,
            end,
        )
    }

    #[test]
    fn test_watermark_in_order() {
        let mut marks = Watermarks::new(vec![0]);
        assert!(marks.complete(&chunk(0, 0, 10)));
        assert!(marks.complete(&chunk(0, 10, 20)));
        assert_eq!(marks.offsets(), vec![20]);
    }

    #[test]
    fn test_watermark_out_of_order() {
        let mut marks = Watermarks::new(vec![100]);
        assert!(!marks.complete(&chunk(0, 120, 130)));
        assert!(!marks.complete(&chunk(0, 110, 120)));
        assert_eq!(marks.offsets(), vec![100]);

        assert!(marks.complete(&chunk(0, 100, 110)));
        assert_eq!(marks.offsets(), vec![130]);
    }

    #[test]
    fn test_watermark_per_prefix() {
        let mut marks = Watermarks::new(vec![0, 9_000_000]);
        marks.complete(&chunk(1, 9_000_000, SUBSCRIBER_SPACE));
        assert_eq!(marks.offsets(), vec![0, SUBSCRIBER_SPACE]);
        assert!(!marks.all_done());

        marks.complete(&chunk(0, 0, SUBSCRIBER_SPACE));
        assert!(marks.all_done());
    }

    #[test]
    fn test_watermark_gap_holds() {
        let mut marks = Watermarks::new(vec![0]);
        marks.complete(&chunk(0, 0, 10));
        marks.complete(&chunk(0, 20, 30));
        assert_eq!(marks.offsets(), vec![10]);
    }

    #[test]
    fn test_progress_rates() {
        let progress = RunProgress {
            numbers_written: 5_000,
            numbers_total: 10_000,
            chunks_written: 5,
            chunks_total: 10,
            chunks_failed: 0,
            elapsed: Duration::from_secs(2),
            draining: false,
        };
        assert_eq!(progress.numbers_per_second(), 2_500.0);
        assert_eq!(progress.fraction(), 0.5);

        let empty = RunProgress {
            numbers_total: 0,
            elapsed: Duration::ZERO,
            ..progress
        };
        assert_eq!(empty.numbers_per_second(), 0.0);
        assert_eq!(empty.fraction(), 1.0);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!RunState::Running.is_terminal());
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Interrupted.is_terminal());
        assert!(RunState::Failed.is_terminal());
    }
}
