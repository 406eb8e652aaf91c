//! Worker thread logic for parallel chunk generation
//!
//! Each worker:
//! - Pulls chunks from the shared queue
//! - Renders every number of the chunk into one buffer
//! - Hands the buffer to the writer that owns the chunk's output file
//!
//! Workers never touch output files or the progress file directly.

use crate::engine::queue::{ChunkQueueReceiver, Take, WorkGuard};
use crate::error::{ChunkOutcome, WorkerError};
use crate::output::{RenderedChunk, SinkHandle};
use crate::types::{render_chunk, Chunk, NumberFormat};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// How long a worker waits for a chunk before re-checking the stop flag
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Statistics collected by a worker
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Chunks rendered
    pub chunks_rendered: AtomicU64,

    /// Lines rendered
    pub lines_rendered: AtomicU64,

    /// Chunks that could not be handed to a writer
    pub submit_failures: AtomicU64,
}

impl WorkerStats {
    fn record_chunk(&self, lines: u64) {
        self.chunks_rendered.fetch_add(1, Ordering::Relaxed);
        self.lines_rendered.fetch_add(lines, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.submit_failures.fetch_add(1, Ordering::Relaxed);
    }
}

/// A worker thread that renders chunks
pub struct Worker {
    /// Worker ID
    id: usize,

    /// Thread handle
    handle: Option<JoinHandle<()>>,

    /// Worker statistics
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Spawn a new worker thread
    pub fn spawn(
        id: usize,
        format: NumberFormat,
        queue_rx: ChunkQueueReceiver,
        sink: SinkHandle,
        events: Sender<ChunkOutcome>,
        stop: Arc<AtomicBool>,
    ) -> Result<Self, WorkerError> {
        let stats = Arc::new(WorkerStats::default());
        let stats_clone = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name(format!("generator-{}", id))
            .spawn(move || worker_loop(id, format, queue_rx, sink, events, stop, stats_clone))
            .map_err(|e| WorkerError::InitFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
            stats,
        })
    }

    /// Shared handle to the worker's counters; stays valid after `join`
    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Wait for the worker to finish
    pub fn join(mut self) -> Result<(), WorkerError> {
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| WorkerError::Panicked {
                id: self.id,
                message: "Worker thread panicked".into(),
            })?;
        }
        Ok(())
    }
}

/// Main worker loop
///
/// Exits when the queue is exhausted or the stop flag is raised. A chunk
/// already taken is always finished.
fn worker_loop(
    id: usize,
    format: NumberFormat,
    queue_rx: ChunkQueueReceiver,
    sink: SinkHandle,
    events: Sender<ChunkOutcome>,
    stop: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
) {
    debug!(worker = id, "Worker starting");

    while !stop.load(Ordering::Relaxed) {
        let chunk = match queue_rx.take(POLL_INTERVAL) {
            Take::Chunk(chunk) => chunk,
            Take::Idle => continue,
            Take::Exhausted => break,
        };

        let _guard = WorkGuard::new(&queue_rx);
        process_chunk(id, chunk, format, &sink, &events, &stats);
    }

    debug!(
        worker = id,
        chunks = stats.chunks_rendered.load(Ordering::Relaxed),
        lines = stats.lines_rendered.load(Ordering::Relaxed),
        "Worker shutting down"
    );
}

/// Render one chunk and pass it to its writer
fn process_chunk(
    worker_id: usize,
    chunk: Chunk,
    format: NumberFormat,
    sink: &SinkHandle,
    events: &Sender<ChunkOutcome>,
    stats: &WorkerStats,
) {
    let bytes = render_chunk(&chunk, format);
    stats.record_chunk(chunk.len());
    trace!(worker = worker_id, chunk = %chunk, bytes = bytes.len(), "Chunk rendered");

    let rendered = RenderedChunk {
        chunk: chunk.clone(),
        bytes,
    };

    if let Err(error) = sink.submit(rendered) {
        stats.record_failure();
        warn!(worker = worker_id, chunk = %chunk, error = %error, "Chunk not handed to writer");
        // The controller may already be gone; nothing else to report to
        let _ = events.send(ChunkOutcome::Failed { chunk, error });
    }
}

/// Aggregate statistics from multiple workers: (chunks, lines, failures)
pub fn aggregate_stats(stats: &[Arc<WorkerStats>]) -> (u64, u64, u64) {
    let mut chunks = 0u64;
    let mut lines = 0u64;
    let mut failures = 0u64;

    for s in stats {
        chunks += s.chunks_rendered.load(Ordering::Relaxed);
        lines += s.lines_rendered.load(Ordering::Relaxed);
        failures += s.submit_failures.load(Ordering::Relaxed);
    }

    (chunks, lines, failures)
}
