//! Worker pool: a feeder thread plus N workers
//!
//! The feeder pulls chunks lazily from the plan into a bounded queue; the
//! workers render them and pass them to the writers. Completion events come
//! back on the event channel in the order writers finish them, not in chunk
//! order.
//!
//! The pool holds no event senders or sink handles after startup, so the
//! event channel closes exactly when the feeder, every worker, and every
//! writer have finished.

use crate::engine::queue::{ChunkQueue, Offer, QueueStats};
use crate::engine::worker::{aggregate_stats, Worker};
use crate::error::{ChunkOutcome, WorkerError};
use crate::output::SinkHandle;
use crate::types::{Chunk, NumberFormat};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long the feeder waits on a full queue before re-checking the stop flag
const FEED_INTERVAL: Duration = Duration::from_millis(100);

/// Create the channel chunk outcomes are reported on
pub fn event_channel() -> (Sender<ChunkOutcome>, Receiver<ChunkOutcome>) {
    unbounded()
}

/// Totals reported when the pool is joined
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolSummary {
    /// Chunks the feeder put on the queue
    pub chunks_fed: u64,

    /// Chunks rendered by workers
    pub chunks_rendered: u64,

    /// Lines rendered by workers
    pub lines_rendered: u64,

    /// Chunks that could not be handed to a writer
    pub submit_failures: u64,
}

/// Running pool of generator threads
pub struct WorkerPool {
    workers: Vec<Worker>,
    feeder: Option<JoinHandle<u64>>,
    stop: Arc<AtomicBool>,
    queue_stats: Arc<QueueStats>,
}

impl WorkerPool {
    /// Start executing `tasks` on `concurrency` workers
    ///
    /// `concurrency` is clamped to at least 1. Outcomes for every chunk a
    /// worker picks up are sent on `events`.
    pub fn run<I>(
        tasks: I,
        concurrency: usize,
        format: NumberFormat,
        sink: SinkHandle,
        events: Sender<ChunkOutcome>,
    ) -> Result<Self, WorkerError>
    where
        I: Iterator<Item = Chunk> + Send + 'static,
    {
        let concurrency = concurrency.max(1);
        let queue = ChunkQueue::new(concurrency * 2);
        let queue_stats = queue.stats();
        let (queue_tx, queue_rx) = queue.split();
        let stop = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(concurrency);
        for id in 0..concurrency {
            let spawned = Worker::spawn(
                id,
                format,
                queue_rx.clone(),
                sink.clone(),
                events.clone(),
                Arc::clone(&stop),
            );
            match spawned {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    stop.store(true, Ordering::SeqCst);
                    return Err(e);
                }
            }
        }
        drop(queue_rx);
        drop(sink);
        drop(events);

        let feeder_stop = Arc::clone(&stop);
        let feeder = thread::Builder::new()
            .name("chunk-feeder".into())
            .spawn(move || {
                let mut tasks = tasks;
                feeder_loop(&mut tasks, queue_tx, feeder_stop)
            })
            .map_err(|e| {
                stop.store(true, Ordering::SeqCst);
                WorkerError::InitFailed {
                    id: usize::MAX,
                    reason: format!("Failed to spawn feeder: {}", e),
                }
            })?;

        info!(count = workers.len(), "Workers spawned");

        Ok(Self {
            workers,
            feeder: Some(feeder),
            stop,
            queue_stats,
        })
    }

    /// Stop scheduling new chunks; chunks already taken are finished
    pub fn stop(&self) {
        if !self.stop.swap(true, Ordering::SeqCst) {
            debug!("Pool stop requested");
        }
    }

    /// Check if a stop was requested
    pub fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Number of workers
    pub fn concurrency(&self) -> usize {
        self.workers.len()
    }

    /// Chunks picked up by workers so far
    pub fn chunks_started(&self) -> u64 {
        self.queue_stats.throughput()
    }

    /// Wait for the feeder and all workers to exit
    pub fn join(mut self) -> Result<PoolSummary, WorkerError> {
        let chunks_fed = match self.feeder.take() {
            Some(handle) => handle.join().map_err(|_| WorkerError::Panicked {
                id: usize::MAX,
                message: "Feeder thread panicked".into(),
            })?,
            None => 0,
        };

        let stats: Vec<_> = self.workers.iter().map(Worker::stats).collect();

        let mut first_err = None;
        for worker in std::mem::take(&mut self.workers) {
            if let Err(e) = worker.join() {
                warn!(error = %e, "Worker failed to join cleanly");
                first_err.get_or_insert(e);
            }
        }
        if let Some(e) = first_err {
            return Err(e);
        }

        let (chunks_rendered, lines_rendered, submit_failures) = aggregate_stats(&stats);

        Ok(PoolSummary {
            chunks_fed,
            chunks_rendered,
            lines_rendered,
            submit_failures,
        })
    }
}

/// Move chunks from the plan into the queue until exhausted or stopped
fn feeder_loop(
    tasks: &mut dyn Iterator<Item = Chunk>,
    queue_tx: crate::engine::queue::ChunkQueueSender,
    stop: Arc<AtomicBool>,
) -> u64 {
    let mut fed = 0u64;

    for chunk in tasks {
        let mut pending = chunk;
        loop {
            if stop.load(Ordering::Relaxed) {
                debug!(fed, "Feeder stopped");
                return fed;
            }
            match queue_tx.offer(pending, FEED_INTERVAL) {
                Offer::Sent => {
                    fed += 1;
                    break;
                }
                Offer::Full(chunk) => pending = chunk,
                Offer::Closed => {
                    debug!(fed, "All workers gone, feeder exiting");
                    return fed;
                }
            }
        }
    }

    debug!(fed, "Plan exhausted");
    fed
}
