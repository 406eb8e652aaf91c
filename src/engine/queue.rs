//! Bounded chunk queue between the planner and the workers
//!
//! The feeder pulls chunks from the lazy plan and blocks when the queue is
//! full, so at most `capacity` chunks are materialized ahead of the workers.

use crate::types::Chunk;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Statistics for the chunk queue
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Total chunks enqueued
    pub enqueued: AtomicU64,

    /// Total chunks dequeued by workers
    pub dequeued: AtomicU64,

    /// Number of times the feeder found the queue full
    pub backpressure_events: AtomicU64,
}

impl QueueStats {
    /// Chunks handed to workers so far
    pub fn throughput(&self) -> u64 {
        self.dequeued.load(Ordering::Relaxed)
    }

    /// Get backpressure event count
    pub fn backpressure_count(&self) -> u64 {
        self.backpressure_events.load(Ordering::Relaxed)
    }
}

/// Bounded chunk queue
pub struct ChunkQueue {
    sender: Sender<Chunk>,
    receiver: Receiver<Chunk>,
    active_workers: Arc<AtomicUsize>,
    stats: Arc<QueueStats>,
}

/// Outcome of offering a chunk to a full queue
#[derive(Debug)]
pub enum Offer {
    /// Accepted
    Sent,
    /// Still full after the timeout; the chunk is handed back
    Full(Chunk),
    /// All receivers are gone
    Closed,
}

impl ChunkQueue {
    /// Create a new queue with the specified capacity
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);

        Self {
            sender,
            receiver,
            active_workers: Arc::new(AtomicUsize::new(0)),
            stats: Arc::new(QueueStats::default()),
        }
    }

    /// Split into the feeder's sender and a cloneable receiver
    ///
    /// Once the sender is dropped, receivers drain what is left and then
    /// report disconnection.
    pub fn split(self) -> (ChunkQueueSender, ChunkQueueReceiver) {
        (
            ChunkQueueSender {
                sender: self.sender,
                stats: Arc::clone(&self.stats),
            },
            ChunkQueueReceiver {
                receiver: self.receiver,
                active_workers: self.active_workers,
                stats: self.stats,
            },
        )
    }

    /// Get queue statistics
    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }
}

/// Feeder side of the queue
pub struct ChunkQueueSender {
    sender: Sender<Chunk>,
    stats: Arc<QueueStats>,
}

impl ChunkQueueSender {
    /// Offer a chunk, waiting at most `timeout` for room
    pub fn offer(&self, chunk: Chunk, timeout: Duration) -> Offer {
        match self.sender.send_timeout(chunk, timeout) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                Offer::Sent
            }
            Err(SendTimeoutError::Timeout(chunk)) => {
                self.stats.backpressure_events.fetch_add(1, Ordering::Relaxed);
                Offer::Full(chunk)
            }
            Err(SendTimeoutError::Disconnected(_)) => Offer::Closed,
        }
    }
}

/// Result of waiting for a chunk
#[derive(Debug)]
pub enum Take {
    /// A chunk to process
    Chunk(Chunk),
    /// Nothing arrived within the timeout
    Idle,
    /// The feeder is done and the queue is drained
    Exhausted,
}

/// Worker side of the queue
#[derive(Clone)]
pub struct ChunkQueueReceiver {
    receiver: Receiver<Chunk>,
    active_workers: Arc<AtomicUsize>,
    stats: Arc<QueueStats>,
}

impl ChunkQueueReceiver {
    /// Receive with timeout
    pub fn take(&self, timeout: Duration) -> Take {
        match self.receiver.recv_timeout(timeout) {
            Ok(chunk) => {
                self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
                Take::Chunk(chunk)
            }
            Err(RecvTimeoutError::Timeout) => Take::Idle,
            Err(RecvTimeoutError::Disconnected) => Take::Exhausted,
        }
    }

    /// Mark this worker as active
    pub fn begin_work(&self) {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
    }

    /// Mark this worker as idle
    pub fn end_work(&self) {
        self.active_workers.fetch_sub(1, Ordering::SeqCst);
    }

    /// Workers currently holding a chunk
    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }

    /// Current queue length
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

/// RAII guard for marking work as active
pub struct WorkGuard<'a> {
    receiver: &'a ChunkQueueReceiver,
}

impl<'a> WorkGuard<'a> {
    /// Create a new work guard (marks worker as active)
    pub fn new(receiver: &'a ChunkQueueReceiver) -> Self {
        receiver.begin_work();
        Self { receiver }
    }
}

impl Drop for WorkGuard<'_> {
    fn drop(&mut self) {
        self.receiver.end_work();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Prefix;

    fn chunk(start: u64) -> Chunk {
        let prefix = Arc::new(Prefix::new("1", "212").unwrap());
        Chunk::new(0, prefix, start, start + 10)
    }

    const TICK: Duration = Duration::from_millis(10);

    #[test]
    fn test_queue_fifo() {
        let (tx, rx) = ChunkQueue::new(4).split();
        assert!(matches!(tx.offer(chunk(0), TICK), Offer::Sent));
        assert!(matches!(tx.offer(chunk(10), TICK), Offer::Sent));
        assert_eq!(rx.len(), 2);

        match rx.take(TICK) {
            Take::Chunk(c) => assert_eq!(c.start, 0),
            other => panic!("unexpected {:?}", other),
        }
        match rx.take(TICK) {
            Take::Chunk(c) => assert_eq!(c.start, 10),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(rx.take(TICK), Take::Idle));
    }

    #[test]
    fn test_queue_backpressure() {
        let queue = ChunkQueue::new(1);
        let stats = queue.stats();
        let (tx, _rx) = queue.split();

        assert!(matches!(tx.offer(chunk(0), TICK), Offer::Sent));
        match tx.offer(chunk(10), TICK) {
            Offer::Full(c) => assert_eq!(c.start, 10),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(stats.backpressure_count(), 1);
    }

    #[test]
    fn test_queue_drains_after_feeder_drops() {
        let (tx, rx) = ChunkQueue::new(4).split();
        tx.offer(chunk(0), TICK);
        drop(tx);

        assert!(matches!(rx.take(TICK), Take::Chunk(_)));
        assert!(matches!(rx.take(TICK), Take::Exhausted));
    }

    #[test]
    fn test_offer_to_closed_queue() {
        let (tx, rx) = ChunkQueue::new(4).split();
        drop(rx);
        assert!(matches!(tx.offer(chunk(0), TICK), Offer::Closed));
    }

    #[test]
    fn test_work_guard() {
        let (_tx, rx) = ChunkQueue::new(4).split();
        assert_eq!(rx.active_workers(), 0);
        {
            let _guard = WorkGuard::new(&rx);
            assert_eq!(rx.active_workers(), 1);
        }
        assert_eq!(rx.active_workers(), 0);
    }
}
