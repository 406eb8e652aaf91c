//! Exclusive per-target writer threads
//!
//! Every output file is owned by exactly one writer thread. Workers hand it
//! fully rendered chunk buffers over a bounded channel; the writer appends
//! each buffer whole, so lines from different chunks never interleave.
//! The writer, not the worker, reports the chunk's outcome, which means a
//! `Written` event is only emitted once the bytes have reached the file.
//!
//! Each prefix's chunks are appended in plan order. Once one of them fails,
//! the rest of that prefix is reported as skipped and never appended, so a
//! file only ever holds a gap-free run of each prefix's numbers.

use crate::error::{ChunkOutcome, WorkerError, WriteError, WriteResult};
use crate::types::Chunk;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace, warn};

/// Something a chunk buffer can be appended to
pub trait AppendTarget: Send {
    /// Append the whole buffer or fail without leaving a partial chunk
    fn append(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Push buffered bytes down to the OS
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Append-mode file that rolls back failed appends
pub struct FileTarget {
    file: File,
    len: u64,
}

impl FileTarget {
    /// Open (creating if needed) a file for appending
    ///
    /// With `truncate`, existing content is discarded first.
    pub fn open(path: &Path, truncate: bool) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if truncate {
            file.set_len(0)?;
        }
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }

    /// Current length of the file as seen by this writer
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Check if nothing has been written
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl AppendTarget for FileTarget {
    fn append(&mut self, buf: &[u8]) -> io::Result<()> {
        match self.file.write_all(buf) {
            Ok(()) => {
                self.len += buf.len() as u64;
                Ok(())
            }
            Err(e) => {
                // Drop whatever part of the chunk made it out
                if let Err(rollback) = self.file.set_len(self.len) {
                    warn!(error = %rollback, "Failed to roll back partial chunk");
                }
                Err(e)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// A chunk rendered by a worker, ready to append
#[derive(Debug)]
pub struct RenderedChunk {
    pub chunk: Chunk,
    pub bytes: Vec<u8>,
}

/// Statistics about write operations
#[derive(Debug, Default)]
pub struct WriterStats {
    /// Chunks appended
    pub chunks_written: AtomicU64,

    /// Lines appended
    pub lines_written: AtomicU64,

    /// Bytes appended
    pub bytes_written: AtomicU64,

    /// Appends that failed
    pub failures: AtomicU64,

    /// Chunks not appended because an earlier chunk of their prefix failed
    pub skipped: AtomicU64,
}

impl WriterStats {
    /// Get lines written
    pub fn lines_written(&self) -> u64 {
        self.lines_written.load(Ordering::Relaxed)
    }

    /// Get bytes written
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Get failure count
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Get skipped chunk count
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

/// One output file and the thread that owns it
pub struct TargetWriter {
    path: PathBuf,
    sender: Option<Sender<RenderedChunk>>,
    handle: Option<JoinHandle<()>>,
    stats: Arc<WriterStats>,
}

impl TargetWriter {
    /// Spawn the writer thread for a target
    ///
    /// `starts[i]` is where prefix `i`'s first chunk begins; prefixes
    /// without an entry start at 0.
    pub fn spawn(
        id: usize,
        path: PathBuf,
        target: Box<dyn AppendTarget>,
        starts: Vec<u64>,
        capacity: usize,
        events: Sender<ChunkOutcome>,
    ) -> WriteResult<Self> {
        let (sender, receiver) = bounded(capacity.max(1));
        let stats = Arc::new(WriterStats::default());
        let stats_clone = Arc::clone(&stats);
        let thread_path = path.clone();

        let handle = thread::Builder::new()
            .name(format!("writer-{}", id))
            .spawn(move || {
                let appender = Appender {
                    path: thread_path,
                    target,
                    stats: stats_clone,
                };
                writer_thread(appender, starts, receiver, events)
            })
            .map_err(|e| WriteError::OpenFailed {
                path: path.clone(),
                reason: format!("Failed to spawn writer thread: {}", e),
            })?;

        Ok(Self {
            path,
            sender: Some(sender),
            handle: Some(handle),
            stats,
        })
    }

    /// Output path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writer statistics
    pub fn stats(&self) -> Arc<WriterStats> {
        Arc::clone(&self.stats)
    }

    /// Take the sending side; the writer exits once every clone is dropped
    pub(crate) fn take_sender(&mut self) -> Option<Sender<RenderedChunk>> {
        self.sender.take()
    }

    /// Wait for the writer to drain and exit
    pub fn join(mut self) -> Result<(), WorkerError> {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| WorkerError::Panicked {
                id: usize::MAX,
                message: format!("Writer for '{}' panicked", self.path.display()),
            })?;
        }
        Ok(())
    }
}

/// Target plus the bookkeeping every append updates
struct Appender {
    path: PathBuf,
    target: Box<dyn AppendTarget>,
    stats: Arc<WriterStats>,
}

impl Appender {
    fn append(&mut self, rendered: RenderedChunk) -> ChunkOutcome {
        let RenderedChunk { chunk, bytes } = rendered;
        match self.target.append(&bytes) {
            Ok(()) => {
                let lines = chunk.len();
                self.stats.chunks_written.fetch_add(1, Ordering::Relaxed);
                self.stats.lines_written.fetch_add(lines, Ordering::Relaxed);
                self.stats
                    .bytes_written
                    .fetch_add(bytes.len() as u64, Ordering::Relaxed);
                trace!(path = %self.path.display(), chunk = %chunk, "Chunk appended");
                ChunkOutcome::Written {
                    chunk,
                    lines,
                    bytes: bytes.len() as u64,
                }
            }
            Err(e) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                ChunkOutcome::Failed {
                    chunk,
                    error: WriteError::AppendFailed {
                        path: self.path.clone(),
                        reason: e.to_string(),
                    },
                }
            }
        }
    }

    fn skip(&self, chunk: Chunk) -> ChunkOutcome {
        self.stats.skipped.fetch_add(1, Ordering::Relaxed);
        debug!(path = %self.path.display(), chunk = %chunk, "Chunk skipped");
        ChunkOutcome::Failed {
            chunk,
            error: WriteError::Skipped {
                path: self.path.clone(),
            },
        }
    }
}

/// Append order for one prefix within a target
///
/// A prefix's chunks are appended strictly in ascending start order, so
/// the target always holds a gap-free range `[start, next)` for it. Chunks
/// that arrive early are held until the gap before them closes. After a
/// failed append nothing more is appended for the prefix.
struct PrefixOrder {
    next: u64,
    held: BTreeMap<u64, RenderedChunk>,
    failed: bool,
}

impl PrefixOrder {
    fn new(start: u64) -> Self {
        Self {
            next: start,
            held: BTreeMap::new(),
            failed: false,
        }
    }

    /// Take one chunk; returns outcomes for every chunk settled by it
    fn accept(&mut self, rendered: RenderedChunk, appender: &mut Appender) -> Vec<ChunkOutcome> {
        if self.failed {
            return vec![appender.skip(rendered.chunk)];
        }
        if rendered.chunk.start != self.next {
            self.held.insert(rendered.chunk.start, rendered);
            return Vec::new();
        }

        let mut outcomes = Vec::new();
        let mut current = Some(rendered);
        while let Some(r) = current {
            let outcome = appender.append(r);
            if outcome.is_success() {
                self.next = outcome.chunk().end;
                current = self.held.remove(&self.next);
            } else {
                self.failed = true;
                current = None;
            }
            outcomes.push(outcome);
        }

        if self.failed {
            let held = std::mem::take(&mut self.held);
            outcomes.extend(held.into_values().map(|r| appender.skip(r.chunk)));
        }
        outcomes
    }
}

/// Internal writer thread function
fn writer_thread(
    mut appender: Appender,
    starts: Vec<u64>,
    receiver: Receiver<RenderedChunk>,
    events: Sender<ChunkOutcome>,
) {
    debug!(path = %appender.path.display(), "Writer starting");
    let mut order: Vec<PrefixOrder> = starts.into_iter().map(PrefixOrder::new).collect();

    'recv: for rendered in receiver.iter() {
        let i = rendered.chunk.prefix_index;
        if i >= order.len() {
            order.resize_with(i + 1, || PrefixOrder::new(0));
        }

        for outcome in order[i].accept(rendered, &mut appender) {
            if events.send(outcome).is_err() {
                debug!(path = %appender.path.display(), "Event stream closed, writer stopping");
                break 'recv;
            }
        }
    }

    // Chunks still held never had their predecessor arrive
    for slot in &mut order {
        for (_, rendered) in std::mem::take(&mut slot.held) {
            let _ = events.send(appender.skip(rendered.chunk));
        }
    }

    if let Err(e) = appender.target.flush() {
        warn!(path = %appender.path.display(), error = %e, "Final flush failed");
    }

    debug!(
        path = %appender.path.display(),
        lines = appender.stats.lines_written(),
        "Writer finished"
    );
}
