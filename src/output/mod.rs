//! Output targets for generated numbers
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              Worker Threads (N)              │
//! │  - Render a chunk into one buffer            │
//! │  - Route it by prefix to its target          │
//! └──────────────────────┬───────────────────────┘
//!                        │ RenderedChunk
//!                        ▼
//! ┌──────────────────────────────────────────────┐
//! │      TargetWriter thread (one per file)      │
//! │  - Appends each buffer whole                 │
//! │  - Rolls back a failed append                │
//! │  - Emits the chunk's ChunkOutcome            │
//! └──────────────────────┬───────────────────────┘
//!                        │
//!                        ▼
//!               numbers_*.txt / merged
//! ```

pub mod writer;

pub use writer::{AppendTarget, FileTarget, RenderedChunk, TargetWriter, WriterStats};

use crate::error::{ChunkOutcome, WorkerError, WriteError, WriteResult};
use crossbeam_channel::Sender;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// All writer threads of a run
///
/// Holds no senders itself: once every [`SinkHandle`] is dropped the
/// writers drain their queues and exit.
pub struct OutputSink {
    writers: Vec<TargetWriter>,
}

impl OutputSink {
    /// Open file targets and spawn one writer per file
    ///
    /// `routes[i]` is the index into `paths` that prefix `i` writes to, and
    /// `starts[i]` is the offset its first chunk begins at. With
    /// `truncate`, existing file content is discarded.
    pub fn open_files(
        paths: &[PathBuf],
        routes: Vec<usize>,
        starts: Vec<u64>,
        truncate: bool,
        capacity: usize,
        events: Sender<ChunkOutcome>,
    ) -> WriteResult<(Self, SinkHandle)> {
        let targets = paths
            .iter()
            .map(|path| {
                FileTarget::open(path, truncate)
                    .map(|t| (path.clone(), Box::new(t) as Box<dyn AppendTarget>))
                    .map_err(|e| WriteError::OpenFailed {
                        path: path.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<WriteResult<Vec<_>>>()?;

        Self::with_targets(targets, routes, starts, capacity, events)
    }

    /// Spawn writers over already-open targets
    pub fn with_targets(
        targets: Vec<(PathBuf, Box<dyn AppendTarget>)>,
        routes: Vec<usize>,
        starts: Vec<u64>,
        capacity: usize,
        events: Sender<ChunkOutcome>,
    ) -> WriteResult<(Self, SinkHandle)> {
        let mut writers = Vec::with_capacity(targets.len());
        let mut senders = Vec::with_capacity(targets.len());
        let mut paths = Vec::with_capacity(targets.len());

        for (id, (path, target)) in targets.into_iter().enumerate() {
            let mut writer = TargetWriter::spawn(
                id,
                path.clone(),
                target,
                starts.clone(),
                capacity,
                events.clone(),
            )?;
            if let Some(sender) = writer.take_sender() {
                senders.push(sender);
            }
            paths.push(path);
            writers.push(writer);
        }

        let handle = SinkHandle {
            senders,
            routes: routes.into(),
            paths: paths.into(),
        };

        Ok((Self { writers }, handle))
    }

    /// Per-target statistics, in target order
    pub fn stats(&self) -> Vec<(PathBuf, Arc<WriterStats>)> {
        self.writers
            .iter()
            .map(|w| (w.path().to_path_buf(), w.stats()))
            .collect()
    }

    /// Wait for every writer to drain and exit
    pub fn finish(self) -> Result<(), WorkerError> {
        let mut first_err = None;
        for writer in self.writers {
            if let Err(e) = writer.join() {
                warn!(error = %e, "Writer failed to join cleanly");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Cloneable handle workers use to hand chunks to writers
#[derive(Clone)]
pub struct SinkHandle {
    senders: Vec<Sender<RenderedChunk>>,
    routes: Arc<[usize]>,
    paths: Arc<[PathBuf]>,
}

impl SinkHandle {
    /// Queue a rendered chunk on the writer for its prefix
    ///
    /// Blocks while that writer's queue is full.
    pub fn submit(&self, rendered: RenderedChunk) -> WriteResult<()> {
        let target = self
            .routes
            .get(rendered.chunk.prefix_index)
            .copied()
            .unwrap_or(0);

        let closed = || WriteError::WriterClosed {
            path: self.paths.get(target).cloned().unwrap_or_default(),
        };

        let sender = self.senders.get(target).ok_or_else(|| closed())?;
        sender.send(rendered).map_err(|_| closed())
    }

    /// Output path a prefix is routed to
    pub fn path_for(&self, prefix_index: usize) -> Option<&PathBuf> {
        self.routes
            .get(prefix_index)
            .and_then(|&t| self.paths.get(t))
    }
}
