//! Chunk planning
//!
//! Splits each prefix's `[offset, SUBSCRIBER_SPACE)` range into contiguous
//! chunks of `chunk_size` numbers. Chunks are produced lazily, in prefix
//! order and then in ascending start order; the final chunk of a prefix
//! may be shorter than `chunk_size`.

use crate::types::{Chunk, Prefix, SUBSCRIBER_SPACE};
use std::sync::Arc;

/// Default numbers per chunk
pub const DEFAULT_CHUNK_SIZE: u64 = 1_000_000;

/// Plan chunks with the same resume offset for every prefix
pub fn plan(prefixes: &[Prefix], start_from: u64, chunk_size: u64) -> ChunkPlan {
    let offsets = vec![start_from; prefixes.len()];
    plan_from_offsets(prefixes, &offsets, chunk_size)
}

/// Plan chunks with an individual resume offset per prefix
///
/// `offsets` is matched to `prefixes` by position; missing entries start
/// at 0. Offsets at or beyond the end of the space yield no chunks for
/// that prefix. A `chunk_size` of 0 is treated as 1.
pub fn plan_from_offsets(prefixes: &[Prefix], offsets: &[u64], chunk_size: u64) -> ChunkPlan {
    let spans = prefixes
        .iter()
        .enumerate()
        .map(|(i, p)| PrefixSpan {
            prefix: Arc::new(p.clone()),
            start: offsets.get(i).copied().unwrap_or(0).min(SUBSCRIBER_SPACE),
        })
        .collect::<Vec<_>>();

    let next = spans.first().map(|s| s.start).unwrap_or(SUBSCRIBER_SPACE);

    ChunkPlan {
        spans,
        chunk_size: chunk_size.max(1),
        current: 0,
        next,
    }
}

struct PrefixSpan {
    prefix: Arc<Prefix>,
    start: u64,
}

/// Lazy, finite sequence of chunks
///
/// Not restartable: to resume, build a new plan with updated offsets.
pub struct ChunkPlan {
    spans: Vec<PrefixSpan>,
    chunk_size: u64,
    current: usize,
    next: u64,
}

impl ChunkPlan {
    /// Numbers per chunk
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Total numbers the remaining chunks will produce
    pub fn remaining_numbers(&self) -> u64 {
        self.spans
            .iter()
            .enumerate()
            .skip(self.current)
            .map(|(i, s)| {
                let from = if i == self.current { self.next } else { s.start };
                SUBSCRIBER_SPACE - from
            })
            .sum()
    }

    fn chunks_from(&self, from: u64) -> usize {
        (SUBSCRIBER_SPACE - from).div_ceil(self.chunk_size) as usize
    }
}

impl Iterator for ChunkPlan {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        while self.current < self.spans.len() {
            if self.next < SUBSCRIBER_SPACE {
                let start = self.next;
                let end = (start + self.chunk_size).min(SUBSCRIBER_SPACE);
                self.next = end;
                let span = &self.spans[self.current];
                return Some(Chunk::new(
                    self.current,
                    Arc::clone(&span.prefix),
                    start,
                    end,
                ));
            }

            self.current += 1;
            if let Some(span) = self.spans.get(self.current) {
                self.next = span.start;
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .spans
            .iter()
            .enumerate()
            .skip(self.current)
            .map(|(i, s)| {
                let from = if i == self.current { self.next } else { s.start };
                self.chunks_from(from)
            })
            .sum();
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ChunkPlan {}
