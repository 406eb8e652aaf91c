//! Error types for phonelist
//!
//! This module defines the error hierarchy used by the generator:
//! - Configuration errors (rejected before any file is touched)
//! - Per-chunk write errors (reported as structured outcomes)
//! - Checkpoint persistence errors
//! - Worker thread errors
//!
//! Library code uses thiserror; the binary wraps these with anyhow context.

use crate::types::Chunk;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the generator
#[derive(Error, Debug)]
pub enum GenError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Output write errors
    #[error("Write error: {0}")]
    Write(#[from] WriteError),

    /// Progress file errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration and CLI errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Country code is not a positive digit string
    #[error("Invalid country code '{code}': positive digits only")]
    InvalidCountryCode { code: String },

    /// Area code is not 1-5 digits
    #[error("Invalid area code '{code}': must be 1-5 digits")]
    InvalidAreaCode { code: String },

    /// Malformed --prefix value
    #[error("Invalid prefix '{value}': expected COUNTRY:AREA (e.g. 1:212)")]
    InvalidPrefix { value: String },

    /// Nothing to generate
    #[error("No prefixes given: pass --country-code with --area-code, or --prefix")]
    NoPrefixes,

    /// Area codes given without a country code
    #[error("Area codes given without --country-code")]
    MissingCountryCode,

    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid chunk size
    #[error("Invalid chunk size {size}: must be between 1 and {max}")]
    InvalidChunkSize { size: u64, max: u64 },

    /// Invalid checkpoint interval
    #[error("Invalid checkpoint interval {0}: must be at least 1")]
    InvalidCheckpointInterval(u64),

    /// Output path error
    #[error("Invalid output path '{path}': {reason}")]
    InvalidOutputPath { path: PathBuf, reason: String },
}

/// A failed append to an output target
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    /// The target could not be opened or truncated
    #[error("Failed to open '{path}': {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    /// The append itself failed (disk full, I/O error)
    #[error("Failed to append to '{path}': {reason}")]
    AppendFailed { path: PathBuf, reason: String },

    /// The writer thread for this target is gone
    #[error("Writer for '{path}' is no longer accepting chunks")]
    WriterClosed { path: PathBuf },

    /// Not appended because an earlier chunk of the same prefix is missing
    #[error("Skipped chunk for '{path}': an earlier chunk of this prefix was not written")]
    Skipped { path: PathBuf },
}

/// Progress file persistence errors
///
/// Reading is never fatal; only writes and removal surface here.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Failed to write the progress record
    #[error("Failed to save progress to '{path}': {source}")]
    SaveFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to encode the progress record
    #[error("Failed to encode progress record: {0}")]
    Encode(#[from] serde_json::Error),

    /// Failed to remove the progress file
    #[error("Failed to remove progress file '{path}': {source}")]
    ClearFailed {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Thread spawn failed
    #[error("Failed to initialize worker {id}: {reason}")]
    InitFailed { id: usize, reason: String },
}

/// Result type alias for GenError
pub type Result<T> = std::result::Result<T, GenError>;

/// Result type alias for WriteError
pub type WriteResult<T> = std::result::Result<T, WriteError>;

/// Outcome of a single chunk task
#[derive(Debug, Clone)]
pub enum ChunkOutcome {
    /// Every line of the chunk reached its output target
    Written { chunk: Chunk, lines: u64, bytes: u64 },

    /// The chunk was not written (or was rolled back)
    Failed { chunk: Chunk, error: WriteError },
}

impl ChunkOutcome {
    /// Returns true if this outcome represents success
    pub fn is_success(&self) -> bool {
        matches!(self, ChunkOutcome::Written { .. })
    }

    /// Returns the chunk associated with this outcome
    pub fn chunk(&self) -> &Chunk {
        match self {
            ChunkOutcome::Written { chunk, .. } => chunk,
            ChunkOutcome::Failed { chunk, .. } => chunk,
        }
    }
}
