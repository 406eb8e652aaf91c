//! Parallel generation engine
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐   Chunk    ┌───────────────────┐  RenderedChunk  ┌────────────────┐
//! │ ChunkPlan     │──────────▶ │ ChunkQueue        │───────────────▶ │ TargetWriter   │
//! │ (lazy, feeder │  bounded   │ Worker 1..N       │  per-file       │ (one per file) │
//! │  thread)      │            │ render chunks     │  bounded        │ append whole   │
//! └───────────────┘            └───────────────────┘                 └───────┬────────┘
//!                                                                            │ ChunkOutcome
//!                                                                            ▼
//!                                                                  ┌──────────────────┐
//!                                                                  │ RunController    │
//!                                                                  │ watermarks,      │
//!                                                                  │ progress file    │
//!                                                                  └──────────────────┘
//! ```

pub mod controller;
pub mod pool;
pub mod queue;
pub mod worker;

pub use controller::{ChunkFailure, RunController, RunOutcome, RunProgress, RunState};
pub use pool::{event_channel, PoolSummary, WorkerPool};
pub use queue::{ChunkQueue, QueueStats};
pub use worker::{Worker, WorkerStats};
