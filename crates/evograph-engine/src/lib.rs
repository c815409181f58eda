// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # evograph-engine
//!
//! Drives evolution one generation at a time: builds mutation and evaluation
//! tasks, distributes them longest-estimated-cost-first across a fixed pool
//! of worker threads plus the driving thread, waits for completion, advances
//! the population ledger, and performs graceful cooperative shutdown.
//!
//! ## Design
//! - Channel-based task queue + completion latch + cancellation token
//! - No forced mid-task preemption: a running task always finishes (or the
//!   bounded shutdown wait gives up and proceeds with diagnostics)
//! - Unconditional completion registration: a task that fails or panics
//!   still releases the barrier

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cancel;
pub mod error;
pub mod generation;
pub mod pool;
pub mod shutdown;
pub mod task;

pub use cancel::CancellationToken;
pub use error::{EngineError, EngineResult};
pub use generation::GenerationEngine;
pub use pool::{Job, WorkerPool};
pub use shutdown::{SavePrompt, ShutdownOptions, StdinPrompt};
pub use task::{GenomeEvaluator, MutationFactory, Mutator};
