// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for the generation engine.

use evograph_evolutionary::EvoError;
use evograph_structures::GraphError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Evolution(#[from] EvoError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The process-wide exit signal fired; the generation was abandoned
    /// after folding whatever results were already recorded
    #[error("Engine is shutting down")]
    ShuttingDown,

    /// A collaborator's evaluation failed for one genome
    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    /// A collaborator's mutation operator failed
    #[error("Mutation failed: {0}")]
    Mutation(String),
}

/// Result alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
