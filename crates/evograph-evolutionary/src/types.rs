// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for population management.

use evograph_structures::{GenomeId, GraphError};

/// Error type for ledger, context and persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum EvoError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Fatal: the ledger's internal structures disagree, or a guaranteed
    /// sufficiency was not met. The process halts rather than risk evolving
    /// against corrupted rankings.
    #[error("Consistency violation: {0}")]
    ConsistencyViolation(String),

    /// An operation referenced a genome the ledger does not track
    #[error("Unknown genome {0:?}")]
    UnknownGenome(GenomeId),

    /// Recoverable snapshot read/write failure
    #[error("Snapshot I/O failure: {0}")]
    SnapshotIo(String),

    /// The snapshot's contents failed validation (version, integrity or
    /// protected-seed mismatch)
    #[error("Snapshot rejected: {0}")]
    SnapshotRejected(String),
}

/// Result alias for population operations
pub type EvoResult<T> = Result<T, EvoError>;
