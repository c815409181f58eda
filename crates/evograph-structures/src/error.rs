// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Common error type for evograph data structure operations.

/// Error type for genome graph, lineage and hashing operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Invalid parameters provided to a function
    #[error("Bad Parameters: {0}")]
    BadParameters(String),

    /// A genome graph violates a structural rule (dangling edge, bad arity,
    /// live cycle not passing through a memory node)
    #[error("Malformed genome graph: {0}")]
    MalformedGraph(String),

    /// Fatal: two independent computations of the same value disagree, or a
    /// total order over distinct lineages cannot be resolved. Callers must
    /// halt rather than evolve against corrupted rankings.
    #[error("Consistency violation: {0}")]
    ConsistencyViolation(String),
}

/// Result alias for structure operations
pub type GraphResult<T> = Result<T, GraphError>;
