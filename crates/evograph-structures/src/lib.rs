// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # evograph-structures
//!
//! Core data structures for the evograph evolution system:
//!
//! - genome node graphs (arena-addressed, copy-on-mutate)
//! - the closed [`NodeFunction`] enumeration of node kinds
//! - [`Lineage`] ancestry with memoized, symmetric kinship scoring
//! - cycle-safe 64-bit structural hashing
//! - collision verification for genomes that share a structural hash

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod collision;
pub mod error;
pub mod genomic;
pub mod hashing;

pub use collision::{structural_walk, CollisionVerdict};
pub use error::{GraphError, GraphResult};
pub use genomic::fitness::{Fitness, FitnessKey};
pub use genomic::function::{InputArity, NodeFunction, SignalContext};
pub use genomic::genome::{Genome, GenomeId};
pub use genomic::graph::{GenomeGraph, Node, NodeId};
pub use genomic::lineage::{Lineage, Parentage};
pub use hashing::StructuralHasher;
