// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Collaborator seams for the generation engine.
//!
//! The concrete fitness environment and the mutation operator library live
//! outside this crate; the engine sees them only through these traits.

use crate::error::EngineResult;
use evograph_evolutionary::EvolutionContext;
use evograph_structures::{Fitness, Genome};
use std::sync::Arc;

/// Evaluates a genome against its task environment. Deterministic given the
/// genome's wiring; side-effect-free on the genome.
pub trait GenomeEvaluator: Send + Sync {
    fn evaluate(&self, genome: &Arc<Genome>, generation: u64) -> EngineResult<Fitness>;
}

/// One mutation operation, produced by the factory, executed as a worker
/// task. Produces some number of offspring genomes, each carrying its
/// lineage.
pub trait Mutator: Send {
    /// Estimated cost; tasks are dispatched longest-first
    fn cost_estimate(&self) -> u64;

    fn produce(&mut self, context: &EvolutionContext) -> EngineResult<Vec<Arc<Genome>>>;
}

/// Builds the generation's mutation operations from the current fittest set
/// and the historical fitness record.
pub trait MutationFactory: Send {
    fn make_offspring(
        &mut self,
        count: usize,
        fittest: &[Arc<Genome>],
        historical: &[Fitness],
    ) -> Vec<Box<dyn Mutator>>;
}
