// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! The genome: an immutable node graph plus identity, birth generation and
//! lineage.
//!
//! Genomes are produced by mutation and never mutated in place once
//! published (copy-on-mutate); identity toward the ledger and hash index is
//! the structural hash, computed once at construction.

use crate::error::{GraphError, GraphResult};
use crate::genomic::graph::{GenomeGraph, NodeId};
use crate::genomic::lineage::{Lineage, Parentage};
use crate::hashing::StructuralHasher;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Unique identifier issued by the evolution context. Never reused within a
/// population, including across snapshot load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GenomeId(pub u64);

/// An immutable, finalized genome.
pub struct Genome {
    id: GenomeId,
    birth_generation: u64,
    graph: GenomeGraph,
    outputs: Vec<NodeId>,
    lineage: Arc<Lineage>,
    structural_hash: u64,
    /// Cached self-reachability probe from the construction-time hash run
    probe: Vec<Option<bool>>,
}

impl std::fmt::Debug for Genome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Genome")
            .field("id", &self.id)
            .field("birth_generation", &self.birth_generation)
            .field("nodes", &self.graph.len())
            .field("structural_hash", &format_args!("{:#018x}", self.structural_hash))
            .finish()
    }
}

impl Genome {
    /// Finalize a freshly mutated graph into a genome. Validates the graph,
    /// computes the structural hash and derives the lineage from the given
    /// parentage.
    pub fn new(
        id: GenomeId,
        birth_generation: u64,
        graph: GenomeGraph,
        outputs: Vec<NodeId>,
        parentage: Parentage,
    ) -> GraphResult<Arc<Self>> {
        graph.validate(&outputs)?;
        let mut hasher = StructuralHasher::new(&graph);
        let structural_hash = hasher.genome_digest(&outputs);
        let probe = hasher.probe_snapshot();
        let lineage = Lineage::new(structural_hash, parentage)?;
        Ok(Arc::new(Self {
            id,
            birth_generation,
            graph,
            outputs,
            lineage,
            structural_hash,
            probe,
        }))
    }

    /// Rebuild a genome from persisted state with an already restored
    /// lineage. The recomputed structural hash must match the lineage's.
    pub fn restore(
        id: GenomeId,
        birth_generation: u64,
        graph: GenomeGraph,
        outputs: Vec<NodeId>,
        lineage: Arc<Lineage>,
    ) -> GraphResult<Arc<Self>> {
        graph.validate(&outputs)?;
        let mut hasher = StructuralHasher::new(&graph);
        let structural_hash = hasher.genome_digest(&outputs);
        if structural_hash != lineage.hash() {
            return Err(GraphError::BadParameters(format!(
                "restored genome hashes to {:#018x} but its lineage claims {:#018x}",
                structural_hash,
                lineage.hash()
            )));
        }
        let probe = hasher.probe_snapshot();
        Ok(Arc::new(Self {
            id,
            birth_generation,
            graph,
            outputs,
            lineage,
            structural_hash,
            probe,
        }))
    }

    pub fn id(&self) -> GenomeId {
        self.id
    }

    pub fn birth_generation(&self) -> u64 {
        self.birth_generation
    }

    pub fn graph(&self) -> &GenomeGraph {
        &self.graph
    }

    pub fn outputs(&self) -> &[NodeId] {
        &self.outputs
    }

    pub fn lineage(&self) -> &Arc<Lineage> {
        &self.lineage
    }

    pub fn structural_hash(&self) -> u64 {
        self.structural_hash
    }

    /// A hasher over this genome's graph, seeded with the cached
    /// reachability probe. Used by the collision verification walk.
    pub fn hasher(&self) -> StructuralHasher<'_> {
        StructuralHasher::with_probe(&self.graph, self.probe.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genomic::function::NodeFunction;

    fn simple_graph() -> (GenomeGraph, Vec<NodeId>) {
        let mut g = GenomeGraph::new();
        let s = g.add_node(NodeFunction::Sensor { channel: 0 }, vec![]);
        let c = g.add_node(NodeFunction::Constant { value: 2.0 }, vec![]);
        let out = g.add_node(NodeFunction::Product, vec![s, c]);
        (g, vec![out])
    }

    #[test]
    fn lineage_hash_matches_structural_hash() {
        let (g, outputs) = simple_graph();
        let genome = Genome::new(GenomeId(1), 0, g, outputs, Parentage::Root).unwrap();
        assert_eq!(genome.lineage().hash(), genome.structural_hash());
        assert_eq!(genome.lineage().lineage_contains(genome.structural_hash()), 1.0);
    }

    #[test]
    fn restore_rejects_hash_mismatch() {
        let (g, outputs) = simple_graph();
        let wrong = Lineage::root(0xDEAD);
        assert!(Genome::restore(GenomeId(1), 0, g, outputs, wrong).is_err());
    }

    #[test]
    fn new_rejects_malformed_graph() {
        let mut g = GenomeGraph::new();
        g.add_node(NodeFunction::Negate, vec![NodeId(7)]);
        assert!(Genome::new(GenomeId(1), 0, g, vec![NodeId(0)], Parentage::Root).is_err());
    }
}
