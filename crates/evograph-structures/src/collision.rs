// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Structural verification for genomes that share a structural hash.
//!
//! Equal hashes are "presumed identical", never assumed without consequence.
//! The walk compares each paired node's function identity (parameters
//! included) and per-input chain hashes; any mismatch is conclusive evidence
//! of a genuine collision. Order-insensitive nodes pair their inputs by
//! sorted chain hash so input permutation does not produce false mismatches.

use crate::genomic::genome::Genome;
use crate::genomic::graph::NodeId;
use ahash::AHashSet;
use std::collections::VecDeque;
use tracing::debug;

/// Outcome of the verification walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionVerdict {
    /// Every compared node matched: the genomes are duplicates
    PresumedIdentical,
    /// Conclusive structural difference despite equal hashes
    DistinctCollision,
}

/// Walk two genomes in parallel from their outputs.
pub fn structural_walk(a: &Genome, b: &Genome) -> CollisionVerdict {
    use CollisionVerdict::*;

    if a.outputs().len() != b.outputs().len() {
        return DistinctCollision;
    }

    let mut hasher_a = a.hasher();
    let mut hasher_b = b.hasher();

    // Memory populations must agree as multisets of chain hashes; chains are
    // part of the digest but not necessarily reachable from the outputs
    let mem_a: Vec<NodeId> = a.graph().memory_nodes().collect();
    let mem_b: Vec<NodeId> = b.graph().memory_nodes().collect();
    if mem_a.len() != mem_b.len() {
        return DistinctCollision;
    }
    let mut chains_a: Vec<u64> = mem_a.iter().map(|&m| hasher_a.chain_hash(m)).collect();
    let mut chains_b: Vec<u64> = mem_b.iter().map(|&m| hasher_b.chain_hash(m)).collect();
    chains_a.sort_unstable();
    chains_b.sort_unstable();
    if chains_a != chains_b {
        return DistinctCollision;
    }

    let mut queue: VecDeque<(NodeId, NodeId)> = a
        .outputs()
        .iter()
        .copied()
        .zip(b.outputs().iter().copied())
        .collect();
    let mut seen: AHashSet<(u32, u32)> = AHashSet::new();

    while let Some((na, nb)) = queue.pop_front() {
        if !seen.insert((na.0, nb.0)) {
            continue;
        }
        let node_a = a.graph().node(na);
        let node_b = b.graph().node(nb);

        if node_a.function != node_b.function {
            debug!(
                "[COLLISION] function mismatch at pair ({:?}, {:?}): {:?} vs {:?}",
                na, nb, node_a.function, node_b.function
            );
            return DistinctCollision;
        }
        if node_a.inputs.len() != node_b.inputs.len() {
            return DistinctCollision;
        }

        if node_a.function.is_memory() {
            if hasher_a.chain_hash(na) != hasher_b.chain_hash(nb) {
                return DistinctCollision;
            }
            queue.push_back((node_a.inputs[0], node_b.inputs[0]));
            continue;
        }

        let mut paired_a: Vec<(u64, NodeId)> = node_a
            .inputs
            .iter()
            .map(|&i| (hasher_a.contribution(i), i))
            .collect();
        let mut paired_b: Vec<(u64, NodeId)> = node_b
            .inputs
            .iter()
            .map(|&i| (hasher_b.contribution(i), i))
            .collect();
        if !node_a.function.is_order_sensitive() {
            paired_a.sort_unstable_by_key(|(h, _)| *h);
            paired_b.sort_unstable_by_key(|(h, _)| *h);
        }
        for ((ha, ia), (hb, ib)) in paired_a.iter().zip(paired_b.iter()) {
            if ha != hb {
                return DistinctCollision;
            }
            queue.push_back((*ia, *ib));
        }
    }

    PresumedIdentical
}
