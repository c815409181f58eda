// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Cycle-safe 64-bit structural hashing of genome graphs.
//!
//! Structurally and parametrically identical genomes hash identically
//! regardless of unrelated object identity. Order-insensitive functions
//! combine input hashes with one fixed rotation, so input permutations
//! collapse; order-sensitive functions rotate by input position, so they do
//! not.
//!
//! Memory nodes hash to a header-derived value when referenced as inputs
//! (their live output depends on history, not the current round), but their
//! recorded-input chain is folded into the genome-level digest. While a
//! memory node's chain is being computed, a reference back to that same node
//! yields a neutral zero contribution, and nothing touched by that
//! suppression is cached. Chain caching is gated on a one-time reachability
//! probe whose result is itself cached.

use crate::genomic::function::NodeFunction;
use crate::genomic::graph::{GenomeGraph, NodeId};

const INSENSITIVE_ROTATION: u32 = 17;
const MEMORY_CHAIN_ROTATION: u32 = 7;
const GENOME_DIGEST_SEED: u64 = 0x5DEE_CE66_AA3C_0F1B;

#[inline]
fn sensitive_rotation(position: usize) -> u32 {
    ((19 + 11 * position) & 63) as u32
}

/// SplitMix64 finalizer; used to spread header tags and node parameters.
#[inline]
pub fn mix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Header-derived hash of a node kind that does not recurse into inputs.
fn leaf_hash(function: &NodeFunction) -> u64 {
    let tag = function.header_tag();
    match function {
        NodeFunction::Sensor { channel } => mix64(tag ^ *channel as u64),
        NodeFunction::Constant { value } => mix64(tag ^ value.to_bits()),
        _ => mix64(tag),
    }
}

/// Structural hasher over one genome graph.
///
/// Holds the per-node hash memo, the in-progress (cycle detection) set and
/// the cached self-reachability probe. The probe survives the hasher via
/// [`StructuralHasher::probe_snapshot`] since topology does not change once a
/// genome is finalized.
pub struct StructuralHasher<'g> {
    graph: &'g GenomeGraph,
    memo: Vec<Option<u64>>,
    chain_memo: Vec<Option<u64>>,
    visiting: Vec<bool>,
    probe: Vec<Option<bool>>,
    /// Non-zero while inside a memory node's chain computation; the memo is
    /// bypassed there because suppression changes subtree hashes
    depth: u32,
}

impl<'g> StructuralHasher<'g> {
    pub fn new(graph: &'g GenomeGraph) -> Self {
        let n = graph.len();
        Self {
            graph,
            memo: vec![None; n],
            chain_memo: vec![None; n],
            visiting: vec![false; n],
            probe: vec![None; n],
            depth: 0,
        }
    }

    /// Rebuild a hasher reusing a previously computed reachability probe.
    pub fn with_probe(graph: &'g GenomeGraph, probe: Vec<Option<bool>>) -> Self {
        let mut hasher = Self::new(graph);
        if probe.len() == graph.len() {
            hasher.probe = probe;
        }
        hasher
    }

    /// The cached reachability probe results so far.
    pub fn probe_snapshot(&self) -> Vec<Option<bool>> {
        self.probe.clone()
    }

    /// Digest of the whole genome: output chains combined order-sensitively,
    /// plus every memory node's recorded-input chain.
    pub fn genome_digest(&mut self, outputs: &[NodeId]) -> u64 {
        let mut digest = GENOME_DIGEST_SEED;
        for (i, out) in outputs.iter().enumerate() {
            let (h, _) = self.contribution_inner(*out);
            digest ^= h.rotate_left(sensitive_rotation(i));
        }
        let memory: Vec<NodeId> = self.graph.memory_nodes().collect();
        for m in memory {
            // Summation keeps the fold insensitive to memory-node arena order
            // without letting equal chains cancel
            digest = digest.wrapping_add(mix64(self.chain_hash(m)));
        }
        digest
    }

    /// Hash of a node's input chain as seen by a consumer. Memory nodes
    /// contribute header-only values here.
    pub fn contribution(&mut self, id: NodeId) -> u64 {
        self.contribution_inner(id).0
    }

    /// Whether a memory node's recorded chain loops back to the node itself.
    /// Computed at most once per node, then cached.
    pub fn loops_back(&mut self, id: NodeId) -> bool {
        if let Some(v) = self.probe[id.index()] {
            return v;
        }
        let graph = self.graph;
        let node = graph.node(id);
        let mut result = false;
        if node.function.is_memory() {
            let mut stack: Vec<NodeId> = node.inputs.clone();
            let mut seen = vec![false; graph.len()];
            while let Some(n) = stack.pop() {
                if n == id {
                    result = true;
                    break;
                }
                if seen[n.index()] {
                    continue;
                }
                seen[n.index()] = true;
                let visited = graph.node(n);
                // Other memory nodes contribute header-only; their chains are
                // not traversed from here
                if !visited.function.is_memory() {
                    stack.extend(visited.inputs.iter().copied());
                }
            }
        }
        self.probe[id.index()] = Some(result);
        result
    }

    /// Full hash of a memory node's recorded-input chain. Cached only when
    /// the reachability probe establishes the node does not loop back to
    /// itself, so a cycle-suppressed result is never reused.
    pub fn chain_hash(&mut self, id: NodeId) -> u64 {
        let graph = self.graph;
        debug_assert!(graph.node(id).function.is_memory());
        if let Some(h) = self.chain_memo[id.index()] {
            return h;
        }
        self.visiting[id.index()] = true;
        self.depth += 1;
        let input = graph.node(id).inputs[0];
        let (child, clean) = self.contribution_inner(input);
        self.depth -= 1;
        self.visiting[id.index()] = false;

        let h = leaf_hash(&graph.node(id).function) ^ child.rotate_left(MEMORY_CHAIN_ROTATION);
        if clean && !self.loops_back(id) {
            self.chain_memo[id.index()] = Some(h);
        }
        h
    }

    /// (hash, clean): `clean` is false when a cycle suppression occurred
    /// anywhere beneath, which poisons caching along the path.
    fn contribution_inner(&mut self, id: NodeId) -> (u64, bool) {
        let graph = self.graph;
        let node = graph.node(id);
        if node.function.is_memory() {
            if self.visiting[id.index()] {
                // Cycle detected: this node is already computing for the
                // current caller chain
                return (0, false);
            }
            return (leaf_hash(&node.function), true);
        }
        self.node_hash(id)
    }

    fn node_hash(&mut self, id: NodeId) -> (u64, bool) {
        if self.depth == 0 {
            if let Some(h) = self.memo[id.index()] {
                return (h, true);
            }
        }
        let graph = self.graph;
        let node = graph.node(id);
        if node.function.is_hash_leaf() {
            return (leaf_hash(&node.function), true);
        }

        let order_sensitive = node.function.is_order_sensitive();
        let mut h = mix64(node.function.header_tag());
        let mut clean = true;
        for (i, input) in node.inputs.iter().enumerate() {
            let (ch, c) = self.contribution_inner(*input);
            clean &= c;
            let rot = if order_sensitive {
                sensitive_rotation(i)
            } else {
                INSENSITIVE_ROTATION
            };
            h ^= ch.rotate_left(rot);
        }
        if clean && self.depth == 0 {
            self.memo[id.index()] = Some(h);
        }
        (h, clean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(graph: &GenomeGraph, outputs: &[NodeId]) -> u64 {
        StructuralHasher::new(graph).genome_digest(outputs)
    }

    fn arith_fixture(constant: f64, swap: bool) -> (GenomeGraph, Vec<NodeId>) {
        let mut g = GenomeGraph::new();
        let s0 = g.add_node(NodeFunction::Sensor { channel: 0 }, vec![]);
        let c = g.add_node(NodeFunction::Constant { value: constant }, vec![]);
        let sum = if swap {
            g.add_node(NodeFunction::Sum, vec![c, s0])
        } else {
            g.add_node(NodeFunction::Sum, vec![s0, c])
        };
        let out = g.add_node(NodeFunction::Sigmoid, vec![sum]);
        (g, vec![out])
    }

    #[test]
    fn independent_construction_hashes_identically() {
        let (g1, o1) = arith_fixture(0.25, false);
        let (g2, o2) = arith_fixture(0.25, false);
        assert_eq!(digest(&g1, &o1), digest(&g2, &o2));
    }

    #[test]
    fn smallest_constant_perturbation_changes_hash() {
        let base = 0.25f64;
        let nudged = f64::from_bits(base.to_bits() + 1);
        let (g1, o1) = arith_fixture(base, false);
        let (g2, o2) = arith_fixture(nudged, false);
        assert_ne!(digest(&g1, &o1), digest(&g2, &o2));
    }

    #[test]
    fn order_insensitive_inputs_permute_freely() {
        let (g1, o1) = arith_fixture(0.25, false);
        let (g2, o2) = arith_fixture(0.25, true);
        assert_eq!(digest(&g1, &o1), digest(&g2, &o2));
    }

    #[test]
    fn order_sensitive_inputs_do_not_permute() {
        let build = |swap: bool| {
            let mut g = GenomeGraph::new();
            let a = g.add_node(NodeFunction::Sensor { channel: 0 }, vec![]);
            let b = g.add_node(NodeFunction::Sensor { channel: 1 }, vec![]);
            let diff = if swap {
                g.add_node(NodeFunction::Difference, vec![b, a])
            } else {
                g.add_node(NodeFunction::Difference, vec![a, b])
            };
            (g, vec![diff])
        };
        let (g1, o1) = build(false);
        let (g2, o2) = build(true);
        assert_ne!(digest(&g1, &o1), digest(&g2, &o2));
    }

    /// Memory node whose delayed output feeds its own input chain.
    fn self_feeding_memory() -> (GenomeGraph, NodeId, Vec<NodeId>) {
        let mut g = GenomeGraph::new();
        let sensor = g.add_node(NodeFunction::Sensor { channel: 0 }, vec![]);
        let mem = g.add_node(NodeFunction::Memory, vec![NodeId(2)]);
        let sum = g.add_node(NodeFunction::Sum, vec![sensor, mem]);
        (g, mem, vec![sum])
    }

    #[test]
    fn self_referencing_memory_hashes_finitely() {
        let (g, _, outputs) = self_feeding_memory();
        // Would overflow the stack without cycle suppression
        let h1 = digest(&g, &outputs);
        let h2 = digest(&g, &outputs);
        assert_eq!(h1, h2);
    }

    #[test]
    fn cycle_suppressed_chain_is_not_cached() {
        let (g, mem, _) = self_feeding_memory();
        let mut hasher = StructuralHasher::new(&g);
        assert!(hasher.loops_back(mem));
        let first = hasher.chain_hash(mem);
        assert!(hasher.chain_memo[mem.index()].is_none());
        // Recomputation takes the same suppressed path rather than reusing a
        // poisoned cache entry
        assert_eq!(first, hasher.chain_hash(mem));
    }

    #[test]
    fn non_looping_chain_is_cached_after_probe() {
        let mut g = GenomeGraph::new();
        let sensor = g.add_node(NodeFunction::Sensor { channel: 0 }, vec![]);
        let mem = g.add_node(NodeFunction::Memory, vec![sensor]);
        let out = g.add_node(NodeFunction::Negate, vec![mem]);
        let mut hasher = StructuralHasher::new(&g);
        let _ = hasher.genome_digest(&[out]);
        assert_eq!(hasher.probe[mem.index()], Some(false));
        assert!(hasher.chain_memo[mem.index()].is_some());
    }

    #[test]
    fn probe_result_is_cached() {
        let (g, mem, _) = self_feeding_memory();
        let mut hasher = StructuralHasher::new(&g);
        assert!(hasher.loops_back(mem));
        assert_eq!(hasher.probe[mem.index()], Some(true));
        assert!(hasher.loops_back(mem));
    }

    #[test]
    fn memory_wiring_differences_reach_the_digest() {
        // Same live trace, different recorded chains
        let build = |record_sensor: u16| {
            let mut g = GenomeGraph::new();
            let s0 = g.add_node(NodeFunction::Sensor { channel: 0 }, vec![]);
            let s1 = g.add_node(NodeFunction::Sensor { channel: record_sensor }, vec![]);
            let mem = g.add_node(NodeFunction::Memory, vec![s1]);
            let sum = g.add_node(NodeFunction::Sum, vec![s0, mem]);
            (g, vec![sum])
        };
        let (g1, o1) = build(1);
        let (g2, o2) = build(2);
        assert_ne!(digest(&g1, &o1), digest(&g2, &o2));
    }
}
