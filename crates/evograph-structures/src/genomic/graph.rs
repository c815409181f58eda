// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Arena-addressed genome graph.
//!
//! Nodes live in a flat arena and reference their inputs by index; reverse
//! adjacency is derived on demand. Cycle detection is an index-set
//! reachability query rather than reference-identity bookkeeping. The only
//! legal cycles are those closed through a `Memory` node, whose output
//! depends on the previous round rather than the current one.

use crate::error::{GraphError, GraphResult};
use crate::genomic::function::{InputArity, NodeFunction, SignalContext};
use ahash::AHashMap;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Index of a node within its genome's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One node: a function plus explicit forward edges to its inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub function: NodeFunction,
    pub inputs: Vec<NodeId>,
}

/// The node arena of a genome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenomeGraph {
    nodes: Vec<Node>,
}

impl GenomeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node; returns its arena index.
    pub fn add_node(&mut self, function: NodeFunction, inputs: Vec<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { function, inputs });
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Memory nodes in arena order.
    pub fn memory_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.function.is_memory())
            .map(|(i, _)| NodeId(i as u32))
    }

    /// Derived reverse adjacency: for each node, the nodes consuming it.
    pub fn reverse_adjacency(&self) -> Vec<Vec<NodeId>> {
        let mut consumers = vec![Vec::new(); self.nodes.len()];
        for (i, node) in self.nodes.iter().enumerate() {
            for input in &node.inputs {
                consumers[input.index()].push(NodeId(i as u32));
            }
        }
        consumers
    }

    /// Validate structural rules:
    /// - all edges and outputs resolve within the arena
    /// - each node's input count matches its function's arity
    /// - the live dependency graph (memory outputs depend on history, not the
    ///   current round) is acyclic
    pub fn validate(&self, outputs: &[NodeId]) -> GraphResult<()> {
        if self.nodes.is_empty() {
            return Err(GraphError::MalformedGraph("empty node arena".to_string()));
        }
        if outputs.is_empty() {
            return Err(GraphError::MalformedGraph("no output nodes designated".to_string()));
        }
        for out in outputs {
            if out.index() >= self.nodes.len() {
                return Err(GraphError::MalformedGraph(format!(
                    "output {:?} outside arena of {} nodes",
                    out,
                    self.nodes.len()
                )));
            }
        }
        for (i, node) in self.nodes.iter().enumerate() {
            for input in &node.inputs {
                if input.index() >= self.nodes.len() {
                    return Err(GraphError::MalformedGraph(format!(
                        "node {} references input {:?} outside arena",
                        i, input
                    )));
                }
            }
            let arity_ok = match node.function.input_arity() {
                InputArity::None => node.inputs.is_empty(),
                InputArity::Exactly(n) => node.inputs.len() == n,
                InputArity::AtLeast(n) => node.inputs.len() >= n,
            };
            if !arity_ok {
                return Err(GraphError::MalformedGraph(format!(
                    "node {} ({:?}) has {} inputs",
                    i,
                    node.function,
                    node.inputs.len()
                )));
            }
        }
        self.evaluation_order()?;
        Ok(())
    }

    /// Topological order over live dependencies. Memory nodes have no live
    /// dependencies (their output is the previous round's recording), so a
    /// cycle is only legal if it passes through one.
    pub fn evaluation_order(&self) -> GraphResult<Vec<NodeId>> {
        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        let mut consumers = vec![Vec::new(); n];
        for (i, node) in self.nodes.iter().enumerate() {
            if node.function.is_memory() {
                continue;
            }
            for input in &node.inputs {
                in_degree[i] += 1;
                consumers[input.index()].push(i);
            }
        }

        let mut ready: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(i) = ready.pop() {
            order.push(NodeId(i as u32));
            for &c in &consumers[i] {
                in_degree[c] -= 1;
                if in_degree[c] == 0 {
                    ready.push(c);
                }
            }
        }
        if order.len() != n {
            return Err(GraphError::MalformedGraph(
                "live cycle not passing through a memory node".to_string(),
            ));
        }
        Ok(order)
    }

    /// Run one evaluation round. Returns every node's output value; memory
    /// recordings in `memory` are read for this round and overwritten with
    /// this round's recorded inputs afterwards.
    pub fn step(
        &self,
        sensors: &[f64],
        memory: &mut AHashMap<NodeId, f64>,
        rng: &mut dyn RngCore,
    ) -> GraphResult<Vec<f64>> {
        let order = self.evaluation_order()?;
        let mut values = vec![0.0f64; self.nodes.len()];
        let mut scratch = Vec::new();
        for id in order {
            let node = &self.nodes[id.index()];
            values[id.index()] = if node.function.is_memory() {
                memory.get(&id).copied().unwrap_or(0.0)
            } else {
                scratch.clear();
                scratch.extend(node.inputs.iter().map(|i| values[i.index()]));
                let mut ctx = SignalContext { sensors, rng };
                node.function.evaluate(&scratch, &mut ctx)
            };
        }
        for id in self.memory_nodes() {
            let recorded = values[self.nodes[id.index()].inputs[0].index()];
            memory.insert(id, recorded);
        }
        Ok(values)
    }
}
