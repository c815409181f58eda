// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! The closed set of node kinds a genome graph is built from.
//!
//! All arithmetic/transform variants live in one tagged enumeration with a
//! single `evaluate` dispatch; the structural-hash header table is a match
//! over the same tag.

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// Evaluation-time context for node kinds that read something other than
/// their graph inputs.
pub struct SignalContext<'a> {
    /// External sensor channels for the current round
    pub sensors: &'a [f64],
    /// Randomness source for `RandomSource` nodes
    pub rng: &'a mut dyn RngCore,
}

/// How many graph inputs a node kind accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputArity {
    None,
    Exactly(usize),
    AtLeast(usize),
}

/// A node's function: what it computes from its inputs each round.
///
/// Parametric variants (`Sensor`, `Constant`) carry their parameters here, so
/// function identity comparison covers parameters as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeFunction {
    /// Reads one external input channel
    Sensor { channel: u16 },
    /// Fixed value
    Constant { value: f64 },
    /// Fresh uniform sample in [0, 1) each round
    RandomSource,
    /// One-round delay element: outputs the value recorded from its single
    /// input on the previous round. The only node kind allowed to close a
    /// cycle in the graph.
    Memory,

    // Order-insensitive reducers
    Sum,
    Product,
    Min,
    Max,
    Mean,

    // Order-sensitive operators
    Difference,
    Quotient,
    Power,
    /// Gate(condition, then, else): selects `then` when condition > 0
    Gate,

    // Unary transforms
    Negate,
    Absolute,
    Sigmoid,
}

impl NodeFunction {
    /// Fixed type-tag header for structural hashing. One distinct constant
    /// per variant; parameters are mixed in by the hasher, not here.
    pub fn header_tag(&self) -> u64 {
        match self {
            NodeFunction::Sensor { .. } => 0x9AE1_6A3B_2F90_404F,
            NodeFunction::Constant { .. } => 0xC2B2_AE3D_27D4_EB4F,
            NodeFunction::RandomSource => 0x1656_67B1_9E37_79F9,
            NodeFunction::Memory => 0x8EBC_6AF0_9C88_C6E3,
            NodeFunction::Sum => 0xA076_1D64_78BD_642F,
            NodeFunction::Product => 0xE703_7ED1_A0B4_28DB,
            NodeFunction::Min => 0x8C0F_F2E9_5C8A_7F4D,
            NodeFunction::Max => 0xD6E8_FEB8_6659_FD93,
            NodeFunction::Mean => 0x5851_F42D_4C95_7F2D,
            NodeFunction::Difference => 0x2545_F491_4F6C_DD1D,
            NodeFunction::Quotient => 0x9E6C_63D0_76C6_4E8B,
            NodeFunction::Power => 0xB492_B66F_BE98_F273,
            NodeFunction::Gate => 0x6C62_272E_07BB_0142,
            NodeFunction::Negate => 0x27D4_EB2F_1656_67C5,
            NodeFunction::Absolute => 0x165A_85C9_13B2_C1F1,
            NodeFunction::Sigmoid => 0x3C79_AC49_2BA7_B653,
        }
    }

    /// Whether permutations of this node's inputs are structurally distinct.
    pub fn is_order_sensitive(&self) -> bool {
        matches!(
            self,
            NodeFunction::Difference | NodeFunction::Quotient | NodeFunction::Power | NodeFunction::Gate
        )
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, NodeFunction::Memory)
    }

    /// Whether this kind hashes to a header-derived value with no recursion
    /// into inputs.
    pub fn is_hash_leaf(&self) -> bool {
        matches!(
            self,
            NodeFunction::Sensor { .. }
                | NodeFunction::Constant { .. }
                | NodeFunction::RandomSource
                | NodeFunction::Memory
        )
    }

    pub fn input_arity(&self) -> InputArity {
        match self {
            NodeFunction::Sensor { .. } | NodeFunction::Constant { .. } | NodeFunction::RandomSource => {
                InputArity::None
            }
            NodeFunction::Memory => InputArity::Exactly(1),
            NodeFunction::Sum
            | NodeFunction::Product
            | NodeFunction::Min
            | NodeFunction::Max
            | NodeFunction::Mean => InputArity::AtLeast(1),
            NodeFunction::Difference | NodeFunction::Quotient | NodeFunction::Power => InputArity::Exactly(2),
            NodeFunction::Gate => InputArity::Exactly(3),
            NodeFunction::Negate | NodeFunction::Absolute | NodeFunction::Sigmoid => InputArity::Exactly(1),
        }
    }

    /// Compute this node's output for the current round.
    ///
    /// `Memory` is not evaluated here: the graph stepper substitutes the
    /// recorded previous-round value before dispatch.
    pub fn evaluate(&self, inputs: &[f64], ctx: &mut SignalContext<'_>) -> f64 {
        let finite = |v: f64| if v.is_finite() { v } else { 0.0 };
        match self {
            NodeFunction::Sensor { channel } => {
                ctx.sensors.get(*channel as usize).copied().unwrap_or(0.0)
            }
            NodeFunction::Constant { value } => *value,
            NodeFunction::RandomSource => ctx.rng.gen::<f64>(),
            NodeFunction::Memory => 0.0,
            NodeFunction::Sum => inputs.iter().sum(),
            NodeFunction::Product => inputs.iter().product(),
            NodeFunction::Min => inputs.iter().copied().fold(f64::INFINITY, f64::min),
            NodeFunction::Max => inputs.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            NodeFunction::Mean => inputs.iter().sum::<f64>() / inputs.len() as f64,
            NodeFunction::Difference => inputs[0] - inputs[1],
            NodeFunction::Quotient => {
                if inputs[1] == 0.0 {
                    0.0
                } else {
                    finite(inputs[0] / inputs[1])
                }
            }
            NodeFunction::Power => finite(inputs[0].powf(inputs[1])),
            NodeFunction::Gate => {
                if inputs[0] > 0.0 {
                    inputs[1]
                } else {
                    inputs[2]
                }
            }
            NodeFunction::Negate => -inputs[0],
            NodeFunction::Absolute => inputs[0].abs(),
            NodeFunction::Sigmoid => 1.0 / (1.0 + (-inputs[0]).exp()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    fn eval(f: NodeFunction, inputs: &[f64]) -> f64 {
        let mut rng = StepRng::new(0, 1);
        let mut ctx = SignalContext {
            sensors: &[0.5, 1.5],
            rng: &mut rng,
        };
        f.evaluate(inputs, &mut ctx)
    }

    #[test]
    fn header_tags_are_distinct() {
        let all = [
            NodeFunction::Sensor { channel: 0 },
            NodeFunction::Constant { value: 0.0 },
            NodeFunction::RandomSource,
            NodeFunction::Memory,
            NodeFunction::Sum,
            NodeFunction::Product,
            NodeFunction::Min,
            NodeFunction::Max,
            NodeFunction::Mean,
            NodeFunction::Difference,
            NodeFunction::Quotient,
            NodeFunction::Power,
            NodeFunction::Gate,
            NodeFunction::Negate,
            NodeFunction::Absolute,
            NodeFunction::Sigmoid,
        ];
        let mut tags: Vec<u64> = all.iter().map(|f| f.header_tag()).collect();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), all.len());
    }

    #[test]
    fn protected_quotient() {
        assert_eq!(eval(NodeFunction::Quotient, &[3.0, 0.0]), 0.0);
        assert_eq!(eval(NodeFunction::Quotient, &[6.0, 2.0]), 3.0);
    }

    #[test]
    fn gate_selects_by_condition() {
        assert_eq!(eval(NodeFunction::Gate, &[1.0, 7.0, 9.0]), 7.0);
        assert_eq!(eval(NodeFunction::Gate, &[-1.0, 7.0, 9.0]), 9.0);
    }

    #[test]
    fn sensor_reads_channel() {
        assert_eq!(eval(NodeFunction::Sensor { channel: 1 }, &[]), 1.5);
        // Out-of-range channels read as silence
        assert_eq!(eval(NodeFunction::Sensor { channel: 9 }, &[]), 0.0);
    }
}
