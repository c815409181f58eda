// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-population evolution context.
//!
//! Owns the generation counter and genome id issuance as explicit state
//! passed to scheduler/ledger calls, so multiple populations can run in one
//! process without cross-talk.

use evograph_structures::GenomeId;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct EvolutionContext {
    generation: AtomicU64,
    next_genome_id: AtomicU64,
}

impl EvolutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from a snapshot's counters.
    pub fn resume(generation: u64, next_genome_id: u64) -> Self {
        Self {
            generation: AtomicU64::new(generation),
            next_genome_id: AtomicU64::new(next_genome_id),
        }
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Advance to the next generation; returns the new generation number.
    pub fn advance_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Issue a fresh, never-reused genome id.
    pub fn issue_genome_id(&self) -> GenomeId {
        GenomeId(self.next_genome_id.fetch_add(1, Ordering::AcqRel))
    }

    /// Watermark for persistence: the next id that would be issued.
    pub fn next_genome_id_watermark(&self) -> u64 {
        self.next_genome_id.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_across_threads() {
        let ctx = std::sync::Arc::new(EvolutionContext::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let ctx = ctx.clone();
            handles.push(std::thread::spawn(move || {
                (0..100).map(|_| ctx.issue_genome_id().0).collect::<Vec<_>>()
            }));
        }
        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 400);
    }

    #[test]
    fn generation_advances_monotonically() {
        let ctx = EvolutionContext::new();
        assert_eq!(ctx.current_generation(), 0);
        assert_eq!(ctx.advance_generation(), 1);
        assert_eq!(ctx.advance_generation(), 2);
        assert_eq!(ctx.current_generation(), 2);
    }
}
