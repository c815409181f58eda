// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Full pipeline: evolve, snapshot, restore with protected seeds, continue.

use evograph::prelude::*;
use evograph_engine::EngineResult;
use evograph_evolutionary::EvoError;
use std::sync::Arc;

fn constant_genome(context: &EvolutionContext, value: f64, generation: u64) -> Arc<Genome> {
    let mut g = GenomeGraph::new();
    let c = g.add_node(NodeFunction::Constant { value }, vec![]);
    let s = g.add_node(NodeFunction::Sensor { channel: 0 }, vec![]);
    let out = g.add_node(NodeFunction::Sum, vec![c, s]);
    Genome::new(context.issue_genome_id(), generation, g, vec![out], Parentage::Root).unwrap()
}

fn constant_of(genome: &Genome) -> f64 {
    genome
        .graph()
        .nodes()
        .iter()
        .find_map(|n| match n.function {
            NodeFunction::Constant { value } => Some(value),
            _ => None,
        })
        .unwrap_or(0.0)
}

struct ConstantEvaluator;

impl GenomeEvaluator for ConstantEvaluator {
    fn evaluate(
        &self,
        genome: &Arc<Genome>,
        generation: u64,
    ) -> EngineResult<Fitness> {
        Ok(Fitness::new(constant_of(genome), genome.clone(), generation))
    }
}

struct BatchMutator {
    base: f64,
    count: usize,
}

impl Mutator for BatchMutator {
    fn cost_estimate(&self) -> u64 {
        self.count as u64
    }

    fn produce(&mut self, context: &EvolutionContext) -> EngineResult<Vec<Arc<Genome>>> {
        let generation = context.current_generation();
        Ok((0..self.count)
            .map(|i| constant_genome(context, self.base + i as f64, generation))
            .collect())
    }
}

struct RisingFactory {
    base: f64,
}

impl MutationFactory for RisingFactory {
    fn make_offspring(
        &mut self,
        count: usize,
        _fittest: &[Arc<Genome>],
        _historical: &[Fitness],
    ) -> Vec<Box<dyn Mutator>> {
        self.base += 10.0;
        vec![Box::new(BatchMutator {
            base: self.base,
            count,
        })]
    }
}

fn small_config() -> EvographConfig {
    let mut config = EvographConfig::default();
    config.engine.worker_count = 2;
    config.population.keep_top = 2;
    config.population.offspring_per_generation = 3;
    config.population.retention_window = 4;
    config
}

#[test]
fn evolve_snapshot_restore_continue() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("population.bin");

    let context = EvolutionContext::new();
    let seed_a = constant_genome(&context, 1_000.0, 0);
    let seed_b = constant_genome(&context, 2_000.0, 0);

    let mut ledger = PopulationLedger::new(Box::new(GenerationWindow { window: 4 }));
    ledger.add(seed_a.clone(), 0);
    ledger.add(seed_b.clone(), 0);
    ledger.protect(seed_a.structural_hash());
    ledger.protect(seed_b.structural_hash());

    let mut engine = GenerationEngine::new(
        small_config(),
        Arc::new(ConstantEvaluator),
        RisingFactory { base: 0.0 },
        ledger,
        context,
    );
    engine.run(2).unwrap();

    let snapshot = PopulationSnapshot::capture(engine.ledger(), engine.context());
    snapshot.save_to_file(&path).unwrap();

    // Reload and verify the (genome -> rating) view survived
    let loaded = PopulationSnapshot::load_from_file(&path).unwrap();
    let (restored, restored_context) = loaded
        .restore(Box::new(GenerationWindow { window: 4 }), [&seed_a, &seed_b])
        .unwrap();

    assert_eq!(restored.len(), engine.ledger().len());
    assert_eq!(restored_context.current_generation(), 2);
    for record in engine.ledger().records() {
        let restored_record = restored.record(record.genome.id()).unwrap();
        assert_eq!(restored_record.generation_rating, record.generation_rating);
    }
    for hash in engine.ledger().indexed_hashes() {
        assert!(restored.hash_indexed(hash));
    }

    // The restored population keeps evolving
    let mut engine2 = GenerationEngine::new(
        small_config(),
        Arc::new(ConstantEvaluator),
        RisingFactory { base: 100.0 },
        restored,
        restored_context,
    );
    engine2.run(1).unwrap();
    assert_eq!(engine2.context().current_generation(), 3);
    let best = engine2.ledger().fittest(1);
    assert_eq!(constant_of(&best[0]), 112.0);
}

#[test]
fn restore_rejects_wrong_seed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("population.bin");

    let context = EvolutionContext::new();
    let seed_a = constant_genome(&context, 1_000.0, 0);
    let seed_b = constant_genome(&context, 2_000.0, 0);
    let imposter = constant_genome(&context, 3_000.0, 0);

    let mut ledger = PopulationLedger::new(Box::new(GenerationWindow { window: 4 }));
    ledger.add(seed_a.clone(), 0);
    ledger.add(seed_b.clone(), 0);
    ledger.protect(seed_a.structural_hash());
    ledger.protect(seed_b.structural_hash());

    let snapshot = PopulationSnapshot::capture(&ledger, &context);
    snapshot.save_to_file(&path).unwrap();

    let loaded = PopulationSnapshot::load_from_file(&path).unwrap();
    assert!(matches!(
        loaded.restore(Box::new(GenerationWindow { window: 4 }), [&seed_a, &imposter]),
        Err(EvoError::SnapshotRejected(_))
    ));
}
