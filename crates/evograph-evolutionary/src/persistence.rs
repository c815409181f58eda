// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Population snapshot persistence (save/load)
//!
//! Uses `serde` + bincode for fast binary serialization. The snapshot
//! carries the ledger's legacy records, its hash index and its named
//! auxiliary sets; transient caches (kinship memos, hash memos) are rebuilt
//! on demand after load.
//!
//! Load validates the two protected seed genomes by structural-hash match,
//! aggregating the rating of any duplicated seed records, and aborts on
//! mismatch.

use crate::context::EvolutionContext;
use crate::ledger::{PopulationLedger, RetentionPolicy};
use crate::types::{EvoError, EvoResult};
use evograph_structures::{Fitness, Genome, GenomeGraph, GenomeId, Lineage, NodeId};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LineageSnapshot {
    hash: u64,
    generations_count: f64,
    /// Flattened weighted ancestry, self first
    ancestry: Vec<(u64, f64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GenomeSnapshot {
    id: u64,
    birth_generation: u64,
    graph: GenomeGraph,
    outputs: Vec<NodeId>,
    lineage: LineageSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FitnessSnapshot {
    score: f64,
    generation: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordSnapshot {
    genome: GenomeSnapshot,
    generation_rating: i64,
    fitness: Option<FitnessSnapshot>,
}

/// Serializable capture of a whole population.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationSnapshot {
    version: u32,
    generation: u64,
    next_genome_id: u64,
    records: Vec<RecordSnapshot>,
    hash_index: Vec<(u64, Vec<u64>)>,
    protected: Vec<u64>,
    aux_sets: Vec<(String, Vec<u64>)>,
}

impl PopulationSnapshot {
    /// Capture the ledger and context. Called only from the single-threaded
    /// generation boundary or the shutdown path.
    pub fn capture(ledger: &PopulationLedger, context: &EvolutionContext) -> Self {
        let mut records: Vec<RecordSnapshot> = ledger
            .records()
            .map(|record| RecordSnapshot {
                genome: GenomeSnapshot {
                    id: record.genome.id().0,
                    birth_generation: record.genome.birth_generation(),
                    graph: record.genome.graph().clone(),
                    outputs: record.genome.outputs().to_vec(),
                    lineage: LineageSnapshot {
                        hash: record.genome.lineage().hash(),
                        generations_count: record.genome.lineage().generations_count(),
                        ancestry: record.genome.lineage().ancestry().to_vec(),
                    },
                },
                generation_rating: record.generation_rating,
                fitness: record.fitness.as_ref().map(|f| FitnessSnapshot {
                    score: f.score,
                    generation: f.generation,
                }),
            })
            .collect();
        records.sort_by_key(|r| r.genome.id);

        let mut hash_index: Vec<(u64, Vec<u64>)> = ledger
            .indexed_hashes()
            .map(|hash| {
                let mut ids: Vec<u64> = ledger
                    .genomes_by_hash(hash)
                    .iter()
                    .map(|g| g.id().0)
                    .collect();
                ids.sort_unstable();
                (hash, ids)
            })
            .collect();
        hash_index.sort_unstable_by_key(|(h, _)| *h);

        let mut protected: Vec<u64> = ledger.protected_hashes().iter().copied().collect();
        protected.sort_unstable();

        let aux_sets: Vec<(String, Vec<u64>)> = ledger
            .aux_sets()
            .iter()
            .map(|(name, values)| (name.clone(), values.iter().copied().collect()))
            .collect();

        Self {
            version: SNAPSHOT_VERSION,
            generation: context.current_generation(),
            next_genome_id: context.next_genome_id_watermark(),
            records,
            hash_index,
            protected,
            aux_sets,
        }
    }

    /// Save snapshot to file
    pub fn save_to_file(&self, path: &Path) -> EvoResult<()> {
        let encoded = bincode::serialize(self)
            .map_err(|e| EvoError::SnapshotIo(format!("Serialize failed: {}", e)))?;
        std::fs::write(path, encoded)
            .map_err(|e| EvoError::SnapshotIo(format!("Write failed: {}", e)))?;
        info!(
            "[SNAPSHOT] saved {} records to {}",
            self.records.len(),
            path.display()
        );
        Ok(())
    }

    /// Load snapshot from file
    pub fn load_from_file(path: &Path) -> EvoResult<Self> {
        let data = std::fs::read(path)
            .map_err(|e| EvoError::SnapshotIo(format!("Read failed: {}", e)))?;
        let snapshot: Self = bincode::deserialize(&data)
            .map_err(|e| EvoError::SnapshotIo(format!("Deserialize failed: {}", e)))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(EvoError::SnapshotRejected(format!(
                "snapshot version {} unsupported (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }
        Ok(snapshot)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Rebuild the ledger and context.
    ///
    /// Each genome is revalidated and rehashed; a structural hash that no
    /// longer matches its persisted lineage rejects the snapshot. Both
    /// protected `seeds` must resolve by structural-hash match; duplicated
    /// seed records are merged, their ratings summed (clamped to the current
    /// generation).
    pub fn restore(
        self,
        policy: Box<dyn RetentionPolicy>,
        seeds: [&Arc<Genome>; 2],
    ) -> EvoResult<(PopulationLedger, EvolutionContext)> {
        let mut ledger = PopulationLedger::new(policy);
        let generation = self.generation;

        for record in self.records {
            let lineage = Lineage::restored(
                record.genome.lineage.hash,
                record.genome.lineage.generations_count,
                record.genome.lineage.ancestry,
            )
            .map_err(|e| EvoError::SnapshotRejected(e.to_string()))?;
            let genome = Genome::restore(
                GenomeId(record.genome.id),
                record.genome.birth_generation,
                record.genome.graph,
                record.genome.outputs,
                lineage,
            )
            .map_err(|e| EvoError::SnapshotRejected(e.to_string()))?;
            let fitness = record
                .fitness
                .map(|f| Fitness::new(f.score, genome.clone(), f.generation));
            if record.generation_rating > generation as i64 {
                return Err(EvoError::SnapshotRejected(format!(
                    "record {:?} rated {} beyond generation {}",
                    genome.id(),
                    record.generation_rating,
                    generation
                )));
            }
            ledger.insert_restored(genome, record.generation_rating, fitness)?;
        }

        for (hash, ids) in self.hash_index {
            ledger.restore_index_entry(hash, ids.into_iter().map(GenomeId).collect());
        }
        for (name, values) in self.aux_sets {
            ledger.restore_aux_set(name, values);
        }
        for hash in self.protected {
            ledger.protect(hash);
        }

        for seed in seeds {
            validate_seed(&mut ledger, seed, generation)?;
        }

        let context = EvolutionContext::resume(generation, self.next_genome_id);
        info!(
            "[SNAPSHOT] restored {} records at generation {}",
            ledger.len(),
            generation
        );
        Ok((ledger, context))
    }
}

/// A protected seed must be present by structural-hash match. Duplicated
/// records collapse into the lowest-id one, ratings summed and clamped.
fn validate_seed(
    ledger: &mut PopulationLedger,
    seed: &Arc<Genome>,
    generation: u64,
) -> EvoResult<()> {
    let hash = seed.structural_hash();
    let mut owners: Vec<GenomeId> = ledger.genomes_by_hash(hash).iter().map(|g| g.id()).collect();
    if owners.is_empty() {
        return Err(EvoError::SnapshotRejected(format!(
            "protected seed genome {:#018x} missing from snapshot",
            hash
        )));
    }
    owners.sort_unstable();

    if owners.len() > 1 {
        warn!(
            "[SNAPSHOT] protected seed {:#018x} duplicated {} times; aggregating ratings",
            hash,
            owners.len()
        );
        let mut aggregate: i64 = 0;
        for id in &owners {
            aggregate = aggregate.saturating_add(
                ledger
                    .record(*id)
                    .map(|r| r.generation_rating)
                    .unwrap_or(0),
            );
        }
        let aggregate = aggregate.min(generation as i64);
        let keeper = owners[0];
        for id in &owners[1..] {
            ledger.remove_record(*id);
        }
        ledger.set_rating(keeper, aggregate)?;
    }

    ledger.protect(hash);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::GenerationWindow;
    use evograph_structures::{GenomeGraph, NodeFunction, Parentage};

    fn genome(id: u64, value: f64, birth: u64) -> Arc<Genome> {
        let mut g = GenomeGraph::new();
        let c = g.add_node(NodeFunction::Constant { value }, vec![]);
        let s = g.add_node(NodeFunction::Sensor { channel: 0 }, vec![]);
        let out = g.add_node(NodeFunction::Product, vec![c, s]);
        Genome::new(GenomeId(id), birth, g, vec![out], Parentage::Root).unwrap()
    }

    fn window(w: u64) -> Box<GenerationWindow> {
        Box::new(GenerationWindow { window: w })
    }

    #[test]
    fn snapshot_roundtrip_preserves_ratings_and_index() {
        let seed_a = genome(0, 100.0, 0);
        let seed_b = genome(1, 200.0, 0);

        let mut ledger = PopulationLedger::new(window(8));
        ledger.add(seed_a.clone(), 0);
        ledger.add(seed_b.clone(), 0);
        ledger.protect(seed_a.structural_hash());
        ledger.protect(seed_b.structural_hash());

        let extra = genome(2, 3.5, 2);
        ledger.add(extra.clone(), 2);
        ledger
            .set_fitness(extra.id(), Fitness::new(7.0, extra.clone(), 2))
            .unwrap();
        ledger.aux_set_mut(crate::ledger::SLOW_HASH_SET).insert(extra.structural_hash());

        let context = EvolutionContext::resume(3, 10);
        let snapshot = PopulationSnapshot::capture(&ledger, &context);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("population.bin");
        snapshot.save_to_file(&path).unwrap();

        let loaded = PopulationSnapshot::load_from_file(&path).unwrap();
        let (restored, restored_context) =
            loaded.restore(window(8), [&seed_a, &seed_b]).unwrap();

        assert_eq!(restored.len(), ledger.len());
        assert_eq!(restored_context.current_generation(), 3);
        assert_eq!(restored_context.next_genome_id_watermark(), 10);

        // (genome -> rating) map agrees
        for record in ledger.records() {
            let restored_record = restored.record(record.genome.id()).unwrap();
            assert_eq!(
                restored_record.generation_rating,
                record.generation_rating
            );
            assert_eq!(
                restored_record.genome.structural_hash(),
                record.genome.structural_hash()
            );
        }
        // hash index agrees
        for genome in [&seed_a, &seed_b, &extra] {
            assert_eq!(
                restored.genomes_by_hash(genome.structural_hash()).len(),
                1
            );
        }
        // auxiliary sets survive
        assert!(restored
            .aux_sets()
            .get(crate::ledger::SLOW_HASH_SET)
            .unwrap()
            .contains(&extra.structural_hash()));
        // fitness survives
        assert_eq!(
            restored.record(extra.id()).unwrap().fitness.as_ref().unwrap().score,
            7.0
        );
    }

    #[test]
    fn load_aborts_on_missing_seed() {
        let seed_a = genome(0, 100.0, 0);
        let seed_b = genome(1, 200.0, 0);
        let stranger = genome(9, 42.0, 0);

        let mut ledger = PopulationLedger::new(window(8));
        ledger.add(seed_a.clone(), 0);
        let context = EvolutionContext::new();
        let snapshot = PopulationSnapshot::capture(&ledger, &context);

        assert!(matches!(
            snapshot.clone().restore(window(8), [&seed_a, &seed_b]),
            Err(EvoError::SnapshotRejected(_))
        ));
        assert!(matches!(
            snapshot.restore(window(8), [&stranger, &seed_a]),
            Err(EvoError::SnapshotRejected(_))
        ));
    }

    #[test]
    fn duplicated_seed_ratings_aggregate() {
        let seed_a = genome(0, 100.0, 0);
        let seed_b = genome(1, 200.0, 0);
        // Same wiring as seed_a, different id: a duplicate record
        let duplicate = genome(5, 100.0, 1);
        assert_eq!(duplicate.structural_hash(), seed_a.structural_hash());

        let mut ledger = PopulationLedger::new(window(8));
        ledger.add(seed_a.clone(), 1);
        ledger.add(seed_b.clone(), 1);
        ledger.add(duplicate.clone(), 2);

        let context = EvolutionContext::resume(6, 10);
        let snapshot = PopulationSnapshot::capture(&ledger, &context);
        let (restored, _) = snapshot.restore(window(8), [&seed_a, &seed_b]).unwrap();

        // One surviving record for the seed hash, rating 1 + 2 = 3
        let owners = restored.genomes_by_hash(seed_a.structural_hash());
        assert_eq!(owners.len(), 1);
        assert_eq!(
            restored.record(owners[0].id()).unwrap().generation_rating,
            3
        );
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("population.bin");
        let snapshot = PopulationSnapshot {
            version: SNAPSHOT_VERSION + 1,
            generation: 0,
            next_genome_id: 0,
            records: vec![],
            hash_index: vec![],
            protected: vec![],
            aux_sets: vec![],
        };
        let encoded = bincode::serialize(&snapshot).unwrap();
        std::fs::write(&path, encoded).unwrap();
        assert!(matches!(
            PopulationSnapshot::load_from_file(&path),
            Err(EvoError::SnapshotRejected(_))
        ));
    }
}
