// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! The generation engine: one generation at a time.
//!
//! Flow per generation: take the ledger's current fittest set, request
//! offspring from the mutation factory, dispatch mutation tasks, then (once
//! mutants exist) one evaluation task per genome, then a secondary
//! legacy-retest wave for expiring records. All ledger mutation happens in
//! the single-threaded boundary phase after the waves drain.

use crate::cancel::CancellationToken;
use crate::error::{EngineError, EngineResult};
use crate::pool::{Job, WorkerPool};
use crate::task::{GenomeEvaluator, MutationFactory};
use crossbeam::channel::{unbounded, Receiver};
use evograph_config::EvographConfig;
use evograph_evolutionary::{EvolutionContext, PopulationLedger, SLOW_HASH_SET};
use evograph_structures::{Fitness, Genome};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// One evaluation task's result.
struct EvalOutcome {
    fitness: Fitness,
    /// Set when the verification digest recompute blew the configured budget
    slow_hash: Option<u64>,
}

pub struct GenerationEngine<E: GenomeEvaluator + 'static, M: MutationFactory> {
    pool: WorkerPool,
    evaluator: Arc<E>,
    factory: M,
    ledger: PopulationLedger,
    context: Arc<EvolutionContext>,
    config: EvographConfig,
    token: CancellationToken,
}

impl<E: GenomeEvaluator + 'static, M: MutationFactory> GenerationEngine<E, M> {
    pub fn new(
        config: EvographConfig,
        evaluator: Arc<E>,
        factory: M,
        ledger: PopulationLedger,
        context: EvolutionContext,
    ) -> Self {
        let token = CancellationToken::new();
        let pool = WorkerPool::new(config.engine.worker_count, token.clone());
        Self {
            pool,
            evaluator,
            factory,
            ledger,
            context: Arc::new(context),
            config,
            token,
        }
    }

    /// The shared exit signal; wire external shutdown requests to this.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn ledger(&self) -> &PopulationLedger {
        &self.ledger
    }

    pub fn context(&self) -> &EvolutionContext {
        &self.context
    }

    pub(crate) fn pool_mut(&mut self) -> &mut WorkerPool {
        &mut self.pool
    }

    pub(crate) fn parts(&self) -> (&PopulationLedger, &EvolutionContext) {
        (&self.ledger, &self.context)
    }

    /// Run generations until the count is reached or shutdown fires.
    pub fn run(&mut self, generations: u64) -> EngineResult<()> {
        for _ in 0..generations {
            let fittest = self.run_generation()?;
            debug!(
                "[GEN-ENGINE] generation {} complete, {} fittest tracked",
                self.context.current_generation(),
                fittest.len()
            );
        }
        Ok(())
    }

    /// Execute exactly one generation. Returns the new fittest set.
    pub fn run_generation(&mut self) -> EngineResult<Vec<Arc<Genome>>> {
        if self.token.is_cancelled() {
            return Err(EngineError::ShuttingDown);
        }
        let generation = self.context.advance_generation();
        let keep_top = self.config.population.keep_top;
        info!("[GEN-ENGINE] generation {} starting", generation);

        // Boundary phase read: workers hold no references into the ledger yet
        let fittest_in = self.ledger.fittest(keep_top);
        let historical = self.ledger.stored_fitnesses();
        let mutators = self.factory.make_offspring(
            self.config.population.offspring_per_generation,
            &fittest_in,
            &historical,
        );

        // Primary wave, part 1: mutation tasks
        let (offspring_tx, offspring_rx) = unbounded::<Vec<Arc<Genome>>>();
        let mut jobs = Vec::with_capacity(mutators.len());
        for (index, mutator) in mutators.into_iter().enumerate() {
            let tx = offspring_tx.clone();
            let context = self.context.clone();
            let cost = mutator.cost_estimate();
            jobs.push(Job::new(format!("mutate-{}", index), cost, move || {
                let mut mutator = mutator;
                match mutator.produce(&context) {
                    Ok(genomes) => {
                        let _ = tx.send(genomes);
                    }
                    Err(e) => error!("[GEN-ENGINE] mutation task {} failed: {}", index, e),
                }
            }));
        }
        drop(offspring_tx);
        self.pool.submit(jobs);
        // Exit flag is re-checked after every blocking point
        if !self.pool.drive_until_complete() || self.token.is_cancelled() {
            return self.abandon_generation(generation, None);
        }
        let offspring: Vec<Arc<Genome>> = offspring_rx.try_iter().flatten().collect();
        debug!(
            "[GEN-ENGINE] generation {}: {} offspring produced",
            generation,
            offspring.len()
        );

        // Primary wave, part 2: one evaluation task per mutant
        let (eval_tx, eval_rx) = unbounded::<EvalOutcome>();
        let slow_budget = Duration::from_millis(self.config.diagnostics.slow_hash_budget_ms);
        let mut jobs = Vec::with_capacity(offspring.len());
        for genome in &offspring {
            jobs.push(self.evaluation_job(genome.clone(), generation, eval_tx.clone(), slow_budget));
        }
        self.pool.submit(jobs);
        if !self.pool.drive_until_complete() || self.token.is_cancelled() {
            return self.abandon_generation(generation, Some(&eval_rx));
        }

        // Secondary wave: retest legacies whose retention is expiring.
        // Published only now, after the primary source is confirmed drained.
        let expiring = self.ledger.expiring(generation + 1);
        if !expiring.is_empty() {
            debug!(
                "[GEN-ENGINE] generation {}: retesting {} expiring legacies",
                generation,
                expiring.len()
            );
            let mut jobs = Vec::with_capacity(expiring.len());
            for genome in expiring {
                jobs.push(self.evaluation_job(genome, generation, eval_tx.clone(), slow_budget));
            }
            self.pool.submit(jobs);
            if !self.pool.drive_until_complete() || self.token.is_cancelled() {
                return self.abandon_generation(generation, Some(&eval_rx));
            }
        }
        drop(eval_tx);

        // Boundary phase: single-threaded ledger advancement
        let outcomes: Vec<EvalOutcome> = eval_rx.try_iter().collect();
        let fittest_out = self.advance_ledger(outcomes, keep_top, generation)?;
        info!(
            "[GEN-ENGINE] generation {} complete: {} fittest, {} tracked",
            generation,
            fittest_out.len(),
            self.ledger.len()
        );
        Ok(fittest_out)
    }

    fn evaluation_job(
        &self,
        genome: Arc<Genome>,
        generation: u64,
        tx: crossbeam::channel::Sender<EvalOutcome>,
        slow_budget: Duration,
    ) -> Job {
        let evaluator = self.evaluator.clone();
        let label = format!("evaluate-{}", genome.id().0);
        let cost = genome.graph().len() as u64;
        Job::new(label, cost, move || {
            // Verification digest recompute doubles as the slow-hash probe
            let started = Instant::now();
            let recomputed = genome.hasher().genome_digest(genome.outputs());
            let hash_elapsed = started.elapsed();
            if recomputed != genome.structural_hash() {
                error!(
                    "[GEN-ENGINE] genome {:?} digest drifted ({:#018x} != {:#018x}); skipping",
                    genome.id(),
                    recomputed,
                    genome.structural_hash()
                );
                return;
            }
            let slow_hash = (hash_elapsed > slow_budget).then(|| {
                warn!(
                    "[GEN-ENGINE] slow hash computation for {:?}: {:?}",
                    genome.id(),
                    hash_elapsed
                );
                genome.structural_hash()
            });
            match evaluator.evaluate(&genome, generation) {
                Ok(fitness) => {
                    let _ = tx.send(EvalOutcome { fitness, slow_hash });
                }
                Err(e) => {
                    error!(
                        "[GEN-ENGINE] evaluation of {:?} failed: {}; result absent",
                        genome.id(),
                        e
                    );
                }
            }
        })
    }

    /// Boundary-phase ledger advancement from collected outcomes.
    fn advance_ledger(
        &mut self,
        outcomes: Vec<EvalOutcome>,
        keep_top: usize,
        generation: u64,
    ) -> EngineResult<Vec<Arc<Genome>>> {
        let mut fitnesses = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            if let Some(hash) = outcome.slow_hash {
                self.ledger.aux_set_mut(SLOW_HASH_SET).insert(hash);
            }
            fitnesses.push(outcome.fitness);
        }
        let fittest_out = self.ledger.add_fittest(&fitnesses, keep_top, generation)?;
        self.ledger.cull_old(generation)?;
        Ok(fittest_out)
    }

    /// Shutdown fired mid-generation. Wait (bounded) for in-flight tasks and
    /// fold whatever results arrived into the ledger before bailing out.
    fn abandon_generation(
        &mut self,
        generation: u64,
        eval_rx: Option<&Receiver<EvalOutcome>>,
    ) -> EngineResult<Vec<Arc<Genome>>> {
        warn!(
            "[GEN-ENGINE] shutdown during generation {}; folding in-flight results",
            generation
        );
        // Queued-but-never-started tasks will produce nothing; release them
        // so the quiescence wait covers in-flight work only
        self.pool.discard_queued();
        if self.config.engine.skip_shutdown_wait {
            // Operator chose not to wait: diagnostics, then proceed without
            // the in-flight results
            self.pool.dump_diagnostics();
        } else {
            let grace = Duration::from_millis(self.config.engine.shutdown_grace_ms);
            if !self.pool.await_quiescence(grace) {
                self.pool.dump_diagnostics();
            }
        }
        if let Some(rx) = eval_rx {
            let mut folded = 0usize;
            for outcome in rx.try_iter() {
                let genome = outcome.fitness.genome.clone();
                self.ledger.add(genome.clone(), generation);
                self.ledger.set_fitness(genome.id(), outcome.fitness)?;
                if let Some(hash) = outcome.slow_hash {
                    self.ledger.aux_set_mut(SLOW_HASH_SET).insert(hash);
                }
                folded += 1;
            }
            info!(
                "[GEN-ENGINE] folded {} in-flight results before shutdown",
                folded
            );
        }
        Err(EngineError::ShuttingDown)
    }
}
