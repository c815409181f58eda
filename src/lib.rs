// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # evograph - Evolution of Graph-Structured Computation Networks
//!
//! evograph evolves a population of graph-structured computation networks
//! ("genomes") via mutation and selection, distributing fitness evaluation
//! across worker threads and persisting a multi-generation population
//! ledger.
//!
//! ## Components
//!
//! - **`structures`** - genome node graphs, the closed node-function
//!   enumeration, lineage/kinship, cycle-safe structural hashing
//! - **`evolutionary`** - the population retention ledger, retention
//!   policies and snapshot persistence
//! - **`engine`** - the concurrent generation driver: worker pool,
//!   longest-task-first dispatch, completion barrier, graceful shutdown
//! - **`config`** - TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use evograph::prelude::*;
//! use std::sync::Arc;
//!
//! # struct MyEvaluator;
//! # impl GenomeEvaluator for MyEvaluator {
//! #     fn evaluate(&self, genome: &Arc<Genome>, generation: u64)
//! #         -> Result<Fitness, evograph::engine::EngineError> {
//! #         Ok(Fitness::new(0.0, genome.clone(), generation))
//! #     }
//! # }
//! # struct MyFactory;
//! # impl MutationFactory for MyFactory {
//! #     fn make_offspring(&mut self, _: usize, _: &[Arc<Genome>], _: &[Fitness])
//! #         -> Vec<Box<dyn Mutator>> { Vec::new() }
//! # }
//! let config = evograph::config::load_config(None).expect("config");
//! let window = config.population.retention_window;
//! let ledger = PopulationLedger::new(Box::new(GenerationWindow { window }));
//! let mut engine = GenerationEngine::new(
//!     config,
//!     Arc::new(MyEvaluator),
//!     MyFactory,
//!     ledger,
//!     EvolutionContext::new(),
//! );
//! engine.run(100).expect("evolution run");
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use evograph_config as config;
pub use evograph_engine as engine;
pub use evograph_evolutionary as evolutionary;
pub use evograph_structures as structures;

pub mod observability;

/// Commonly used items.
pub mod prelude {
    pub use evograph_config::EvographConfig;
    pub use evograph_engine::{
        CancellationToken, GenerationEngine, GenomeEvaluator, MutationFactory, Mutator,
        SavePrompt, ShutdownOptions,
    };
    pub use evograph_evolutionary::{
        EvolutionContext, GenerationWindow, PopulationLedger, PopulationSnapshot,
        RetentionPolicy,
    };
    pub use evograph_structures::{
        Fitness, Genome, GenomeGraph, GenomeId, Lineage, NodeFunction, NodeId, Parentage,
    };
}
