// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! This module defines all configuration structs that map to sections in
//! `evograph_configuration.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EvographConfig {
    pub engine: EngineConfig,
    pub population: PopulationConfig,
    pub snapshot: SnapshotConfig,
    pub diagnostics: DiagnosticsConfig,
    pub logging: LoggingConfig,
}

/// Generation engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of long-lived worker threads (the driving thread participates
    /// in task execution on top of this count)
    pub worker_count: usize,
    /// Bounded wait for in-flight tasks during shutdown, in milliseconds
    pub shutdown_grace_ms: u64,
    /// Skip the shutdown grace period entirely (dump diagnostics and proceed)
    pub skip_shutdown_wait: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            shutdown_grace_ms: 5_000,
            skip_shutdown_wait: false,
        }
    }
}

/// Population and retention configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PopulationConfig {
    /// Number of distinct genomes selected as fittest each generation
    pub keep_top: usize,
    /// Offspring requested from the mutation factory per generation
    pub offspring_per_generation: usize,
    /// Generations a legacy survives without re-selection
    pub retention_window: u64,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            keep_top: 16,
            offspring_per_generation: 64,
            retention_window: 8,
        }
    }
}

/// Population snapshot persistence configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Where the population snapshot is written
    pub path: PathBuf,
    /// Bounded retries for the interactive save prompt on I/O error
    pub prompt_retries: u32,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./evograph_population.bin"),
            prompt_retries: 3,
        }
    }
}

/// Diagnostics configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Structural hash computations slower than this are recorded in the
    /// ledger's `slow_hash` auxiliary set
    pub slow_hash_budget_ms: u64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            slow_hash_budget_ms: 250,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter directive (overridden by `EVOGRAPH_LOG`)
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}
