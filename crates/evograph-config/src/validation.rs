// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Cross-field configuration validation

use crate::{ConfigError, ConfigResult, EvographConfig};

/// Validate a loaded configuration.
///
/// Checks the constraints the engine and ledger rely on:
/// - at least one worker thread
/// - `keep_top >= 1`
/// - enough offspring per generation to satisfy `keep_top` even if every
///   tracked legacy expires in the same generation
pub fn validate_config(config: &EvographConfig) -> ConfigResult<()> {
    if config.engine.worker_count == 0 {
        return Err(ConfigError::ValidationError(
            "engine.worker_count must be >= 1".to_string(),
        ));
    }
    if config.population.keep_top == 0 {
        return Err(ConfigError::ValidationError(
            "population.keep_top must be >= 1".to_string(),
        ));
    }
    if config.population.offspring_per_generation < config.population.keep_top {
        return Err(ConfigError::ValidationError(format!(
            "population.offspring_per_generation ({}) must be >= population.keep_top ({})",
            config.population.offspring_per_generation, config.population.keep_top
        )));
    }
    if config.snapshot.path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "snapshot.path must not be empty".to_string(),
        ));
    }
    Ok(())
}
