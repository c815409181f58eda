// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! Two-tier loading:
//! 1. TOML file (base defaults)
//! 2. Environment variables (runtime overrides)

use crate::{validate_config, ConfigError, ConfigResult, EvographConfig};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "evograph_configuration.toml";

/// Find the evograph configuration file
///
/// Search order:
/// 1. `EVOGRAPH_CONFIG_PATH` environment variable
/// 2. Current working directory
/// 3. Parent directories (up to 5 levels, for workspace roots)
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found.
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("EVOGRAPH_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by EVOGRAPH_CONFIG_PATH not found: {}",
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
        let mut current = cwd;
        for _ in 0..5 {
            match current.parent() {
                Some(parent) => {
                    search_paths.push(parent.join(CONFIG_FILE_NAME));
                    current = parent.to_path_buf();
                }
                None => break,
            }
        }
    }

    for path in &search_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "'{}' not found in any of these locations:\n{}\n\nSet EVOGRAPH_CONFIG_PATH to specify a custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from a TOML file, apply environment overrides, validate.
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, searches for one;
///   if none is found, falls back to built-in defaults.
pub fn load_config(config_path: Option<&Path>) -> ConfigResult<EvographConfig> {
    let mut config = match config_path {
        Some(path) => parse_file(path)?,
        None => match find_config_file() {
            Ok(path) => parse_file(&path)?,
            // No file anywhere: defaults are a complete, valid configuration
            Err(ConfigError::FileNotFound(_)) => EvographConfig::default(),
            Err(e) => return Err(e),
        },
    };

    apply_environment_overrides(&mut config);
    validate_config(&config)?;
    Ok(config)
}

fn parse_file(path: &Path) -> ConfigResult<EvographConfig> {
    let content = fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Apply `EVOGRAPH_*` environment variable overrides
///
/// Supported overrides:
/// - `EVOGRAPH_WORKER_COUNT`
/// - `EVOGRAPH_KEEP_TOP`
/// - `EVOGRAPH_OFFSPRING_PER_GENERATION`
/// - `EVOGRAPH_RETENTION_WINDOW`
/// - `EVOGRAPH_SNAPSHOT_PATH`
/// - `EVOGRAPH_SHUTDOWN_GRACE_MS`
/// - `EVOGRAPH_LOG`
pub fn apply_environment_overrides(config: &mut EvographConfig) {
    if let Some(v) = env_parse::<usize>("EVOGRAPH_WORKER_COUNT") {
        config.engine.worker_count = v;
    }
    if let Some(v) = env_parse::<usize>("EVOGRAPH_KEEP_TOP") {
        config.population.keep_top = v;
    }
    if let Some(v) = env_parse::<usize>("EVOGRAPH_OFFSPRING_PER_GENERATION") {
        config.population.offspring_per_generation = v;
    }
    if let Some(v) = env_parse::<u64>("EVOGRAPH_RETENTION_WINDOW") {
        config.population.retention_window = v;
    }
    if let Ok(v) = env::var("EVOGRAPH_SNAPSHOT_PATH") {
        config.snapshot.path = PathBuf::from(v);
    }
    if let Some(v) = env_parse::<u64>("EVOGRAPH_SHUTDOWN_GRACE_MS") {
        config.engine.shutdown_grace_ms = v;
    }
    if let Ok(v) = env::var("EVOGRAPH_LOG") {
        config.logging.filter = v;
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}
