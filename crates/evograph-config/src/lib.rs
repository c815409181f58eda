// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # evograph Configuration System
//!
//! Type-safe configuration loader for evograph with support for:
//! - TOML file parsing
//! - Environment variable overrides
//! - Validation of cross-field constraints
//!
//! ## Usage
//!
//! ```rust,no_run
//! use evograph_config::load_config;
//!
//! let config = load_config(None).expect("Failed to load config");
//! println!("Workers: {}", config.engine.worker_count);
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod loader;
pub mod types;
pub mod validation;

pub use loader::{apply_environment_overrides, find_config_file, load_config};
pub use types::*;
pub use validation::validate_config;

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found. Searched: {0}")]
    FileNotFound(String),

    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax: {0}")]
    ParseError(String),

    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Result alias for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
