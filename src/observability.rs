// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Logging initialization for evograph processes.
//!
//! Library crates only emit `tracing` events; binaries and tests opt into a
//! subscriber here. The `EVOGRAPH_LOG` environment variable overrides the
//! configured filter.

use tracing_subscriber::EnvFilter;

/// Install the process-wide console subscriber. Safe to call more than
/// once; later calls are no-ops.
pub fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_env("EVOGRAPH_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
    {
        tracing::debug!("[OBSERVABILITY] console subscriber installed");
    }
}
