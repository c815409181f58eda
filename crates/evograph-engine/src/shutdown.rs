// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Shutdown choreography: stop the pool, then offer to save the population.
//!
//! The save prompt is interactive yes/no with bounded retry on I/O error,
//! defaulting to save-and-exit after repeated failures. Failure to save is
//! never fatal to the shutdown path itself.

use crate::generation::GenerationEngine;
use crate::task::{GenomeEvaluator, MutationFactory};
use evograph_evolutionary::PopulationSnapshot;
use std::io::{BufRead, Write};
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

/// Operator-facing yes/no prompt. Implementations outside tests read the
/// console; tests drive it directly.
pub trait SavePrompt {
    /// Whether to save before exit. `Err` means the prompt itself failed
    /// (I/O error) and may be retried.
    fn confirm_save(&mut self) -> std::io::Result<bool>;
}

/// Console-backed prompt.
#[derive(Debug, Default)]
pub struct StdinPrompt;

impl SavePrompt for StdinPrompt {
    fn confirm_save(&mut self) -> std::io::Result<bool> {
        let mut stdout = std::io::stdout();
        write!(stdout, "Save population before exit? [y/n]: ")?;
        stdout.flush()?;
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        match line.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => Ok(true),
            "n" | "no" => Ok(false),
            other => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("unrecognized answer '{}'", other),
            )),
        }
    }
}

/// How the shutdown path behaves.
#[derive(Debug, Clone)]
pub struct ShutdownOptions {
    /// Bounded wait for in-flight tasks before giving up on them
    pub grace: Duration,
    /// Skip the wait entirely: dump diagnostics and proceed
    pub skip_wait: bool,
    /// Bounded retries for a failing save prompt
    pub prompt_retries: u32,
}

impl Default for ShutdownOptions {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(5),
            skip_wait: false,
            prompt_retries: 3,
        }
    }
}

impl<E: GenomeEvaluator + 'static, M: MutationFactory> GenerationEngine<E, M> {
    /// Full graceful shutdown: signal exit, stop the pool (bounded), then
    /// run the save prompt. Never panics and never refuses to exit.
    pub fn shutdown(
        &mut self,
        prompt: &mut dyn SavePrompt,
        options: &ShutdownOptions,
        snapshot_path: &Path,
    ) {
        info!("[SHUTDOWN] exit signalled");
        self.cancellation_token().cancel();

        if options.skip_wait {
            self.pool_mut().dump_diagnostics();
        } else if !self.pool_mut().await_quiescence(options.grace) {
            self.pool_mut().dump_diagnostics();
        }
        let grace = options.grace;
        self.pool_mut().shutdown(grace);

        let save = resolve_save_choice(prompt, options.prompt_retries);
        if save {
            let (ledger, context) = self.parts();
            let snapshot = PopulationSnapshot::capture(ledger, context);
            match snapshot.save_to_file(snapshot_path) {
                Ok(()) => info!("[SHUTDOWN] population saved to {}", snapshot_path.display()),
                // Failure to save is never fatal to the shutdown path
                Err(e) => error!("[SHUTDOWN] save failed, exiting anyway: {}", e),
            }
        } else {
            info!("[SHUTDOWN] exiting without saving");
        }
    }
}

/// Bounded-retry prompt resolution; repeated failures default to
/// save-and-exit rather than hanging.
fn resolve_save_choice(prompt: &mut dyn SavePrompt, retries: u32) -> bool {
    let mut attempts = 0u32;
    loop {
        match prompt.confirm_save() {
            Ok(choice) => return choice,
            Err(e) => {
                attempts += 1;
                warn!(
                    "[SHUTDOWN] save prompt failed (attempt {}/{}): {}",
                    attempts, retries, e
                );
                if attempts >= retries {
                    info!("[SHUTDOWN] prompt kept failing; defaulting to save-and-exit");
                    return true;
                }
            }
        }
    }
}
