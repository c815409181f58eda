// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
# evograph Population Management

Handles population-level operations for evograph:

- The generational retention ledger (`PopulationLedger`) with pluggable
  keep/promote policies
- Hash-indexed duplicate/collision bookkeeping
- Snapshot persistence (save/load with protected-seed validation)
- The evolution context (generation counter + genome id issuance)

## Separation of Concerns

```text
evograph-structures          evograph-evolutionary       evograph-engine
───────────────────          ─────────────────────       ───────────────
│ Genome graphs      │   →   │ Retention ledger   │  →   │ Worker pool     │
│ Structural hashing │       │ Retention policies │      │ Generation loop │
│ Lineage & kinship  │       │ Snapshot I/O       │      │ Shutdown        │
└────────────────────┘       └────────────────────┘      └─────────────────┘
```
*/

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod context;
pub mod ledger;
pub mod persistence;
pub mod types;

pub use context::EvolutionContext;
pub use ledger::{GenerationWindow, LegacyRecord, PopulationLedger, RetentionPolicy, SLOW_HASH_SET};
pub use persistence::{PopulationSnapshot, SNAPSHOT_VERSION};
pub use types::{EvoError, EvoResult};
