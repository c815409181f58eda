// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Ancestry chains/trees over structural hashes, with memoized symmetric
//! kinship scoring.
//!
//! Pairwise kinship results are cached per unordered pair. Either lineage may
//! initiate the computation from a different thread, so a total order over
//! lineages designates a primary and a secondary for any pair; only the
//! primary's lock is ever acquired, which removes lock-order inversion as a
//! deadlock source. A thread that loses the race to populate the cache blocks
//! on the primary's condition variable until the winner publishes.

use crate::error::{GraphError, GraphResult};
use ahash::AHashMap;
use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::sync::Arc;

/// How a lineage connects to the previous generation.
#[derive(Debug)]
pub enum Parentage {
    /// A seed genome with no ancestors
    Root,
    SingleParent(Arc<Lineage>),
    /// Weighted multi-parent merge; weights must be finite and positive
    MultiParent(Vec<(Arc<Lineage>, f64)>),
    /// Rebuilt from a snapshot: the flattened ancestry table was persisted
    /// instead of the parent links
    Restored,
}

#[derive(Clone, Copy)]
enum KinshipSlot {
    InProgress,
    Done(f64),
}

type KinshipKey = (u64, u64);

/// Ancestry of one genome: its structural hash, its real-valued generation
/// depth, and a lazily built weighted ancestry table (self first).
pub struct Lineage {
    hash: u64,
    generations_count: f64,
    parentage: Parentage,
    /// (ancestor hash, weighted contribution), self first with 1.0
    ancestry: OnceCell<Vec<(u64, f64)>>,
    kinship: Mutex<AHashMap<KinshipKey, KinshipSlot>>,
    kinship_published: Condvar,
}

impl std::fmt::Debug for Lineage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lineage")
            .field("hash", &self.hash)
            .field("generations_count", &self.generations_count)
            .finish()
    }
}

impl Lineage {
    pub fn new(hash: u64, parentage: Parentage) -> GraphResult<Arc<Self>> {
        let generations_count = match &parentage {
            Parentage::Root | Parentage::Restored => 1.0,
            Parentage::SingleParent(p) => 1.0 + p.generations_count,
            Parentage::MultiParent(parents) => {
                if parents.is_empty() {
                    return Err(GraphError::BadParameters(
                        "multi-parent lineage with no parents".to_string(),
                    ));
                }
                let mut total = 0.0;
                let mut weighted = 0.0;
                for (p, w) in parents {
                    if !w.is_finite() || *w <= 0.0 {
                        return Err(GraphError::BadParameters(format!(
                            "multi-parent weight {} is not finite and positive",
                            w
                        )));
                    }
                    total += w;
                    weighted += w * p.generations_count;
                }
                1.0 + weighted / total
            }
        };
        Ok(Arc::new(Self {
            hash,
            generations_count,
            parentage,
            ancestry: OnceCell::new(),
            kinship: Mutex::new(AHashMap::new()),
            kinship_published: Condvar::new(),
        }))
    }

    pub fn root(hash: u64) -> Arc<Self> {
        // Root construction cannot fail
        Self::new(hash, Parentage::Root).unwrap_or_else(|_| unreachable!())
    }

    pub fn from_parent(hash: u64, parent: Arc<Lineage>) -> Arc<Self> {
        Self::new(hash, Parentage::SingleParent(parent)).unwrap_or_else(|_| unreachable!())
    }

    pub fn from_parents(hash: u64, parents: Vec<(Arc<Lineage>, f64)>) -> GraphResult<Arc<Self>> {
        Self::new(hash, Parentage::MultiParent(parents))
    }

    /// Rebuild a lineage from a persisted ancestry table.
    pub fn restored(hash: u64, generations_count: f64, ancestry: Vec<(u64, f64)>) -> GraphResult<Arc<Self>> {
        if generations_count < 1.0 || !generations_count.is_finite() {
            return Err(GraphError::BadParameters(format!(
                "restored lineage generations_count {} < 1.0",
                generations_count
            )));
        }
        match ancestry.first() {
            Some(&(first_hash, contribution)) if first_hash == hash && contribution == 1.0 => {}
            _ => {
                return Err(GraphError::BadParameters(
                    "restored ancestry table must start with (self, 1.0)".to_string(),
                ))
            }
        }
        let cell = OnceCell::new();
        let _ = cell.set(ancestry);
        Ok(Arc::new(Self {
            hash,
            generations_count,
            parentage: Parentage::Restored,
            ancestry: cell,
            kinship: Mutex::new(AHashMap::new()),
            kinship_published: Condvar::new(),
        }))
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn generations_count(&self) -> f64 {
        self.generations_count
    }

    pub fn parentage(&self) -> &Parentage {
        &self.parentage
    }

    /// The weighted ancestry table, self first, built on first use.
    pub fn ancestry(&self) -> &[(u64, f64)] {
        self.ancestry.get_or_init(|| self.build_ancestry())
    }

    /// Ancestor hashes, self first, toward the root.
    pub fn ancestor_hashes(&self) -> impl Iterator<Item = u64> + '_ {
        self.ancestry().iter().map(|(h, _)| *h)
    }

    fn build_ancestry(&self) -> Vec<(u64, f64)> {
        let mut order: Vec<u64> = vec![self.hash];
        let mut contribution: AHashMap<u64, f64> = AHashMap::new();
        contribution.insert(self.hash, 1.0);

        let mut absorb = |order: &mut Vec<u64>, hash: u64, amount: f64, own: u64| {
            if hash == own {
                // Self stays pinned at 1.0 even when a parent carries the
                // same hash (clone chains)
                return;
            }
            match contribution.entry(hash) {
                std::collections::hash_map::Entry::Occupied(mut e) => *e.get_mut() += amount,
                std::collections::hash_map::Entry::Vacant(e) => {
                    e.insert(amount);
                    order.push(hash);
                }
            }
        };

        match &self.parentage {
            Parentage::Root | Parentage::Restored => {}
            Parentage::SingleParent(parent) => {
                for &(h, c) in parent.ancestry() {
                    absorb(&mut order, h, c, self.hash);
                }
            }
            Parentage::MultiParent(parents) => {
                let total: f64 = parents.iter().map(|(_, w)| *w).sum();
                for (parent, weight) in parents {
                    let scale = weight / total;
                    for &(h, c) in parent.ancestry() {
                        absorb(&mut order, h, c * scale, self.hash);
                    }
                }
            }
        }

        order
            .into_iter()
            .map(|h| (h, contribution[&h]))
            .collect()
    }

    /// Fraction of this lineage's weighted ancestry passing through `hash`.
    /// Always 1.0 for the lineage's own hash.
    pub fn lineage_contains(&self, hash: u64) -> f64 {
        if hash == self.hash {
            return 1.0;
        }
        self.ancestry()
            .iter()
            .find(|(h, _)| *h == hash)
            .map(|(_, c)| *c)
            .unwrap_or(0.0)
    }

    /// Symmetric relatedness in [0, 1].
    ///
    /// `shared_ancestors / avg(generations_self, generations_other)`, clamped
    /// to 1.0 when the shared mass meets or exceeds that average (clones and
    /// siblings). Memoized per unordered pair under the primary's lock; a
    /// recompute from the secondary's perspective must agree bit-for-bit or
    /// the process halts with a `ConsistencyViolation`.
    pub fn kinship_score(&self, other: &Lineage) -> GraphResult<f64> {
        if std::ptr::eq(self, other) {
            return Ok(1.0);
        }
        let (primary, secondary) = match total_order(self, other) {
            Ordering::Less => (self, other),
            Ordering::Greater => (other, self),
            Ordering::Equal => {
                return Err(GraphError::ConsistencyViolation(format!(
                    "total order cannot resolve two distinct lineages with hash {:#018x}",
                    self.hash
                )))
            }
        };

        let key: KinshipKey = (secondary.hash, secondary.generations_count.to_bits());
        {
            let mut cache = primary.kinship.lock();
            loop {
                match cache.get(&key) {
                    Some(KinshipSlot::Done(score)) => return Ok(*score),
                    Some(KinshipSlot::InProgress) => {
                        // Another thread is computing this pair; block until
                        // it publishes rather than recomputing
                        primary.kinship_published.wait(&mut cache);
                    }
                    None => {
                        cache.insert(key, KinshipSlot::InProgress);
                        break;
                    }
                }
            }
        }

        // Compute outside the lock
        let forward = raw_kinship(primary, secondary);
        let reverse = raw_kinship(secondary, primary);
        if forward.to_bits() != reverse.to_bits() {
            let mut cache = primary.kinship.lock();
            cache.remove(&key);
            primary.kinship_published.notify_all();
            return Err(GraphError::ConsistencyViolation(format!(
                "kinship disagreement for pair ({:#018x}, {:#018x}): {} vs {}",
                primary.hash, secondary.hash, forward, reverse
            )));
        }

        let mut cache = primary.kinship.lock();
        cache.insert(key, KinshipSlot::Done(forward));
        primary.kinship_published.notify_all();
        Ok(forward)
    }
}

/// Shared ancestry mass over the average generation depth, from `a`'s
/// perspective. The union is walked in sorted hash order so both
/// perspectives sum in the same order and agree exactly.
fn raw_kinship(a: &Lineage, b: &Lineage) -> f64 {
    let mut hashes: Vec<u64> = a
        .ancestor_hashes()
        .chain(b.ancestor_hashes())
        .collect();
    hashes.sort_unstable();
    hashes.dedup();

    let shared: f64 = hashes
        .iter()
        .map(|&h| a.lineage_contains(h).min(b.lineage_contains(h)))
        .sum();
    let average_depth = 0.5 * (a.generations_count + b.generations_count);
    (shared / average_depth).min(1.0)
}

/// Deterministic total order over lineages: structural hash, then generation
/// depth bits, then the ancestry hash sequence. `Equal` for distinct objects
/// means the order cannot resolve them, which callers treat as fatal.
fn total_order(a: &Lineage, b: &Lineage) -> Ordering {
    a.hash
        .cmp(&b.hash)
        .then_with(|| {
            a.generations_count
                .to_bits()
                .cmp(&b.generations_count.to_bits())
        })
        .then_with(|| {
            let ah: Vec<u64> = a.ancestor_hashes().collect();
            let bh: Vec<u64> = b.ancestor_hashes().collect();
            ah.cmp(&bh)
        })
}
