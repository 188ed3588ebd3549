//! Snapshot Store - the latest published signal set
//!
//! A single producer (the cycle scheduler) replaces the current snapshot with
//! one pointer swap. Readers get an `Arc` to a complete snapshot and never
//! wait on an in-flight cycle.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::QueryError;
use crate::signals::PairSignals;
use crate::types::{Pair, Signal, StrategyKind};

/// How one source fared in the cycle that produced a snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    Ok { quotes: usize },
    Failed { error: String },
    TimedOut,
}

/// The published unit: every pair's signals at one generation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Strictly increasing, one per completed cycle
    pub generation: u64,
    pub generated_at: DateTime<Utc>,
    pub pairs: BTreeMap<Pair, PairSignals>,
    /// Distinct sources whose quotes survived into a consensus this generation
    pub contributing_sources: usize,
    pub pairs_updated: usize,
    pub pairs_carried_forward: usize,
    pub source_outcomes: BTreeMap<String, SourceOutcome>,
    /// Pairs recomputed in this generation
    #[serde(skip)]
    updated: BTreeSet<Pair>,
}

impl Snapshot {
    /// Generation zero: nothing published yet
    pub fn empty() -> Self {
        Self {
            generation: 0,
            generated_at: Utc::now(),
            pairs: BTreeMap::new(),
            contributing_sources: 0,
            pairs_updated: 0,
            pairs_carried_forward: 0,
            source_outcomes: BTreeMap::new(),
            updated: BTreeSet::new(),
        }
    }

    /// Start the next generation carrying every pair of `self` forward unchanged
    pub fn successor(&self, now: DateTime<Utc>) -> Self {
        Self {
            generation: self.generation + 1,
            generated_at: now,
            pairs: self.pairs.clone(),
            contributing_sources: 0,
            pairs_updated: 0,
            pairs_carried_forward: self.pairs.len(),
            source_outcomes: BTreeMap::new(),
            updated: BTreeSet::new(),
        }
    }

    /// Replace a pair's signals with freshly computed ones.
    ///
    /// Updating the same pair again within a generation only replaces its
    /// signals; the counters already account for it.
    pub fn update(&mut self, pair: Pair, signals: PairSignals) {
        let replaced = self.pairs.insert(pair.clone(), signals).is_some();
        if !self.updated.insert(pair) {
            return;
        }
        if replaced {
            self.pairs_carried_forward = self.pairs_carried_forward.saturating_sub(1);
        }
        self.pairs_updated += 1;
    }

    /// Whether `pair` was recomputed in this generation
    pub fn is_updated(&self, pair: &Pair) -> bool {
        self.updated.contains(pair)
    }

    pub fn signals_by_strategy(&self, kind: StrategyKind) -> BTreeMap<Pair, Signal> {
        self.pairs
            .iter()
            .map(|(pair, signals)| (pair.clone(), signals.get(kind).clone()))
            .collect()
    }
}

/// Liveness view of the store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Health {
    pub generation: u64,
    /// `None` until the first cycle publishes
    pub last_publish: Option<DateTime<Utc>>,
    pub contributing_sources: usize,
    pub pairs: usize,
    pub pairs_carried_forward: usize,
    pub source_outcomes: BTreeMap<String, SourceOutcome>,
}

/// Holder of the current snapshot
pub struct SnapshotStore {
    current: ArcSwap<Snapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Snapshot::empty()),
        }
    }

    /// Atomically replace the current snapshot
    pub fn publish(&self, snapshot: Snapshot) {
        tracing::debug!(generation = snapshot.generation, "Publishing snapshot");
        self.current.store(Arc::new(snapshot));
    }

    /// Last published snapshot
    pub fn read(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.read()
    }

    pub fn signals_by_strategy(&self, kind: StrategyKind) -> BTreeMap<Pair, Signal> {
        self.current.load().signals_by_strategy(kind)
    }

    /// Filtered view by strategy name; unknown names are a caller error
    pub fn signals_by_strategy_name(
        &self,
        kind: &str,
    ) -> Result<BTreeMap<Pair, Signal>, QueryError> {
        let kind: StrategyKind = kind.parse()?;
        Ok(self.signals_by_strategy(kind))
    }

    pub fn health(&self) -> Health {
        let snapshot = self.current.load();
        Health {
            generation: snapshot.generation,
            last_publish: (snapshot.generation > 0).then_some(snapshot.generated_at),
            contributing_sources: snapshot.contributing_sources,
            pairs: snapshot.pairs.len(),
            pairs_carried_forward: snapshot.pairs_carried_forward,
            source_outcomes: snapshot.source_outcomes.clone(),
        }
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
