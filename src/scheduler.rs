//! Cycle Scheduler - fetch, aggregate, compute, publish
//!
//! One cycle runs at a time. Within a cycle every exchange source is polled
//! in its own task under a shared deadline; aggregation starts only once all
//! of them have settled. A slow or failing source costs that source's data
//! for the cycle and nothing else.

use chrono::Utc;
use futures_util::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::Instrument;

use crate::config::{
    validate_aggregator, validate_schedule, validate_signals, AggregatorConfig, AppConfig,
    ScheduleConfig, SignalConfig,
};
use crate::error::{ConfigurationError, FetchError};
use crate::oracle::{build_sources, QuoteAggregator, SourceEntry};
use crate::signals::SignalEngine;
use crate::snapshot::{SnapshotStore, SourceOutcome};
use crate::types::{AggregatedQuote, Pair, Quote};

/// Phase of the producer loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Fetching,
    Aggregating,
    Computing,
    Publishing,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleState::Idle => "idle",
            CycleState::Fetching => "fetching",
            CycleState::Aggregating => "aggregating",
            CycleState::Computing => "computing",
            CycleState::Publishing => "publishing",
        };
        f.write_str(name)
    }
}

/// Summary of one completed cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub generation: u64,
    pub pairs_updated: usize,
    pub pairs_carried_forward: usize,
    pub contributing_sources: usize,
    pub source_outcomes: BTreeMap<String, SourceOutcome>,
    pub elapsed: Duration,
}

pub struct CycleScheduler {
    sources: Vec<SourceEntry>,
    pairs: BTreeSet<Pair>,
    aggregator: QuoteAggregator,
    engine: SignalEngine,
    store: Arc<SnapshotStore>,
    schedule: ScheduleConfig,
    state: CycleState,
}

impl CycleScheduler {
    pub fn new(
        sources: Vec<SourceEntry>,
        schedule: ScheduleConfig,
        aggregator: AggregatorConfig,
        signals: SignalConfig,
        store: Arc<SnapshotStore>,
    ) -> Result<Self, ConfigurationError> {
        validate_schedule(&schedule)?;
        validate_aggregator(&aggregator)?;
        validate_signals(&signals, aggregator.history_window)?;
        if sources.iter().all(|s| s.pairs.is_empty()) {
            return Err(ConfigurationError::NoSources);
        }

        let pairs = sources
            .iter()
            .flat_map(|s| s.pairs.iter().cloned())
            .collect();

        Ok(Self {
            sources,
            pairs,
            aggregator: QuoteAggregator::new(aggregator),
            engine: SignalEngine::new(signals),
            store,
            schedule,
            state: CycleState::Idle,
        })
    }

    /// Validate configuration and build the configured exchange sources
    pub fn from_config(
        config: &AppConfig,
        store: Arc<SnapshotStore>,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let sources = build_sources(&config.sources)?;
        Self::new(
            sources,
            config.schedule.clone(),
            config.aggregator.clone(),
            config.signals.clone(),
            store,
        )
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn aggregator(&self) -> &QuoteAggregator {
        &self.aggregator
    }

    pub fn store(&self) -> Arc<SnapshotStore> {
        Arc::clone(&self.store)
    }

    fn transition(&mut self, next: CycleState) {
        tracing::debug!(from = %self.state, to = %next, "Cycle state");
        self.state = next;
    }

    /// Drive cycles at the configured cadence until `shutdown` flips to true.
    ///
    /// An overrunning cycle delays the next tick; ticks are never skipped
    /// and cycles never overlap.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let cadence = self.schedule.cadence();
        let mut ticker = tokio::time::interval(cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            cadence_ms = self.schedule.cadence_ms,
            sources = self.sources.len(),
            pairs = self.pairs.len(),
            "Cycle scheduler started"
        );

        loop {
            // Shutdown wins over a tick that is already due
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            let report = self.run_cycle().await;
            if report.elapsed > cadence {
                tracing::warn!(
                    generation = report.generation,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    cadence_ms = self.schedule.cadence_ms,
                    "Cycle overran cadence; next tick delayed"
                );
            }
        }

        tracing::info!("Cycle scheduler stopped");
    }

    /// Run exactly one fetch → aggregate → compute → publish cycle
    pub async fn run_cycle(&mut self) -> CycleReport {
        let generation = self.store.read().generation + 1;
        let span = tracing::info_span!("cycle", generation);
        self.cycle(generation).instrument(span).await
    }

    async fn cycle(&mut self, generation: u64) -> CycleReport {
        let started = Instant::now();

        self.transition(CycleState::Fetching);
        let fetched = self.fetch_all().await;

        self.transition(CycleState::Aggregating);
        let now = Utc::now();
        let mut by_pair: BTreeMap<Pair, Vec<Quote>> =
            self.pairs.iter().map(|p| (p.clone(), Vec::new())).collect();
        let mut source_outcomes = BTreeMap::new();

        for (name, result) in fetched {
            let outcome = match result {
                Ok(quotes) => {
                    let count = quotes.len();
                    for quote in quotes {
                        by_pair.entry(quote.pair.clone()).or_default().push(quote);
                    }
                    SourceOutcome::Ok { quotes: count }
                }
                Err(FetchError::Timeout(budget)) => {
                    tracing::warn!(source = %name, budget_ms = budget.as_millis() as u64, "Source timed out");
                    SourceOutcome::TimedOut
                }
                Err(e) => {
                    tracing::warn!(source = %name, error = %e, "Source excluded from cycle");
                    SourceOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            source_outcomes.insert(name.to_string(), outcome);
        }

        let aggregated: Vec<AggregatedQuote> = by_pair
            .iter()
            .filter_map(|(pair, quotes)| self.aggregator.merge(pair, quotes, now))
            .collect();

        self.transition(CycleState::Computing);
        let mut next = self.store.read().successor(now);
        let mut contributors = BTreeSet::new();
        for current in &aggregated {
            let Some(history) = self.aggregator.history(&current.pair) else {
                continue;
            };
            contributors.extend(current.sources.iter().cloned());
            next.update(current.pair.clone(), self.engine.compute(current, history, now));
        }
        next.contributing_sources = contributors.len();
        next.source_outcomes = source_outcomes;

        self.transition(CycleState::Publishing);
        let report = CycleReport {
            generation: next.generation,
            pairs_updated: next.pairs_updated,
            pairs_carried_forward: next.pairs_carried_forward,
            contributing_sources: next.contributing_sources,
            source_outcomes: next.source_outcomes.clone(),
            elapsed: started.elapsed(),
        };
        debug_assert_eq!(report.generation, generation);
        self.store.publish(next);
        self.transition(CycleState::Idle);

        tracing::info!(
            updated = report.pairs_updated,
            carried_forward = report.pairs_carried_forward,
            contributing_sources = report.contributing_sources,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Snapshot published"
        );

        report
    }

    /// Poll every source in parallel; returns once all have settled
    async fn fetch_all(&self) -> Vec<(&'static str, Result<Vec<Quote>, FetchError>)> {
        let start = Instant::now();
        let cycle_deadline = start + self.schedule.cycle_timeout();
        let deadline = (start + self.schedule.fetch_timeout()).min(cycle_deadline);
        let budget = deadline - start;

        let fetches = self.sources.iter().map(|entry| {
            let source = Arc::clone(&entry.source);
            let pairs = entry.pairs.clone();
            let name = source.name();

            async move {
                let mut task = tokio::spawn(async move { source.fetch(&pairs, budget).await });
                let result = match tokio::time::timeout_at(deadline, &mut task).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(join_error)) => Err(FetchError::Task(join_error.to_string())),
                    Err(_) => {
                        task.abort();
                        Err(FetchError::Timeout(budget))
                    }
                };
                (name, result)
            }
        });

        join_all(fetches).await
    }
}
