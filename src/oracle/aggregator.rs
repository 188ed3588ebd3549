//! Quote Aggregator - Combines quotes from multiple exchanges
//!
//! Merges one cycle's quotes for a pair into a volume-weighted consensus,
//! dropping stale quotes and rejecting outliers against the trimmed mean of
//! their peers. Each consensus is appended to the pair's bounded history.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};

use crate::config::AggregatorConfig;
use crate::types::{AggregatedQuote, Pair, Quote};

/// Why a pair produced no consensus this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationSkip {
    /// No source returned a usable quote
    NoQuotes,
    /// Every quote was older than the staleness bound
    AllStale { dropped: usize },
}

/// Bounded rolling window of consensus quotes for one pair
#[derive(Debug, Clone)]
pub struct PriceHistory {
    entries: VecDeque<AggregatedQuote>,
    capacity: usize,
}

impl PriceHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, evicting the oldest entry when full
    pub fn push(&mut self, quote: AggregatedQuote) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(quote);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() == self.capacity
    }

    pub fn latest(&self) -> Option<&AggregatedQuote> {
        self.entries.back()
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &AggregatedQuote> {
        self.entries.iter()
    }

    pub fn prices(&self) -> Vec<f64> {
        self.entries.iter().map(|q| q.price).collect()
    }
}

/// Per-pair quote merger. Owns every pair's price history.
pub struct QuoteAggregator {
    config: AggregatorConfig,
    histories: HashMap<Pair, PriceHistory>,
}

impl QuoteAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self {
            config,
            histories: HashMap::new(),
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn history(&self, pair: &Pair) -> Option<&PriceHistory> {
        self.histories.get(pair)
    }

    /// Merge this cycle's quotes for `pair`.
    ///
    /// Returns `None` when no fresh quote survives; the pair's history is left
    /// untouched in that case.
    pub fn merge(
        &mut self,
        pair: &Pair,
        quotes: &[Quote],
        now: DateTime<Utc>,
    ) -> Option<AggregatedQuote> {
        let aggregated = match consensus(pair, quotes, now, &self.config) {
            Ok(aggregated) => aggregated,
            Err(skip) => {
                tracing::debug!(pair = %pair, reason = ?skip, "Pair skipped this cycle");
                return None;
            }
        };

        if !aggregated.rejected.is_empty() {
            tracing::info!(
                pair = %pair,
                rejected = ?aggregated.rejected,
                price = aggregated.price,
                "Rejected outlier quotes"
            );
        }

        self.histories
            .entry(pair.clone())
            .or_insert_with(|| PriceHistory::new(self.config.history_window))
            .push(aggregated.clone());

        Some(aggregated)
    }
}

/// Compute the consensus for one pair without touching any history
pub fn consensus(
    pair: &Pair,
    quotes: &[Quote],
    now: DateTime<Utc>,
    config: &AggregatorConfig,
) -> Result<AggregatedQuote, AggregationSkip> {
    let usable: Vec<&Quote> = quotes
        .iter()
        .filter(|q| &q.pair == pair && q.is_well_formed())
        .collect();
    if usable.is_empty() {
        return Err(AggregationSkip::NoQuotes);
    }

    let fresh: Vec<&Quote> = usable
        .iter()
        .copied()
        .filter(|q| q.is_fresh(now, config.staleness_ms))
        .collect();
    if fresh.is_empty() {
        return Err(AggregationSkip::AllStale {
            dropped: usable.len(),
        });
    }

    let (kept, rejected) = reject_outliers(fresh, config.outlier_pct, config.trim_fraction);
    let price = volume_weighted_price(&kept);

    let quoted: Vec<f64> = kept.iter().filter_map(|q| q.spread()).collect();
    let spread = if !quoted.is_empty() {
        quoted.iter().sum::<f64>() / quoted.len() as f64
    } else if kept.len() > 1 {
        let min = kept.iter().map(|q| q.price).fold(f64::INFINITY, f64::min);
        let max = kept.iter().map(|q| q.price).fold(f64::NEG_INFINITY, f64::max);
        (max - min) / price
    } else {
        0.0
    };

    Ok(AggregatedQuote {
        ts: now,
        pair: pair.clone(),
        price,
        volume: kept.iter().map(|q| q.volume).sum(),
        spread,
        sources: kept.iter().map(|q| q.source.clone()).collect(),
        rejected: rejected.iter().map(|q| q.source.clone()).collect(),
        max_staleness_ms: kept.iter().map(|q| q.age_ms(now)).max().unwrap_or(0),
    })
}

/// Leave-one-out rejection. The worst deviator is dropped while it exceeds
/// `outlier_pct`, at least three quotes remain, and a majority is kept.
fn reject_outliers<'a>(
    mut quotes: Vec<&'a Quote>,
    outlier_pct: f64,
    trim_fraction: f64,
) -> (Vec<&'a Quote>, Vec<&'a Quote>) {
    let max_rejections = quotes.len().saturating_sub(1) / 2;
    let mut rejected = Vec::new();

    while quotes.len() >= 3 && rejected.len() < max_rejections {
        let worst = quotes
            .iter()
            .enumerate()
            .map(|(i, q)| {
                let peers: Vec<f64> = quotes
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, p)| p.price)
                    .collect();
                let reference = trimmed_mean(peers, trim_fraction);
                (i, (q.price - reference).abs() / reference * 100.0)
            })
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match worst {
            Some((idx, deviation)) if deviation > outlier_pct => {
                rejected.push(quotes.remove(idx));
            }
            _ => break,
        }
    }

    (quotes, rejected)
}

/// Mean after dropping `trim_fraction` of values from each end
fn trimmed_mean(mut values: Vec<f64>, trim_fraction: f64) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let trim = (values.len() as f64 * trim_fraction).floor() as usize;
    let kept = &values[trim..values.len() - trim];
    kept.iter().sum::<f64>() / kept.len() as f64
}

fn volume_weighted_price(quotes: &[&Quote]) -> f64 {
    let total_volume: f64 = quotes.iter().map(|q| q.volume).sum();
    if total_volume > 0.0 {
        quotes.iter().map(|q| q.price * q.volume).sum::<f64>() / total_volume
    } else {
        quotes.iter().map(|q| q.price).sum::<f64>() / quotes.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn make_quote(source: &str, price: f64, volume: f64, now: DateTime<Utc>) -> Quote {
        Quote {
            pair: Pair::new("BTC", "X"),
            source: source.to_string(),
            price,
            bid: Some(price - 0.05),
            ask: Some(price + 0.05),
            volume,
            observed_at: now,
            fetched_at: now,
        }
    }

    fn config(window: usize) -> AggregatorConfig {
        AggregatorConfig {
            staleness_ms: 5_000,
            outlier_pct: 10.0,
            history_window: window,
            trim_fraction: 0.25,
        }
    }

    #[test]
    fn rejects_outlier_and_weights_by_volume() {
        let now = Utc::now();
        let pair = Pair::new("BTC", "X");
        let quotes = vec![
            make_quote("a", 100.0, 10.0, now),
            make_quote("b", 101.0, 10.0, now),
            make_quote("c", 150.0, 1.0, now),
        ];
        let mut aggregator = QuoteAggregator::new(config(5));

        let merged = aggregator.merge(&pair, &quotes, now).expect("consensus");
        assert!((merged.price - 100.5).abs() < 1e-9);
        assert_eq!(merged.sources, vec!["a", "b"]);
        assert_eq!(merged.rejected, vec!["c"]);
        assert_eq!(merged.volume, 20.0);
    }

    #[test]
    fn keeps_agreeing_quotes() {
        let now = Utc::now();
        let pair = Pair::new("BTC", "X");
        let quotes = vec![
            make_quote("a", 100.0, 1.0, now),
            make_quote("b", 102.0, 3.0, now),
            make_quote("c", 99.0, 0.0, now),
        ];
        let merged = consensus(&pair, &quotes, now, &config(5)).expect("consensus");
        assert!(merged.rejected.is_empty());
        assert!((merged.price - 101.5).abs() < 1e-9);
    }

    #[test]
    fn outlier_cannot_drag_consensus_past_threshold() {
        let now = Utc::now();
        let pair = Pair::new("BTC", "X");
        let peers = vec![
            make_quote("a", 100.0, 5.0, now),
            make_quote("b", 100.4, 5.0, now),
            make_quote("c", 99.8, 5.0, now),
        ];
        let without = consensus(&pair, &peers, now, &config(5)).expect("peers");

        let mut with_outlier = peers.clone();
        with_outlier.push(make_quote("d", 1_000.0, 500.0, now));
        let with = consensus(&pair, &with_outlier, now, &config(5)).expect("with outlier");

        assert_eq!(with.rejected, vec!["d"]);
        assert!((with.price - without.price).abs() / without.price * 100.0 <= 10.0);
    }

    #[test]
    fn two_quotes_are_never_rejected() {
        let now = Utc::now();
        let pair = Pair::new("BTC", "X");
        let quotes = vec![
            make_quote("a", 100.0, 1.0, now),
            make_quote("b", 200.0, 1.0, now),
        ];
        let merged = consensus(&pair, &quotes, now, &config(5)).expect("consensus");
        assert!(merged.rejected.is_empty());
        assert_eq!(merged.price, 150.0);
    }

    #[test]
    fn zero_volume_falls_back_to_plain_mean() {
        let now = Utc::now();
        let pair = Pair::new("BTC", "X");
        let quotes = vec![
            make_quote("a", 100.0, 0.0, now),
            make_quote("b", 104.0, 0.0, now),
        ];
        let merged = consensus(&pair, &quotes, now, &config(5)).expect("consensus");
        assert_eq!(merged.price, 102.0);
    }

    #[test]
    fn stale_quotes_are_skipped() {
        let now = Utc::now();
        let pair = Pair::new("BTC", "X");
        let mut stale = make_quote("a", 100.0, 1.0, now);
        stale.observed_at = now - Duration::seconds(60);

        let mut aggregator = QuoteAggregator::new(config(5));
        assert!(aggregator.merge(&pair, &[stale.clone()], now).is_none());
        assert!(aggregator.history(&pair).is_none());
        assert_eq!(
            consensus(&pair, &[stale], now, &config(5)),
            Err(AggregationSkip::AllStale { dropped: 1 })
        );
        assert_eq!(
            consensus(&pair, &[], now, &config(5)),
            Err(AggregationSkip::NoQuotes)
        );
    }

    #[test]
    fn stale_contributor_is_excluded_but_fresh_one_kept() {
        let now = Utc::now();
        let pair = Pair::new("BTC", "X");
        let fresh = make_quote("a", 100.0, 1.0, now - Duration::milliseconds(1_200));
        let mut stale = make_quote("b", 90.0, 1.0, now);
        stale.observed_at = now - Duration::seconds(10);

        let merged = consensus(&pair, &[fresh, stale], now, &config(5)).expect("consensus");
        assert_eq!(merged.sources, vec!["a"]);
        assert_eq!(merged.max_staleness_ms, 1_200);
    }

    #[test]
    fn history_is_bounded() {
        let now = Utc::now();
        let pair = Pair::new("BTC", "X");
        let mut aggregator = QuoteAggregator::new(config(3));

        for i in 0..10 {
            let quote = make_quote("a", 100.0 + i as f64, 1.0, now);
            aggregator.merge(&pair, &[quote], now);
            let history = aggregator.history(&pair).expect("history");
            assert!(history.len() <= 3);
        }

        let history = aggregator.history(&pair).expect("history");
        assert!(history.is_full());
        assert_eq!(history.prices(), vec![107.0, 108.0, 109.0]);
    }

    #[test]
    fn trimmed_mean_drops_extremes() {
        assert_eq!(trimmed_mean(vec![1.0, 2.0, 3.0, 100.0], 0.25), 2.5);
        assert_eq!(trimmed_mean(vec![4.0, 2.0], 0.25), 3.0);
    }
}
