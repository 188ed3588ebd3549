//! Signal Engine - momentum, reversal and range strategies
//!
//! Each strategy is a pure function over the pair's current consensus, its
//! price history and the signal thresholds. Every call yields a signal, even
//! a neutral zero-confidence one, so consumers always see all three kinds.

mod momentum;
mod range;
mod reversal;

pub use momentum::momentum;
pub use range::range;
pub use reversal::reversal;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::SignalConfig;
use crate::oracle::PriceHistory;
use crate::types::{AggregatedQuote, Direction, Pair, Signal, StrategyKind};

/// Signature shared by all strategies
pub type StrategyFn = fn(&AggregatedQuote, &PriceHistory, &SignalConfig, DateTime<Utc>) -> Signal;

/// One signal per strategy for a pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairSignals {
    pub momentum: Signal,
    pub reversal: Signal,
    pub range: Signal,
}

impl PairSignals {
    pub fn get(&self, kind: StrategyKind) -> &Signal {
        match kind {
            StrategyKind::Momentum => &self.momentum,
            StrategyKind::Reversal => &self.reversal,
            StrategyKind::Range => &self.range,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Signal> {
        [&self.momentum, &self.reversal, &self.range].into_iter()
    }
}

#[derive(Debug, Clone)]
pub struct SignalEngine {
    config: SignalConfig,
}

impl SignalEngine {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    pub fn strategy(kind: StrategyKind) -> StrategyFn {
        match kind {
            StrategyKind::Momentum => momentum,
            StrategyKind::Reversal => reversal,
            StrategyKind::Range => range,
        }
    }

    /// Run all three strategies for one pair
    pub fn compute(
        &self,
        current: &AggregatedQuote,
        history: &PriceHistory,
        now: DateTime<Utc>,
    ) -> PairSignals {
        let signals = PairSignals {
            momentum: momentum(current, history, &self.config, now),
            reversal: reversal(current, history, &self.config, now),
            range: range(current, history, &self.config, now),
        };

        tracing::debug!(
            pair = %current.pair,
            momentum = %signals.momentum.direction,
            momentum_conf = signals.momentum.confidence,
            reversal = %signals.reversal.direction,
            range_width = signals.range.magnitude,
            "Signals computed"
        );

        signals
    }
}

/// Per-cycle simple returns, oldest first
pub(crate) fn step_returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

/// Direction of one step, with moves under `min_magnitude` counted as flat
pub(crate) fn step_direction(ret: f64, min_magnitude: f64) -> Direction {
    if ret.abs() < min_magnitude {
        Direction::Neutral
    } else {
        Direction::from_sign(ret)
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Normalize ranges and apply the confidence floor
pub(crate) fn finish(
    kind: StrategyKind,
    pair: &Pair,
    direction: Direction,
    magnitude: f64,
    confidence: f64,
    config: &SignalConfig,
    now: DateTime<Utc>,
) -> Signal {
    let magnitude = if magnitude.is_finite() {
        magnitude.max(0.0)
    } else {
        0.0
    };
    let confidence = if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    };

    Signal {
        kind,
        pair: pair.clone(),
        direction,
        magnitude,
        confidence,
        low_confidence: confidence < config.min_confidence,
        generated_at: now,
    }
}

/// Neutral, zero-strength signal used when there is not enough history
pub(crate) fn no_signal(
    kind: StrategyKind,
    pair: &Pair,
    config: &SignalConfig,
    now: DateTime<Utc>,
) -> Signal {
    finish(kind, pair, Direction::Neutral, 0.0, 0.0, config, now)
}


#[cfg(test)]
mod tests {
    use super::test_support::history_of;
    use super::*;

    #[test]
    fn step_returns_are_relative() {
        let returns = step_returns(&[100.0, 110.0, 99.0]);
        assert_eq!(returns.len(), 2);
        assert!((returns[0] - 0.1).abs() < 1e-12);
        assert!((returns[1] + 0.1).abs() < 1e-12);
    }

    #[test]
    fn finish_clamps_and_flags() {
        let config = SignalConfig::default();
        let pair = Pair::new("BTC", "USD");
        let now = Utc::now();

        let signal = finish(StrategyKind::Momentum, &pair, Direction::Up, -1.0, 3.0, &config, now);
        assert_eq!(signal.magnitude, 0.0);
        assert_eq!(signal.confidence, 1.0);
        assert!(!signal.low_confidence);

        let weak = finish(StrategyKind::Range, &pair, Direction::Neutral, 0.1, 0.2, &config, now);
        assert!(weak.low_confidence);

        let nan = finish(StrategyKind::Range, &pair, Direction::Neutral, f64::NAN, f64::NAN, &config, now);
        assert_eq!(nan.magnitude, 0.0);
        assert_eq!(nan.confidence, 0.0);
    }

    #[test]
    fn engine_produces_all_three_kinds() {
        let engine = SignalEngine::new(SignalConfig::default());
        let (current, history) = history_of(&[(100.0, 1.0)], 5, 1);

        let signals = engine.compute(&current, &history, Utc::now());
        for kind in StrategyKind::ALL {
            assert_eq!(signals.get(kind).kind, kind);
        }
        assert_eq!(signals.iter().count(), 3);
        assert!(signals.iter().all(|s| s.low_confidence));
    }

    #[test]
    fn strategy_lookup_matches_kind() {
        let config = SignalConfig::default();
        let (current, history) = history_of(&[(100.0, 1.0), (101.0, 1.0)], 5, 3);
        let now = Utc::now();
        for kind in StrategyKind::ALL {
            let signal = SignalEngine::strategy(kind)(&current, &history, &config, now);
            assert_eq!(signal.kind, kind);
        }
    }
}
