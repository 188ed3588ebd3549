//! Momentum: sustained directional change across the rolling window

use chrono::{DateTime, Utc};

use super::{finish, mean, no_signal, step_direction, step_returns};
use crate::config::SignalConfig;
use crate::oracle::PriceHistory;
use crate::types::{AggregatedQuote, Direction, Signal, StrategyKind};

/// Smoothed rate of change over the window.
///
/// Confidence grows with the number of most recent cycles agreeing with the
/// direction and with how many sources corroborate the current consensus.
pub fn momentum(
    current: &AggregatedQuote,
    history: &PriceHistory,
    config: &SignalConfig,
    now: DateTime<Utc>,
) -> Signal {
    let returns = step_returns(&history.prices());
    if returns.is_empty() {
        return no_signal(StrategyKind::Momentum, &current.pair, config, now);
    }

    let rate = mean(&returns);
    let magnitude = rate.abs();
    let direction = if magnitude < config.min_momentum_magnitude {
        Direction::Neutral
    } else {
        Direction::from_sign(rate)
    };

    let streak = returns
        .iter()
        .rev()
        .take_while(|r| step_direction(**r, config.min_momentum_magnitude) == direction)
        .count();
    let max_streak = history.capacity().saturating_sub(1).max(1);
    let agreement = (streak as f64 / max_streak as f64).min(1.0);
    let corroboration =
        (current.source_count() as f64 / config.corroboration_sources as f64).min(1.0);

    finish(
        StrategyKind::Momentum,
        &current.pair,
        direction,
        magnitude,
        agreement * corroboration,
        config,
        now,
    )
}
