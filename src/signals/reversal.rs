//! Reversal: the latest move breaks a sustained run in the other direction

use chrono::{DateTime, Utc};

use super::{finish, mean, no_signal, step_direction, step_returns};
use crate::config::SignalConfig;
use crate::oracle::PriceHistory;
use crate::types::{AggregatedQuote, Direction, Signal, StrategyKind};

/// Confidence multiplier when the reversal comes on average-or-lower volume
const QUIET_VOLUME_FACTOR: f64 = 0.7;

fn per_source_volume(quote: &AggregatedQuote) -> f64 {
    quote.volume / quote.source_count().max(1) as f64
}

pub fn reversal(
    current: &AggregatedQuote,
    history: &PriceHistory,
    config: &SignalConfig,
    now: DateTime<Utc>,
) -> Signal {
    let returns = step_returns(&history.prices());
    let Some((&latest, prior)) = returns.split_last() else {
        return no_signal(StrategyKind::Reversal, &current.pair, config, now);
    };

    let min_magnitude = config.min_momentum_magnitude;
    let direction = step_direction(latest, min_magnitude);
    let opposite = match direction {
        Direction::Up => Direction::Down,
        Direction::Down => Direction::Up,
        Direction::Neutral => {
            return no_signal(StrategyKind::Reversal, &current.pair, config, now);
        }
    };

    let run: Vec<f64> = prior
        .iter()
        .rev()
        .take_while(|r| step_direction(**r, min_magnitude) == opposite)
        .copied()
        .collect();
    if run.len() < config.reversal_min_run {
        return no_signal(StrategyKind::Reversal, &current.pair, config, now);
    }

    // Short-window trend (latest step) against the long-window trend (prior run)
    let magnitude = (latest - mean(&run)).abs();

    let run_factor = (run.len() as f64 / (2 * config.reversal_min_run) as f64).min(1.0);

    // Per-source volume, so a source rejoining the consensus is not a surge
    let volumes: Vec<f64> = history.iter().map(per_source_volume).collect();
    let average_volume = mean(&volumes[..volumes.len() - 1]);
    let volume_ratio = if average_volume > 0.0 {
        per_source_volume(current) / average_volume
    } else {
        1.0
    };
    let volume_factor = if volume_ratio > 1.0 {
        (QUIET_VOLUME_FACTOR + (1.0 - QUIET_VOLUME_FACTOR) * (volume_ratio - 1.0)).min(1.0)
    } else {
        QUIET_VOLUME_FACTOR
    };

    finish(
        StrategyKind::Reversal,
        &current.pair,
        direction,
        magnitude,
        run_factor * volume_factor,
        config,
        now,
    )
}
