//! Range: price oscillating inside a band over the window

use chrono::{DateTime, Utc};

use super::{finish, mean, no_signal};
use crate::config::SignalConfig;
use crate::oracle::PriceHistory;
use crate::types::{AggregatedQuote, Direction, Signal, StrategyKind};

/// Range signals report containment, so direction is always neutral.
///
/// Magnitude is the window's relative width `(max - min) / mean`. Confidence
/// falls with the share of points outside `mean ± band/2` and with how far the
/// width exceeds the configured band.
pub fn range(
    current: &AggregatedQuote,
    history: &PriceHistory,
    config: &SignalConfig,
    now: DateTime<Utc>,
) -> Signal {
    let prices = history.prices();
    if prices.len() < 2 {
        return no_signal(StrategyKind::Range, &current.pair, config, now);
    }

    let center = mean(&prices);
    let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
    let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let width = (max - min) / center;

    let half_band = center * config.range_band_width / 2.0;
    let breakouts = prices
        .iter()
        .filter(|p| (**p - center).abs() > half_band)
        .count();
    let containment = 1.0 - breakouts as f64 / prices.len() as f64;
    let fit = if width <= config.range_band_width {
        1.0
    } else {
        config.range_band_width / width
    };

    finish(
        StrategyKind::Range,
        &current.pair,
        Direction::Neutral,
        width,
        containment * fit,
        config,
        now,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::test_support::history_of;

    fn config() -> SignalConfig {
        SignalConfig {
            min_confidence: 0.5,
            min_momentum_magnitude: 0.001,
            reversal_min_run: 2,
            range_band_width: 0.02,
            corroboration_sources: 3,
        }
    }

    #[test]
    fn flat_market_is_fully_contained() {
        let (current, history) = history_of(&[(100.0, 1.0); 5], 5, 3);
        let signal = range(&current, &history, &config(), Utc::now());
        assert_eq!(signal.direction, Direction::Neutral);
        assert_eq!(signal.magnitude, 0.0);
        assert_eq!(signal.confidence, 1.0);
        assert!(!signal.low_confidence);
    }

    #[test]
    fn oscillation_inside_band() {
        let (current, history) = history_of(
            &[(100.0, 1.0), (100.5, 1.0), (99.7, 1.0), (100.4, 1.0), (99.9, 1.0)],
            5,
            3,
        );
        let signal = range(&current, &history, &config(), Utc::now());
        assert_eq!(signal.direction, Direction::Neutral);
        assert!(signal.magnitude < 0.02);
        assert_eq!(signal.confidence, 1.0);
    }

    #[test]
    fn breakouts_lower_confidence() {
        let contained = history_of(&[(100.0, 1.0), (100.5, 1.0), (99.8, 1.0), (100.2, 1.0)], 5, 3);
        let breaking = history_of(&[(100.0, 1.0), (100.5, 1.0), (99.8, 1.0), (104.0, 1.0)], 5, 3);
        let now = Utc::now();

        let calm = range(&contained.0, &contained.1, &config(), now);
        let wild = range(&breaking.0, &breaking.1, &config(), now);
        assert!(wild.confidence < calm.confidence);
        assert!(wild.magnitude > 0.02);
        assert_eq!(wild.direction, Direction::Neutral);
    }

    #[test]
    fn trending_market_is_not_a_range() {
        let (current, history) = history_of(
            &[(100.0, 1.0), (105.0, 1.0), (110.0, 1.0), (115.0, 1.0), (120.0, 1.0)],
            5,
            3,
        );
        let signal = range(&current, &history, &config(), Utc::now());
        assert!(signal.low_confidence);
        assert!(signal.confidence < 0.1);
        assert!((0.0..=1.0).contains(&signal.confidence));
    }
}
