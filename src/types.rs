//! Core types used throughout QuoteSignal
//!
//! Defines trading pairs, quotes, aggregated quotes and signals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ConfigurationError, QueryError};

/// Tradable instrument, e.g. `BTC-USD`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pair {
    base: String,
    quote: String,
}

impl Pair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// Symbol for venues that quote dollar pairs in USDT (e.g. "BTCUSDT")
    pub fn usdt_symbol(&self) -> String {
        let quote = if self.quote == "USD" {
            "USDT"
        } else {
            self.quote.as_str()
        };
        format!("{}{}", self.base, quote)
    }

    /// Dash-separated product id (e.g. "BTC-USD")
    pub fn dashed(&self) -> String {
        format!("{}-{}", self.base, self.quote)
    }
}

impl FromStr for Pair {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split(|c| c == '-' || c == '/' || c == '_');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(base), Some(quote), None)
                if !base.is_empty()
                    && !quote.is_empty()
                    && base.chars().all(|c| c.is_ascii_alphanumeric())
                    && quote.chars().all(|c| c.is_ascii_alphanumeric()) =>
            {
                Ok(Pair::new(base, quote))
            }
            _ => Err(ConfigurationError::InvalidPair(s.to_string())),
        }
    }
}

impl TryFrom<String> for Pair {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Pair> for String {
    fn from(pair: Pair) -> Self {
        pair.dashed()
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.quote)
    }
}

/// Signal direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    #[default]
    Neutral,
}

impl Direction {
    /// Direction of a signed value. Exact zero is neutral, never up or down.
    pub fn from_sign(value: f64) -> Self {
        if value > 0.0 {
            Direction::Up
        } else if value < 0.0 {
            Direction::Down
        } else {
            Direction::Neutral
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "UP"),
            Direction::Down => write!(f, "DOWN"),
            Direction::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Signal strategy family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Momentum,
    Reversal,
    Range,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::Momentum,
        StrategyKind::Reversal,
        StrategyKind::Range,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Momentum => "momentum",
            StrategyKind::Reversal => "reversal",
            StrategyKind::Range => "range",
        }
    }
}

impl FromStr for StrategyKind {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "momentum" => Ok(StrategyKind::Momentum),
            "reversal" => Ok(StrategyKind::Reversal),
            "range" => Ok(StrategyKind::Range),
            _ => Err(QueryError::UnknownStrategy(s.to_string())),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One exchange's observation of one pair at fetch time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub pair: Pair,
    /// Name of the source that produced this quote
    pub source: String,
    /// Last traded price
    pub price: f64,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    /// Base-asset volume over the venue's rolling 24h window
    pub volume: f64,
    /// Exchange-reported observation time (falls back to fetch time)
    pub observed_at: DateTime<Utc>,
    /// Local time the response was received
    pub fetched_at: DateTime<Utc>,
}

impl Quote {
    /// Relative bid/ask spread, when the venue reports both sides
    pub fn spread(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) if bid > 0.0 && ask >= bid => Some((ask - bid) / self.price),
            _ => None,
        }
    }

    /// Age of the observation in milliseconds at `now`
    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.observed_at).num_milliseconds().max(0)
    }

    /// Freshness flag relative to a staleness bound
    pub fn is_fresh(&self, now: DateTime<Utc>, staleness_ms: u64) -> bool {
        self.age_ms(now) <= staleness_ms as i64
    }

    /// Quotes with non-finite or non-positive prices are never usable
    pub fn is_well_formed(&self) -> bool {
        self.price.is_finite() && self.price > 0.0 && self.volume.is_finite() && self.volume >= 0.0
    }
}

/// Per-pair consensus for one cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedQuote {
    pub ts: DateTime<Utc>,
    pub pair: Pair,
    /// Volume-weighted consensus price
    pub price: f64,
    /// Combined volume of contributing quotes
    pub volume: f64,
    /// Relative spread (mean bid/ask spread, or cross-source dispersion)
    pub spread: f64,
    /// Sources whose quotes survived staleness filtering and outlier rejection
    pub sources: Vec<String>,
    /// Sources rejected as outliers this cycle
    pub rejected: Vec<String>,
    /// Oldest contributing observation age in milliseconds
    pub max_staleness_ms: i64,
}

impl AggregatedQuote {
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }
}

/// Output of one strategy for one pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub kind: StrategyKind,
    pub pair: Pair,
    pub direction: Direction,
    /// Unitless strength, always >= 0
    pub magnitude: f64,
    /// Trust in direction and magnitude, in [0, 1]
    pub confidence: f64,
    /// Confidence fell below the configured floor
    pub low_confidence: bool,
    pub generated_at: DateTime<Utc>,
}
