//! Configuration section types

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Fixed cycle cadence in milliseconds
    pub cadence_ms: u64,
    /// Upper bound for a single source fetch in milliseconds
    pub fetch_timeout_ms: u64,
    /// Upper bound for the whole fetch fan-out in milliseconds
    pub cycle_timeout_ms: u64,
}

impl ScheduleConfig {
    pub fn cadence(&self) -> Duration {
        Duration::from_millis(self.cadence_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_millis(self.cycle_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorConfig {
    /// Quotes older than this are excluded from aggregation
    pub staleness_ms: u64,
    /// Maximum deviation from the peers' trimmed mean, in percent
    pub outlier_pct: f64,
    /// Rolling history length K (cycles retained per pair)
    pub history_window: usize,
    /// Fraction of peers trimmed from each end before averaging
    #[serde(default = "default_trim_fraction")]
    pub trim_fraction: f64,
}

fn default_trim_fraction() -> f64 {
    0.25
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            staleness_ms: 30_000,
            outlier_pct: 10.0,
            history_window: 20,
            trim_fraction: default_trim_fraction(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignalConfig {
    /// Signals below this confidence are flagged low-confidence
    pub min_confidence: f64,
    /// Per-cycle return below which momentum is neutral
    pub min_momentum_magnitude: f64,
    /// Minimum prior run length (cycles) before a reversal counts
    pub reversal_min_run: usize,
    /// (max - min) / mean at or below which the pair is range-bound
    pub range_band_width: f64,
    /// Source count at which corroboration stops adding confidence
    pub corroboration_sources: usize,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            min_momentum_magnitude: 0.0005,
            reversal_min_run: 3,
            range_band_width: 0.02,
            corroboration_sources: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub enabled: bool,
    /// Pairs in BASE-QUOTE form
    #[serde(default)]
    pub pairs: Vec<String>,
    /// Override for the venue's REST endpoint
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub bind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of human-readable output
    pub json: bool,
}
