//! Configuration management for QuoteSignal
//!
//! Loads from YAML/TOML files + environment variables via .env

mod types;

pub use types::*;

use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::error::ConfigurationError;
use crate::oracle::sources::KNOWN_SOURCES;
use crate::types::Pair;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub schedule: ScheduleConfig,
    pub aggregator: AggregatorConfig,
    pub signals: SignalConfig,
    pub sources: BTreeMap<String, SourceConfig>,
    pub dashboard: DashboardConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, ConfigurationError> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Schedule defaults
            .set_default("schedule.cadence_ms", 10_000)?
            .set_default("schedule.fetch_timeout_ms", 3_000)?
            .set_default("schedule.cycle_timeout_ms", 5_000)?
            // Aggregator defaults
            .set_default("aggregator.staleness_ms", 30_000)?
            .set_default("aggregator.outlier_pct", 10.0)?
            .set_default("aggregator.history_window", 20)?
            .set_default("aggregator.trim_fraction", 0.25)?
            // Signal defaults
            .set_default("signals.min_confidence", 0.5)?
            .set_default("signals.min_momentum_magnitude", 0.0005)?
            .set_default("signals.reversal_min_run", 3)?
            .set_default("signals.range_band_width", 0.02)?
            .set_default("signals.corroboration_sources", 3)?
            // Source defaults
            .set_default("sources.binance.enabled", true)?
            .set_default("sources.binance.pairs", vec!["BTC-USD", "ETH-USD"])?
            .set_default("sources.bybit.enabled", true)?
            .set_default("sources.bybit.pairs", vec!["BTC-USD", "ETH-USD"])?
            .set_default("sources.coinbase.enabled", true)?
            .set_default("sources.coinbase.pairs", vec!["BTC-USD", "ETH-USD"])?
            // Dashboard defaults
            .set_default("dashboard.enabled", false)?
            .set_default("dashboard.bind", "127.0.0.1:8080")?
            // Logging defaults
            .set_default("logging.json", false)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (QUOTESIGNAL__*)
            .add_source(
                Environment::with_prefix("QUOTESIGNAL")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        Ok(app_config)
    }

    /// Reject thresholds and windows the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        validate_schedule(&self.schedule)?;
        validate_aggregator(&self.aggregator)?;
        validate_signals(&self.signals, self.aggregator.history_window)?;

        let mut usable = 0;
        for (name, source) in &self.sources {
            if !source.enabled {
                continue;
            }
            if !KNOWN_SOURCES.contains(&name.as_str()) {
                return Err(ConfigurationError::UnknownSource(name.clone()));
            }
            for pair in &source.pairs {
                pair.parse::<Pair>()?;
            }
            if !source.pairs.is_empty() {
                usable += 1;
            }
        }
        if usable == 0 {
            return Err(ConfigurationError::NoSources);
        }

        Ok(())
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        let enabled: Vec<&str> = self
            .sources
            .iter()
            .filter(|(_, s)| s.enabled)
            .map(|(name, _)| name.as_str())
            .collect();
        format!(
            "cadence={}ms fetch_timeout={}ms sources={:?} window={} outlier={}% min_conf={:.2}",
            self.schedule.cadence_ms,
            self.schedule.fetch_timeout_ms,
            enabled,
            self.aggregator.history_window,
            self.aggregator.outlier_pct,
            self.signals.min_confidence
        )
    }
}

pub(crate) fn validate_schedule(s: &ScheduleConfig) -> Result<(), ConfigurationError> {
    if s.cadence_ms == 0 {
        return Err(ConfigurationError::invalid("schedule.cadence_ms", "must be > 0"));
    }
    if s.fetch_timeout_ms == 0 {
        return Err(ConfigurationError::invalid(
            "schedule.fetch_timeout_ms",
            "must be > 0",
        ));
    }
    if s.cycle_timeout_ms < s.fetch_timeout_ms {
        return Err(ConfigurationError::invalid(
            "schedule.cycle_timeout_ms",
            format!(
                "must be >= fetch_timeout_ms ({} < {})",
                s.cycle_timeout_ms, s.fetch_timeout_ms
            ),
        ));
    }
    Ok(())
}

pub(crate) fn validate_aggregator(cfg: &AggregatorConfig) -> Result<(), ConfigurationError> {
    if cfg.staleness_ms == 0 {
        return Err(ConfigurationError::invalid("aggregator.staleness_ms", "must be > 0"));
    }
    if !(cfg.outlier_pct > 0.0 && cfg.outlier_pct <= 100.0) {
        return Err(ConfigurationError::invalid(
            "aggregator.outlier_pct",
            format!("must be in (0, 100], got {}", cfg.outlier_pct),
        ));
    }
    if cfg.history_window < 3 {
        return Err(ConfigurationError::invalid(
            "aggregator.history_window",
            "must be >= 3",
        ));
    }
    if !(0.0..0.5).contains(&cfg.trim_fraction) {
        return Err(ConfigurationError::invalid(
            "aggregator.trim_fraction",
            format!("must be in [0, 0.5), got {}", cfg.trim_fraction),
        ));
    }
    Ok(())
}

pub(crate) fn validate_signals(
    cfg: &SignalConfig,
    history_window: usize,
) -> Result<(), ConfigurationError> {
    if !(0.0..=1.0).contains(&cfg.min_confidence) {
        return Err(ConfigurationError::invalid(
            "signals.min_confidence",
            format!("must be in [0, 1], got {}", cfg.min_confidence),
        ));
    }
    if !(cfg.min_momentum_magnitude >= 0.0) {
        return Err(ConfigurationError::invalid(
            "signals.min_momentum_magnitude",
            "must be >= 0",
        ));
    }
    // K prices give K-1 returns; the latest one is the turn itself
    let longest_run = history_window.saturating_sub(2);
    if cfg.reversal_min_run == 0 || cfg.reversal_min_run > longest_run {
        return Err(ConfigurationError::invalid(
            "signals.reversal_min_run",
            format!(
                "must be in [1, history_window - 2 = {}], got {}",
                longest_run, cfg.reversal_min_run
            ),
        ));
    }
    if !(cfg.range_band_width > 0.0) {
        return Err(ConfigurationError::invalid(
            "signals.range_band_width",
            "must be > 0",
        ));
    }
    if cfg.corroboration_sources == 0 {
        return Err(ConfigurationError::invalid(
            "signals.corroboration_sources",
            "must be >= 1",
        ));
    }
    Ok(())
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
