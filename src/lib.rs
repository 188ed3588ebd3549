//! QuoteSignal Library
//!
//! Multi-exchange quote aggregation with momentum, reversal and range signals

pub mod config;
pub mod error;
pub mod oracle;
pub mod scheduler;
pub mod signals;
pub mod snapshot;
pub mod types;

#[cfg(feature = "dashboard")]
pub mod dashboard;

pub use config::AppConfig;
pub use error::{ConfigurationError, FetchError, QueryError};
pub use scheduler::{CycleReport, CycleScheduler, CycleState};
pub use snapshot::{Health, Snapshot, SnapshotStore, SourceOutcome};
pub use types::{AggregatedQuote, Direction, Pair, Quote, Signal, StrategyKind};
