//! Oracle module - Multi-exchange quote aggregation
//!
//! Polls quotes from Binance, Bybit and Coinbase and merges them into a
//! single consensus per trading pair.

mod aggregator;
pub mod sources;

pub use aggregator::{consensus, AggregationSkip, PriceHistory, QuoteAggregator};
pub use sources::{build_sources, ExchangeSource, SourceEntry};
