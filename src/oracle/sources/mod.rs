//! Exchange source implementations (Binance, Bybit, Coinbase)

mod binance;
mod bybit;
mod coinbase;

pub use binance::BinanceClient;
pub use bybit::BybitClient;
pub use coinbase::CoinbaseClient;

use async_trait::async_trait;
use futures_util::future::join_all;
use reqwest::{Response, StatusCode};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SourceConfig;
use crate::error::{ConfigurationError, FetchError};
use crate::types::{Pair, Quote};

/// Source names accepted in configuration
pub const KNOWN_SOURCES: &[&str] = &["binance", "bybit", "coinbase"];

/// Trait for exchange quote sources
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeSource: Send + Sync {
    /// Get the source name
    fn name(&self) -> &'static str;

    /// Fetch quotes for `pairs`, returning whatever subset resolved.
    ///
    /// Must not run past `timeout`. Fails only when no pair resolved.
    async fn fetch(&self, pairs: &[Pair], timeout: Duration) -> Result<Vec<Quote>, FetchError>;
}

/// A configured source together with the pairs it is polled for
#[derive(Clone)]
pub struct SourceEntry {
    pub source: Arc<dyn ExchangeSource>,
    pub pairs: Vec<Pair>,
}

impl SourceEntry {
    pub fn new(source: Arc<dyn ExchangeSource>, pairs: Vec<Pair>) -> Self {
        Self { source, pairs }
    }
}

/// Build every enabled source from configuration
pub fn build_sources<'a>(
    configs: impl IntoIterator<Item = (&'a String, &'a SourceConfig)>,
) -> Result<Vec<SourceEntry>, ConfigurationError> {
    let mut entries = Vec::new();

    for (name, cfg) in configs {
        if !cfg.enabled {
            continue;
        }

        let pairs = cfg
            .pairs
            .iter()
            .map(|p| p.parse::<Pair>())
            .collect::<Result<Vec<_>, _>>()?;
        let base_url = cfg.base_url.clone();

        let source: Arc<dyn ExchangeSource> = match name.as_str() {
            "binance" => Arc::new(BinanceClient::new(base_url)),
            "bybit" => Arc::new(BybitClient::new(base_url)),
            "coinbase" => Arc::new(CoinbaseClient::new(base_url)),
            other => return Err(ConfigurationError::UnknownSource(other.to_string())),
        };

        tracing::info!(source = %name, pairs = pairs.len(), "Exchange source enabled");
        entries.push(SourceEntry::new(source, pairs));
    }

    if entries.is_empty() {
        return Err(ConfigurationError::NoSources);
    }

    Ok(entries)
}

/// Resolve every pair concurrently and keep the ones that succeeded.
///
/// Returns the most significant error only when no pair resolved.
pub(crate) async fn fetch_each<F, Fut>(
    source: &str,
    pairs: &[Pair],
    fetch_one: F,
) -> Result<Vec<Quote>, FetchError>
where
    F: Fn(Pair) -> Fut,
    Fut: Future<Output = Result<Quote, FetchError>>,
{
    let results = join_all(pairs.iter().cloned().map(&fetch_one)).await;

    let mut quotes = Vec::with_capacity(results.len());
    let mut worst: Option<FetchError> = None;

    for (pair, result) in pairs.iter().zip(results) {
        match result {
            Ok(quote) => quotes.push(quote),
            Err(e) => {
                tracing::warn!(source = %source, pair = %pair, error = %e, "Pair fetch failed");
                if worst.as_ref().map_or(true, |w| e.severity() > w.severity()) {
                    worst = Some(e);
                }
            }
        }
    }

    match worst {
        Some(e) if quotes.is_empty() && !pairs.is_empty() => Err(e),
        _ => Ok(quotes),
    }
}

/// Map rate-limit and non-success statuses to fetch errors
pub(crate) fn check_status(response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(FetchError::RateLimited { retry_after });
    }
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }
    Ok(response)
}

/// Parse a decimal string field the way exchanges encode prices
pub(crate) fn parse_decimal(field: &'static str, raw: &str) -> Result<f64, FetchError> {
    let value: f64 = raw
        .parse()
        .map_err(|_| FetchError::Malformed(format!("{field}: not a number: {raw:?}")))?;
    if !value.is_finite() {
        return Err(FetchError::Malformed(format!("{field}: not finite")));
    }
    Ok(value)
}

/// Optional book side; empty strings and zeros mean "not quoted"
pub(crate) fn parse_book_side(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<f64>, FetchError> {
    match raw {
        None | Some("") => Ok(None),
        Some(raw) => {
            let value = parse_decimal(field, raw)?;
            Ok((value > 0.0).then_some(value))
        }
    }
}

/// Transport failures, keeping the budget that expired on timeout
pub(crate) fn request_error(e: reqwest::Error, timeout: Duration) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout(timeout)
    } else {
        e.into()
    }
}

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("quotesignal/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn quote_for(pair: Pair) -> Quote {
        let now = Utc::now();
        Quote {
            pair,
            source: "test".to_string(),
            price: 1.0,
            bid: None,
            ask: None,
            volume: 1.0,
            observed_at: now,
            fetched_at: now,
        }
    }

    #[tokio::test]
    async fn fetch_each_returns_partial_results() {
        let pairs = vec![Pair::new("BTC", "USD"), Pair::new("DOGE", "USD")];
        let quotes = fetch_each("test", &pairs, |pair| async move {
            if pair.base() == "BTC" {
                Ok(quote_for(pair))
            } else {
                Err(FetchError::Malformed("unknown symbol".into()))
            }
        })
        .await
        .expect("partial success");

        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].pair, Pair::new("BTC", "USD"));
    }

    #[test]
    fn fetch_each_reports_worst_error_when_all_fail() {
        let pairs = vec![Pair::new("BTC", "USD"), Pair::new("ETH", "USD")];
        let err = tokio_test::block_on(fetch_each("test", &pairs, |pair| async move {
            if pair.base() == "BTC" {
                Err(FetchError::Malformed("bad".into()))
            } else {
                Err(FetchError::RateLimited { retry_after: None })
            }
        }))
        .expect_err("all pairs failed");

        assert!(matches!(err, FetchError::RateLimited { .. }));

        let empty: Vec<Pair> = Vec::new();
        let none = tokio_test::block_on(fetch_each("test", &empty, |pair| async move {
            Ok(quote_for(pair))
        }))
        .expect("no pairs is not a failure");
        assert!(none.is_empty());
    }

    #[test]
    fn parses_exchange_decimals() {
        assert_eq!(parse_decimal("price", "42000.50").expect("number"), 42000.5);
        assert!(parse_decimal("price", "abc").is_err());
        assert!(parse_decimal("price", "NaN").is_err());
        assert_eq!(parse_book_side("bid", Some("")).expect("empty"), None);
        assert_eq!(parse_book_side("bid", Some("0")).expect("zero"), None);
        assert_eq!(parse_book_side("bid", Some("1.5")).expect("value"), Some(1.5));
    }

    #[test]
    fn builds_enabled_sources_only() {
        let mut configs = BTreeMap::new();
        configs.insert(
            "binance".to_string(),
            SourceConfig {
                enabled: true,
                pairs: vec!["BTC-USD".to_string()],
                base_url: None,
            },
        );
        configs.insert(
            "coinbase".to_string(),
            SourceConfig {
                enabled: false,
                pairs: vec!["BTC-USD".to_string()],
                base_url: None,
            },
        );

        let entries = build_sources(&configs).expect("sources");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source.name(), "binance");
        assert_eq!(entries[0].pairs, vec![Pair::new("BTC", "USD")]);
    }

    #[test]
    fn unknown_source_is_a_configuration_error() {
        let mut configs = BTreeMap::new();
        configs.insert(
            "mtgox".to_string(),
            SourceConfig {
                enabled: true,
                pairs: vec!["BTC-USD".to_string()],
                base_url: None,
            },
        );
        assert!(matches!(
            build_sources(&configs),
            Err(ConfigurationError::UnknownSource(_))
        ));
    }
}
