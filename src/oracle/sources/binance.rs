//! Binance REST client for spot ticker quotes
//!
//! Polls the 24h rolling ticker, which carries last price, top of book and
//! base-asset volume in one response.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use crate::error::FetchError;
use crate::oracle::sources::{
    check_status, fetch_each, http_client, parse_book_side, parse_decimal, request_error,
    ExchangeSource,
};
use crate::types::{Pair, Quote};

const BINANCE_REST_URL: &str = "https://api.binance.com";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceTicker {
    symbol: String,
    last_price: String,
    bid_price: Option<String>,
    ask_price: Option<String>,
    volume: String,
    close_time: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct BinanceClient {
    client: reqwest::Client,
    base_url: String,
}

impl BinanceClient {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.unwrap_or_else(|| BINANCE_REST_URL.to_string()),
        }
    }

    async fn fetch_pair(&self, pair: Pair, timeout: Duration) -> Result<Quote, FetchError> {
        let symbol = pair.usdt_symbol();
        let url = format!("{}/api/v3/ticker/24hr", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol.as_str())])
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| request_error(e, timeout))?;

        let body = check_status(response)?
            .text()
            .await
            .map_err(|e| request_error(e, timeout))?;

        parse_ticker(&pair, &body, Utc::now())
    }
}

#[async_trait]
impl ExchangeSource for BinanceClient {
    fn name(&self) -> &'static str {
        "binance"
    }

    async fn fetch(&self, pairs: &[Pair], timeout: Duration) -> Result<Vec<Quote>, FetchError> {
        fetch_each(self.name(), pairs, |pair| self.fetch_pair(pair, timeout)).await
    }
}

fn parse_ticker(pair: &Pair, body: &str, fetched_at: DateTime<Utc>) -> Result<Quote, FetchError> {
    let ticker: BinanceTicker = serde_json::from_str(body)?;

    if !ticker.symbol.eq_ignore_ascii_case(&pair.usdt_symbol()) {
        return Err(FetchError::Malformed(format!(
            "expected {} got {}",
            pair.usdt_symbol(),
            ticker.symbol
        )));
    }

    let observed_at = ticker
        .close_time
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or(fetched_at);

    Ok(Quote {
        pair: pair.clone(),
        source: "binance".to_string(),
        price: parse_decimal("lastPrice", &ticker.last_price)?,
        bid: parse_book_side("bidPrice", ticker.bid_price.as_deref())?,
        ask: parse_book_side("askPrice", ticker.ask_price.as_deref())?,
        volume: parse_decimal("volume", &ticker.volume)?,
        observed_at,
        fetched_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_24h_ticker() {
        let body = serde_json::json!({
            "symbol": "BTCUSDT",
            "priceChange": "-94.99999800",
            "lastPrice": "42000.10",
            "bidPrice": "42000.00",
            "askPrice": "42000.20",
            "volume": "1234.5",
            "quoteVolume": "51849000.0",
            "openTime": 1_707_684_834_000_i64,
            "closeTime": 1_707_771_234_567_i64,
            "count": 76
        });
        let now = Utc::now();
        let pair = Pair::new("BTC", "USD");

        let quote = parse_ticker(&pair, &body.to_string(), now).expect("ticker should parse");
        assert_eq!(quote.pair, pair);
        assert_eq!(quote.source, "binance");
        assert_eq!(quote.price, 42000.10);
        assert_eq!(quote.bid, Some(42000.00));
        assert_eq!(quote.ask, Some(42000.20));
        assert_eq!(quote.volume, 1234.5);
        assert_eq!(quote.observed_at.timestamp_millis(), 1_707_771_234_567);
        assert_eq!(quote.fetched_at, now);
    }

    #[test]
    fn rejects_error_payload() {
        let body = r#"{"code":-1121,"msg":"Invalid symbol."}"#;
        let err = parse_ticker(&Pair::new("FOO", "USD"), body, Utc::now())
            .expect_err("error body is not a ticker");
        assert!(matches!(err, FetchError::Malformed(_)));
    }

    #[test]
    fn rejects_mismatched_symbol() {
        let body = r#"{"symbol":"ETHUSDT","lastPrice":"1","volume":"1"}"#;
        assert!(parse_ticker(&Pair::new("BTC", "USD"), body, Utc::now()).is_err());
    }
}
