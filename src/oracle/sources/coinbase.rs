//! Coinbase Exchange REST client
//!
//! Uses the public product ticker endpoint. Coinbase lists dollar pairs
//! natively, so pairs map one-to-one onto product ids.

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

const COINBASE_REST_URL: &str = "https://api.exchange.coinbase.com";

#[derive(Debug, Deserialize)]
struct CoinbaseTicker {
    price: String,
    bid: Option<String>,
    ask: Option<String>,
    volume: String,
    time: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CoinbaseClient {
    client: reqwest::Client,
    base_url: String,
}

impl CoinbaseClient {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.unwrap_or_else(|| COINBASE_REST_URL.to_string()),
        }
    }

    async fn fetch_pair(&self, pair: Pair, timeout: Duration) -> Result<Quote, FetchError> {
        let url = format!("{}/products/{}/ticker", self.base_url, pair.dashed());

        let response = self
            .client
            .get(&url)
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
impl ExchangeSource for CoinbaseClient {
    fn name(&self) -> &'static str {
        "coinbase"
    }

    async fn fetch(&self, pairs: &[Pair], timeout: Duration) -> Result<Vec<Quote>, FetchError> {
        fetch_each(self.name(), pairs, |pair| self.fetch_pair(pair, timeout)).await
    }
}

fn parse_ticker(pair: &Pair, body: &str, fetched_at: DateTime<Utc>) -> Result<Quote, FetchError> {
    let ticker: CoinbaseTicker = serde_json::from_str(body)?;

    let observed_at = ticker
        .time
        .as_deref()
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(fetched_at);

    Ok(Quote {
        pair: pair.clone(),
        source: "coinbase".to_string(),
        price: parse_decimal("price", &ticker.price)?,
        bid: parse_book_side("bid", ticker.bid.as_deref())?,
        ask: parse_book_side("ask", ticker.ask.as_deref())?,
        volume: parse_decimal("volume", &ticker.volume)?,
        observed_at,
        fetched_at,
    })
}
