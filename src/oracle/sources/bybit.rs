//! Bybit V5 REST client for spot ticker quotes

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

const BYBIT_REST_URL: &str = "https://api.bybit.com";
const BYBIT_RATE_LIMIT_CODE: i64 = 10006;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitResponse {
    ret_code: i64,
    ret_msg: String,
    result: Option<BybitResult>,
    time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct BybitResult {
    #[serde(default)]
    list: Vec<BybitTicker>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitTicker {
    symbol: String,
    last_price: String,
    bid1_price: Option<String>,
    ask1_price: Option<String>,
    volume24h: String,
}

#[derive(Debug, Clone)]
pub struct BybitClient {
    client: reqwest::Client,
    base_url: String,
}

impl BybitClient {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.unwrap_or_else(|| BYBIT_REST_URL.to_string()),
        }
    }

    async fn fetch_pair(&self, pair: Pair, timeout: Duration) -> Result<Quote, FetchError> {
        let symbol = pair.usdt_symbol();
        let url = format!("{}/v5/market/tickers", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("category", "spot"), ("symbol", symbol.as_str())])
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| request_error(e, timeout))?;

        let body = check_status(response)?
            .text()
            .await
            .map_err(|e| request_error(e, timeout))?;

        parse_tickers(&pair, &body, Utc::now())
    }
}

#[async_trait]
impl ExchangeSource for BybitClient {
    fn name(&self) -> &'static str {
        "bybit"
    }

    async fn fetch(&self, pairs: &[Pair], timeout: Duration) -> Result<Vec<Quote>, FetchError> {
        fetch_each(self.name(), pairs, |pair| self.fetch_pair(pair, timeout)).await
    }
}

fn parse_tickers(pair: &Pair, body: &str, fetched_at: DateTime<Utc>) -> Result<Quote, FetchError> {
    let response: BybitResponse = serde_json::from_str(body)?;

    // Bybit reports errors in-band with HTTP 200
    if response.ret_code == BYBIT_RATE_LIMIT_CODE {
        return Err(FetchError::RateLimited { retry_after: None });
    }
    if response.ret_code != 0 {
        return Err(FetchError::Malformed(format!(
            "retCode {}: {}",
            response.ret_code, response.ret_msg
        )));
    }

    let symbol = pair.usdt_symbol();
    let ticker = response
        .result
        .into_iter()
        .flat_map(|r| r.list)
        .find(|t| t.symbol.eq_ignore_ascii_case(&symbol))
        .ok_or_else(|| FetchError::Malformed(format!("{} not in ticker list", symbol)))?;

    let observed_at = response
        .time
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or(fetched_at);

    Ok(Quote {
        pair: pair.clone(),
        source: "bybit".to_string(),
        price: parse_decimal("lastPrice", &ticker.last_price)?,
        bid: parse_book_side("bid1Price", ticker.bid1_price.as_deref())?,
        ask: parse_book_side("ask1Price", ticker.ask1_price.as_deref())?,
        volume: parse_decimal("volume24h", &ticker.volume24h)?,
        observed_at,
        fetched_at,
    })
}
