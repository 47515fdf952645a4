//! Tiingo end-of-day price client
//!
//! Endpoint: `{base}/{symbol}/prices?startDate=YYYY-MM-DD&token=..`
//! Returns an array of daily bars. Errors arrive in-band, often with a 200
//! status: `{"detail": "..."}`, an array of error strings, or an empty array.
//! All of them are typed `PriceSource` failures, never an empty series.

use super::PriceSource;
use crate::pipeline::error::{PipelineError, Result};
use crate::pipeline::types::PriceBar;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct TiingoBar {
    /// e.g. "2021-01-04T00:00:00.000Z"
    date: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
    #[serde(rename = "adjOpen")]
    adj_open: Option<f64>,
    #[serde(rename = "adjClose")]
    adj_close: Option<f64>,
}

impl TiingoBar {
    fn into_price_bar(self) -> Option<PriceBar> {
        let day = self.date.get(..10)?;
        let date = NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()?;
        Some(PriceBar {
            date,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            adj_open: self.adj_open.unwrap_or(self.open),
            adj_close: self.adj_close.unwrap_or(self.close),
            positive_count: 0,
            negative_count: 0,
            sentiment_sum: 0.0,
            scaled_sentiment: 0.0,
        })
    }
}

pub struct TiingoClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TiingoClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

fn price_error(symbol: &str, reason: impl Into<String>) -> PipelineError {
    PipelineError::PriceSource {
        symbol: symbol.to_string(),
        reason: reason.into(),
    }
}

/// Daily bars from a Tiingo response body
pub fn parse_price_response(symbol: &str, body: Value) -> Result<Vec<PriceBar>> {
    if let Some(detail) = body.get("detail").and_then(Value::as_str) {
        return Err(price_error(symbol, detail));
    }

    let Value::Array(rows) = body else {
        return Err(price_error(symbol, "response is not an array of bars"));
    };

    match rows.first() {
        None => return Err(price_error(symbol, "empty response")),
        Some(Value::String(message)) => {
            let message: String = message.chars().take(80).collect();
            return Err(price_error(symbol, message));
        }
        Some(_) => {}
    }

    rows.into_iter()
        .enumerate()
        .map(|(i, row)| {
            serde_json::from_value::<TiingoBar>(row)
                .ok()
                .and_then(TiingoBar::into_price_bar)
                .ok_or_else(|| price_error(symbol, format!("malformed bar at index {}", i)))
        })
        .collect()
}

#[async_trait]
impl PriceSource for TiingoClient {
    async fn fetch_daily_series(&self, symbol: &str, start_date: NaiveDate) -> Result<Vec<PriceBar>> {
        let url = format!("{}/{}/prices", self.base_url, symbol);
        let start = start_date.format("%Y-%m-%d").to_string();

        let response = self
            .client
            .get(&url)
            .query(&[("startDate", start.as_str()), ("token", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(PipelineError::SourceUnavailable(format!(
                "tiingo {}: HTTP {}",
                symbol, status
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| price_error(symbol, format!("unreadable response ({}): {}", status, e)))?;

        log::debug!("💹 Price data for {}", symbol);
        parse_price_response(symbol, body)
    }
}
