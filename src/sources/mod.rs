//! External collaborators behind pull interfaces
//!
//! - `ContentSource` - comment/post archive (pushshift.io)
//! - `PriceSource` - daily price bars (Tiingo)
//! - `ScoreLookup` - current scores of known items (reddit `api/info`)
//! - `TickerDirectory` - tradable symbol lists (NASDAQ symbol directory)
//!
//! Every network failure surfaces as `PipelineError::SourceUnavailable`
//! (or `PriceSource` for per-symbol price failures); none is ever turned
//! into an empty result.

pub mod nasdaq;
pub mod pushshift;
pub mod reddit;
pub mod tiingo;

use crate::pipeline::error::Result;
use crate::pipeline::types::{ContentKind, PriceBar, RawItem, ScoreSnapshot};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::time::Duration;

pub use nasdaq::NasdaqDirectory;
pub use pushshift::PushshiftClient;
pub use reddit::RedditInfoClient;
pub use tiingo::TiingoClient;

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Up to `page_size` items created strictly after `after`, ascending by
    /// creation time
    async fn fetch_since(
        &self,
        kind: ContentKind,
        channel: &str,
        after: i64,
        page_size: usize,
    ) -> Result<Vec<RawItem>>;
}

#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Daily bars from `start_date` to today. An unknown symbol or an error
    /// payload is a `PipelineError::PriceSource`, never an empty series.
    async fn fetch_daily_series(&self, symbol: &str, start_date: NaiveDate) -> Result<Vec<PriceBar>>;
}

#[async_trait]
pub trait ScoreLookup: Send + Sync {
    /// Current scores for bare ids. Ids missing from the result no longer
    /// exist at the source.
    async fn current_scores(&self, kind: ContentKind, ids: &[String]) -> Result<Vec<ScoreSnapshot>>;
}

#[async_trait]
pub trait TickerDirectory: Send + Sync {
    /// Full list of tradable (symbol, company name) pairs
    async fn fetch_symbols(&self) -> Result<Vec<(String, String)>>;
}

/// Shared HTTP client settings for all source clients
pub fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("tickerflow/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}
