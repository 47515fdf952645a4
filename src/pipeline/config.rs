//! Pipeline configuration from environment variables

use super::error::{PipelineError, Result};
use chrono::NaiveDate;
use std::env;
use std::str::FromStr;

/// Subreddits ingested when `CHANNELS` is not set
pub const DEFAULT_CHANNELS: &[&str] = &[
    "investing",
    "RobinHood",
    "wallstreetbets",
    "options",
    "stocks",
    "weedstocks",
    "TheCannalysts",
    "SecurityAnalysis",
    "StockMarket",
    "InvestmentClub",
    "Stock_Picks",
    "ValueInvesting",
    "CanadianInvestor",
    "UKInvesting",
    "pennystocks",
    "M1Finance",
];

/// Configuration for the pipeline runtime
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Path to SQLite database file
    pub db_path: String,

    /// Subreddits to ingest, in order
    pub channels: Vec<String>,

    /// Cursor floor (Unix seconds) for channels with no stored content
    pub earliest_content: i64,

    /// Items requested per content source call
    pub page_size: usize,

    /// Items fetched per content kind per iteration, shared by all channels
    pub ingest_budget: usize,

    /// Rows per label/invert/score batch
    pub batch_size: usize,

    /// Minimum wall-clock duration of one loop iteration
    pub min_loop_secs: u64,

    /// Age at which a content score is considered settled
    pub update_frequency_secs: i64,

    /// Extra age before a score refresh pass starts
    pub update_buffer_secs: i64,

    pub enable_score_refresh: bool,

    pub pushshift_url: String,
    pub reddit_info_url: String,
    pub nasdaq_directory_url: String,
    pub tiingo_url: String,

    /// Price refresh is disabled without a key
    pub tiingo_api_key: Option<String>,

    /// First day requested from the price source
    pub price_start_date: NaiveDate,

    pub http_timeout_secs: u64,

    /// Outage backoff: first delay and cap, in seconds
    pub backoff_initial_secs: u64,
    pub backoff_max_secs: u64,
}

impl PipelineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `TICKERFLOW_DB_PATH` (default: data/tickerflow.db)
    /// - `CHANNELS` comma-separated (default: `DEFAULT_CHANNELS`)
    /// - `EARLIEST_CONTENT` (default: 1577836800, 2020-01-01)
    /// - `PAGE_SIZE` (default: 1000)
    /// - `INGEST_BUDGET` (default: 10000)
    /// - `BATCH_SIZE` (default: 20000)
    /// - `MIN_LOOP_SECS` (default: 60)
    /// - `UPDATE_FREQUENCY_SECS` (default: 86400)
    /// - `UPDATE_BUFFER_SECS` (default: 3600)
    /// - `ENABLE_SCORE_REFRESH` (default: false)
    /// - `PUSHSHIFT_URL` (default: https://api.pushshift.io/reddit)
    /// - `REDDIT_INFO_URL` (default: https://api.reddit.com/api/info)
    /// - `NASDAQ_DIRECTORY_URL` (default: https://www.nasdaqtrader.com/dynamic/SymDir)
    /// - `TIINGO_URL` (default: https://api.tiingo.com/tiingo/daily)
    /// - `TIINGO_API_KEY` (default: unset)
    /// - `PRICE_START_DATE` YYYY-MM-DD (default: 2020-01-01)
    /// - `HTTP_TIMEOUT_SECS` (default: 30)
    /// - `BACKOFF_INITIAL_SECS` (default: 5)
    /// - `BACKOFF_MAX_SECS` (default: 600)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env`, reading values through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| non_empty(lookup(key));

        let channels = match text("CHANNELS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_CHANNELS.iter().map(|c| c.to_string()).collect(),
        };

        let price_start_date = match text("PRICE_START_DATE") {
            Some(date) => NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| {
                PipelineError::Config(format!("PRICE_START_DATE {:?}: {}", date, e))
            })?,
            None => NaiveDate::from_ymd_opt(2020, 1, 1)
                .ok_or_else(|| PipelineError::Config("invalid default start date".to_string()))?,
        };

        let config = Self {
            db_path: text("TICKERFLOW_DB_PATH")
                .unwrap_or_else(|| "data/tickerflow.db".to_string()),

            channels,

            earliest_content: parse_var(&lookup, "EARLIEST_CONTENT", 1_577_836_800)?,

            page_size: parse_var(&lookup, "PAGE_SIZE", 1_000)?,

            ingest_budget: parse_var(&lookup, "INGEST_BUDGET", 10_000)?,

            batch_size: parse_var(&lookup, "BATCH_SIZE", 20_000)?,

            min_loop_secs: parse_var(&lookup, "MIN_LOOP_SECS", 60)?,

            update_frequency_secs: parse_var(&lookup, "UPDATE_FREQUENCY_SECS", 86_400)?,

            update_buffer_secs: parse_var(&lookup, "UPDATE_BUFFER_SECS", 3_600)?,

            enable_score_refresh: parse_var(&lookup, "ENABLE_SCORE_REFRESH", false)?,

            pushshift_url: text("PUSHSHIFT_URL")
                .unwrap_or_else(|| "https://api.pushshift.io/reddit".to_string()),

            reddit_info_url: text("REDDIT_INFO_URL")
                .unwrap_or_else(|| "https://api.reddit.com/api/info".to_string()),

            nasdaq_directory_url: text("NASDAQ_DIRECTORY_URL")
                .unwrap_or_else(|| "https://www.nasdaqtrader.com/dynamic/SymDir".to_string()),

            tiingo_url: text("TIINGO_URL")
                .unwrap_or_else(|| "https://api.tiingo.com/tiingo/daily".to_string()),

            tiingo_api_key: text("TIINGO_API_KEY"),

            price_start_date,

            http_timeout_secs: parse_var(&lookup, "HTTP_TIMEOUT_SECS", 30)?,

            backoff_initial_secs: parse_var(&lookup, "BACKOFF_INITIAL_SECS", 5)?,

            backoff_max_secs: parse_var(&lookup, "BACKOFF_MAX_SECS", 600)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            return Err(PipelineError::Config("CHANNELS is empty".to_string()));
        }
        if self.page_size == 0 || self.batch_size == 0 || self.ingest_budget == 0 {
            return Err(PipelineError::Config(
                "PAGE_SIZE, BATCH_SIZE and INGEST_BUDGET must be positive".to_string(),
            ));
        }
        if self.update_frequency_secs <= 0 || self.update_buffer_secs < 0 {
            return Err(PipelineError::Config(
                "UPDATE_FREQUENCY_SECS must be positive and UPDATE_BUFFER_SECS non-negative"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Parse `key`, falling back to `default` when unset.
///
/// A set but unparsable value is an error rather than a silent default.
fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(lookup(key)) {
        Some(value) => value
            .parse()
            .map_err(|e| PipelineError::Config(format!("{}={:?}: {}", key, value, e))),
        None => Ok(default),
    }
}
