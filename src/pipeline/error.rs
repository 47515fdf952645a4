//! Error taxonomy shared by every pipeline stage.
//!
//! Stage drivers decide what each variant means for the loop:
//! - `SourceUnavailable` skips the stage for this iteration and backs off
//! - `MalformedRecord` skips a single record
//! - `PriceSource` skips a single ticker, leaving its stored series untouched
//! - `StoreWrite` aborts the current batch, nothing from it is committed

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Price source error for {symbol}: {reason}")]
    PriceSource { symbol: String, reason: String },

    #[error("Store write failed: {0}")]
    StoreWrite(String),

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Score function error: {0}")]
    ScoreFunction(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// True for failures that should trigger the orchestrator's backoff.
    pub fn is_source_outage(&self) -> bool {
        matches!(self, PipelineError::SourceUnavailable(_))
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        PipelineError::SourceUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
