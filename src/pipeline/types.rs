//! Core data structures for the content pipeline
//!
//! Content flows through these types in one direction:
//!
//! ```text
//! RawItem (source JSON) -> ContentItem (stored, unlabeled)
//!     -> labels -> processed (folded into ticker index) -> sentiment
//! ```

use super::error::{PipelineError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Sentinel label for content with no trustworthy ticker match
pub const UNKNOWN_TICKER: &str = "UNKNOWN";

/// Label sets larger than this collapse to `UNKNOWN_TICKER`
pub const TOO_MANY_LABELS: usize = 5;

/// The two kinds of content the pipeline handles.
///
/// Each kind knows its table, its id prefix in the ticker index, and how to
/// pull searchable text out of a raw record, so stage logic is written once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContentKind {
    Post,
    Comment,
}

impl ContentKind {
    pub const ALL: [ContentKind; 2] = [ContentKind::Post, ContentKind::Comment];

    pub fn table_name(&self) -> &'static str {
        match self {
            ContentKind::Post => "posts",
            ContentKind::Comment => "comments",
        }
    }

    /// Prefix applied to ids stored in a ticker's content index
    pub fn id_prefix(&self) -> &'static str {
        match self {
            ContentKind::Post => "t3_",
            ContentKind::Comment => "t1_",
        }
    }

    /// `id` as it appears in a ticker's content index (e.g. `t1_abc`)
    pub fn prefixed(&self, id: &str) -> String {
        format!("{}{}", self.id_prefix(), id)
    }

    /// Searchable text of a raw record.
    ///
    /// Posts are `title + " " + selftext` (selftext may be absent),
    /// comments are their body. Returns None when a required field is missing.
    pub fn extract_text(&self, raw: &RawItem) -> Option<String> {
        match self {
            ContentKind::Post => {
                let title = raw.title.as_deref()?;
                let selftext = raw.selftext.as_deref().unwrap_or("");
                Some(format!("{} {}", title, selftext))
            }
            ContentKind::Comment => raw.body.clone(),
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table_name())
    }
}

/// A record as delivered by the content source. Every field is optional;
/// validation happens in `ContentItem::from_raw`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawItem {
    pub id: Option<String>,
    pub created_utc: Option<i64>,
    pub subreddit: Option<String>,
    pub author: Option<String>,
    pub title: Option<String>,
    pub selftext: Option<String>,
    pub body: Option<String>,
    pub score: Option<i64>,
    pub retrieved_on: Option<i64>,
}

impl RawItem {
    /// Lenient extraction from source JSON. Timestamps may arrive as integers
    /// or floats; wrongly typed fields are treated as absent.
    pub fn from_value(value: &Value) -> Self {
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
        let int = |key: &str| {
            value.get(key).and_then(|v| {
                v.as_i64()
                    .or_else(|| v.as_f64().map(|f| f as i64))
                    .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
            })
        };

        Self {
            id: text("id"),
            created_utc: int("created_utc"),
            subreddit: text("subreddit"),
            author: text("author"),
            title: text("title"),
            selftext: text("selftext"),
            body: text("body"),
            score: int("score"),
            retrieved_on: int("retrieved_on"),
        }
    }
}

/// A stored post or comment
#[derive(Debug, Clone, PartialEq)]
pub struct ContentItem {
    pub id: String,
    pub kind: ContentKind,
    pub created_utc: i64,
    pub channel: String,
    pub text: String,
    pub author: Option<String>,
    pub score: Option<i64>,
    pub retrieved_on: i64,
    /// Seconds between creation and the last score retrieval
    pub update_age: i64,
    pub deleted: bool,
    /// None until labeled
    pub labels: Option<BTreeSet<String>>,
    /// True once labels are folded into the ticker index
    pub processed: bool,
    /// None until scored
    pub sentiment: Option<f64>,
}

impl ContentItem {
    /// Normalize a raw record into a fresh, unlabeled/unprocessed/unscored item.
    ///
    /// `channel` is the channel the record was fetched for. Cursors are keyed
    /// by it, so it wins over the record's own `subreddit` field.
    pub fn from_raw(
        kind: ContentKind,
        channel: &str,
        raw: &RawItem,
        now: i64,
    ) -> Result<Self> {
        let id = raw
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| PipelineError::MalformedRecord(format!("{} record without id", kind)))?;

        let created_utc = raw.created_utc.ok_or_else(|| {
            PipelineError::MalformedRecord(format!("{} {} without created_utc", kind, id))
        })?;

        let text = kind.extract_text(raw).ok_or_else(|| {
            PipelineError::MalformedRecord(format!("{} {} without text", kind, id))
        })?;

        let retrieved_on = raw.retrieved_on.unwrap_or(now);

        Ok(Self {
            id,
            kind,
            created_utc,
            channel: channel.to_string(),
            text,
            author: raw.author.clone(),
            score: raw.score,
            retrieved_on,
            update_age: retrieved_on - created_utc,
            deleted: false,
            labels: None,
            processed: false,
            sentiment: None,
        })
    }
}

/// A tradable symbol with its content index and price series
#[derive(Debug, Clone, PartialEq)]
pub struct Ticker {
    pub symbol: String,
    pub name: String,
    /// Prefixed content ids, append-only, never contains `UNKNOWN_TICKER`
    pub content_ids: Vec<String>,
    pub price_data: Option<Vec<PriceBar>>,
    pub last_update: Option<i64>,
}

/// One trading day plus the sentiment aggregates attributed to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    #[serde(default)]
    pub high: f64,
    #[serde(default)]
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub adj_open: f64,
    #[serde(default)]
    pub adj_close: f64,
    #[serde(default)]
    pub positive_count: u32,
    #[serde(default)]
    pub negative_count: u32,
    #[serde(default)]
    pub sentiment_sum: f64,
    #[serde(default)]
    pub scaled_sentiment: f64,
}

impl PriceBar {
    pub fn new(date: NaiveDate, open: f64, close: f64) -> Self {
        Self {
            date,
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume: 0.0,
            adj_open: open,
            adj_close: close,
            positive_count: 0,
            negative_count: 0,
            sentiment_sum: 0.0,
            scaled_sentiment: 0.0,
        }
    }

    pub fn reset_sentiment(&mut self) {
        self.positive_count = 0;
        self.negative_count = 0;
        self.sentiment_sum = 0.0;
        self.scaled_sentiment = 0.0;
    }
}

/// A scored content item attributed to a ticker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentimentEvent {
    pub score: f64,
    pub created_utc: i64,
}

/// Fresh score for an existing item, as returned by a score lookup
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSnapshot {
    pub id: String,
    pub score: i64,
    pub retrieved_on: i64,
}

/// An item that needs its score refreshed
#[derive(Debug, Clone, PartialEq)]
pub struct StaleItem {
    pub id: String,
    pub created_utc: i64,
}
