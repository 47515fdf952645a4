//! # Incremental content pipeline
//!
//! Pulls posts and comments from a content archive, attributes them to
//! ticker symbols, scores their sentiment, and aligns that sentiment onto
//! daily price bars.
//!
//! ## Stage contract
//!
//! Every stage selects its work with a store predicate and advances rows
//! past it when done:
//!
//! - ingestion: cursor = newest stored `created_utc` per (kind, channel)
//! - labeling: `labels IS NULL`
//! - inversion: `processed = 0 AND labels IS NOT NULL`
//! - scoring: `sentiment IS NULL`
//!
//! So every stage is re-entrant, and a crash loses at most one uncommitted
//! batch. No stage keeps progress in memory between calls.
//!
//! ## Module Organization
//!
//! - `types` - Content, ticker and price bar data structures
//! - `db` - ContentStore trait and SQLite implementation
//! - `cursor` - Incremental fetch cursor
//! - `ingestion` - Paged fetch and upsert from the content source
//! - `labeler` - Ticker extraction and labeling
//! - `inverter` - Label to ticker-index inversion
//! - `scorer` - Sentiment scoring
//! - `aligner` - Sentiment alignment onto price bars
//! - `refresher` - Score refresh for aged content
//! - `prices` - Daily price refresh
//! - `universe` - Ticker universe refresh
//! - `engine` - Orchestration loop

pub mod aligner;
pub mod backoff;
pub mod config;
pub mod cursor;
pub mod db;
pub mod engine;
pub mod error;
pub mod ingestion;
pub mod inverter;
pub mod labeler;
pub mod prices;
pub mod refresher;
pub mod scorer;
pub mod types;
pub mod universe;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use db::{ContentStore, SqliteContentStore};
pub use engine::{IterationReport, PipelineEngine, Stage};
pub use error::{PipelineError, Result};
pub use scorer::{LexiconScorer, ScoreFunction};
pub use types::{ContentItem, ContentKind, PriceBar, RawItem, SentimentEvent, Ticker};
