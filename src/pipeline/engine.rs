//! Pipeline Engine - staged orchestration loop
//!
//! One iteration runs every stage to exhaustion, in a fixed order:
//!
//! ```text
//! [universe refresh, once per UTC day]
//!     ↓
//! ingest (posts, then comments, every channel)
//!     ↓
//! score refresh (aged items, optional)
//!     ↓
//! label → invert → score   (per content kind)
//! ```
//!
//! Stages hand work to each other only through the store's selection
//! predicates, so a failed stage is logged and skipped and the next
//! iteration resumes from persisted state. A source outage additionally
//! triggers exponential backoff before the next iteration.

use super::backoff::ExponentialBackoff;
use super::config::PipelineConfig;
use super::db::ContentStore;
use super::error::PipelineError;
use super::ingestion::{ContentIngestor, IngestStats};
use super::inverter::invert_all;
use super::labeler::label_all;
use super::refresher::{self, RefreshPolicy, RefreshStats};
use super::scorer::{score_all, ScoreFunction};
use super::types::ContentKind;
use super::universe::refresh_universe;
use crate::sources::{ContentSource, ScoreLookup, TickerDirectory};
use chrono::{DateTime, NaiveDate};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Universe,
    Ingest,
    ScoreRefresh,
    Label,
    Invert,
    Score,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Universe => "universe",
            Stage::Ingest => "ingest",
            Stage::ScoreRefresh => "score refresh",
            Stage::Label => "label",
            Stage::Invert => "invert",
            Stage::Score => "score",
        };
        f.write_str(name)
    }
}

/// What one iteration did
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IterationReport {
    /// Some when the universe refresh ran and succeeded
    pub universe_added: Option<usize>,
    pub ingested: IngestStats,
    pub refreshed: RefreshStats,
    pub labeled: usize,
    pub inverted: usize,
    pub scored: usize,
    pub failed_stages: Vec<Stage>,
    /// A source was unreachable; the loop backs off before continuing
    pub source_outage: bool,
}

impl IterationReport {
    fn record_failure(&mut self, stage: Stage, err: PipelineError) {
        if err.is_source_outage() {
            log::warn!("⚠️  {} stage skipped, source unavailable: {}", stage, err);
            self.source_outage = true;
        } else {
            log::error!("❌ {} stage failed: {}", stage, err);
        }
        self.failed_stages.push(stage);
    }
}

/// Pipeline engine driving the staged content loop
///
/// Owns the store handle and every collaborator for the lifetime of the
/// process. Stage results are returned in an `IterationReport` rather than
/// kept on the engine.
pub struct PipelineEngine {
    store: Arc<dyn ContentStore>,
    ingestor: ContentIngestor,
    scorer: Arc<dyn ScoreFunction>,
    score_lookup: Option<Arc<dyn ScoreLookup>>,
    directory: Option<Arc<dyn TickerDirectory>>,

    channels: Vec<String>,
    batch_size: usize,
    refresh_policy: RefreshPolicy,
    min_loop: Duration,
    backoff: ExponentialBackoff,

    /// UTC day of the last successful universe refresh
    last_universe_refresh: Option<NaiveDate>,

    /// Timestamp function (for testing with mock time)
    now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
}

impl PipelineEngine {
    /// Create an engine using system time (chrono::Utc::now()) for timestamps
    pub fn new(
        store: Arc<dyn ContentStore>,
        source: Arc<dyn ContentSource>,
        scorer: Arc<dyn ScoreFunction>,
        config: &PipelineConfig,
    ) -> Self {
        Self::new_with_timestamp_fn(
            store,
            source,
            scorer,
            config,
            Box::new(|| chrono::Utc::now().timestamp()),
        )
    }

    /// Create an engine with a custom timestamp function
    ///
    /// Used for testing with deterministic timestamps.
    pub fn new_with_timestamp_fn(
        store: Arc<dyn ContentStore>,
        source: Arc<dyn ContentSource>,
        scorer: Arc<dyn ScoreFunction>,
        config: &PipelineConfig,
        now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
    ) -> Self {
        let ingestor = ContentIngestor::new(
            store.clone(),
            source,
            config.page_size,
            config.ingest_budget,
            config.earliest_content,
        );

        Self {
            store,
            ingestor,
            scorer,
            score_lookup: None,
            directory: None,
            channels: config.channels.clone(),
            batch_size: config.batch_size,
            refresh_policy: RefreshPolicy {
                update_frequency: config.update_frequency_secs,
                update_buffer: config.update_buffer_secs,
                batch_size: config.batch_size,
            },
            min_loop: Duration::from_secs(config.min_loop_secs),
            backoff: ExponentialBackoff::new(config.backoff_initial_secs, config.backoff_max_secs),
            last_universe_refresh: None,
            now_fn,
        }
    }

    /// Enable the score refresh stage
    pub fn with_score_lookup(mut self, lookup: Arc<dyn ScoreLookup>) -> Self {
        self.score_lookup = Some(lookup);
        self
    }

    /// Enable the daily ticker universe refresh
    pub fn with_ticker_directory(mut self, directory: Arc<dyn TickerDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    fn universe_due(&self, today: Option<NaiveDate>) -> bool {
        self.directory.is_some() && (today.is_none() || self.last_universe_refresh != today)
    }

    /// Run every stage once, in order
    pub async fn run_iteration(&mut self) -> IterationReport {
        let now = (self.now_fn)();
        let today = DateTime::from_timestamp(now, 0).map(|dt| dt.date_naive());
        let store = self.store.as_ref();
        let mut report = IterationReport::default();

        if self.universe_due(today) {
            if let Some(directory) = &self.directory {
                match refresh_universe(store, directory.as_ref()).await {
                    Ok(added) => {
                        report.universe_added = Some(added);
                        self.last_universe_refresh = today;
                    }
                    Err(e) => report.record_failure(Stage::Universe, e),
                }
            }
        }

        match self.ingestor.ingest_all(&self.channels, now).await {
            Ok(stats) => report.ingested = stats,
            Err(e) => report.record_failure(Stage::Ingest, e),
        }

        if let Some(lookup) = &self.score_lookup {
            for kind in ContentKind::ALL {
                match refresher::refresh_all(store, lookup.as_ref(), kind, &self.refresh_policy, now)
                    .await
                {
                    Ok(stats) => {
                        report.refreshed.updated += stats.updated;
                        report.refreshed.deleted += stats.deleted;
                    }
                    Err(e) => {
                        report.record_failure(Stage::ScoreRefresh, e);
                        break;
                    }
                }
            }
        }

        for kind in ContentKind::ALL {
            match label_all(store, kind, self.batch_size).await {
                Ok(n) => report.labeled += n,
                Err(e) => report.record_failure(Stage::Label, e),
            }
        }

        for kind in ContentKind::ALL {
            match invert_all(store, kind, self.batch_size).await {
                Ok(n) => report.inverted += n,
                Err(e) => report.record_failure(Stage::Invert, e),
            }
        }

        for kind in ContentKind::ALL {
            match score_all(store, kind, self.scorer.as_ref(), self.batch_size).await {
                Ok(n) => report.scored += n,
                Err(e) => report.record_failure(Stage::Score, e),
            }
        }

        report
    }

    /// Loop forever, holding each iteration to at least `min_loop_secs`
    pub async fn run(&mut self) {
        log::info!(
            "🚀 Pipeline loop started ({} channels, min loop {}s)",
            self.channels.len(),
            self.min_loop.as_secs()
        );

        loop {
            let started = Instant::now();
            let report = self.run_iteration().await;

            log::info!(
                "📊 Iteration: {} new items, {} labeled, {} inverted, {} scored, {} failed stages",
                report.ingested.stored,
                report.labeled,
                report.inverted,
                report.scored,
                report.failed_stages.len()
            );

            self.pace(started, &report).await;
        }
    }

    /// Back off after a source outage, then sleep out the rest of `min_loop`
    /// measured from `started`
    async fn pace(&mut self, started: Instant, report: &IterationReport) {
        if report.source_outage {
            self.backoff.sleep().await;
        } else {
            self.backoff.reset();
        }

        if let Some(remaining) = self.min_loop.checked_sub(started.elapsed()) {
            tokio::time::sleep(remaining).await;
        }
    }
}
