//! Content ingestion - incremental fetch from the content source
//!
//! Per (kind, channel):
//! 1. Derive the fetch bound from the store (`cursor::resume_after`)
//! 2. Fetch one page of items created after it, never more than the
//!    remaining item budget
//! 3. Normalize and upsert them (unlabeled, unprocessed, unscored)
//! 4. Repeat until a short page, a page with nothing new, or the budget
//!
//! The bound only moves because new items were stored. Each fetch re-reads
//! the newest stored second, so items sharing a timestamp across a page
//! boundary are not lost; the id-keyed upsert absorbs the overlap.

use super::cursor::resume_after;
use super::db::ContentStore;
use super::error::Result;
use super::types::{ContentItem, ContentKind, RawItem};
use crate::sources::ContentSource;
use std::sync::Arc;

/// Counters for one ingestion call
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub fetched: usize,
    pub stored: usize,
    pub malformed: usize,
    pub stalled_channels: usize,
}

impl IngestStats {
    fn absorb(&mut self, other: IngestStats) {
        self.fetched += other.fetched;
        self.stored += other.stored;
        self.malformed += other.malformed;
        self.stalled_channels += other.stalled_channels;
    }
}

pub struct ContentIngestor {
    store: Arc<dyn ContentStore>,
    source: Arc<dyn ContentSource>,
    page_size: usize,
    /// Item budget per `ingest_kind` call, shared by all channels
    item_budget: usize,
    /// Cursor floor
    earliest_content: i64,
}

impl ContentIngestor {
    pub fn new(
        store: Arc<dyn ContentStore>,
        source: Arc<dyn ContentSource>,
        page_size: usize,
        item_budget: usize,
        earliest_content: i64,
    ) -> Self {
        Self {
            store,
            source,
            page_size: page_size.max(1),
            item_budget,
            earliest_content,
        }
    }

    /// One page of raw items created after `since`, ascending
    pub async fn fetch_batch(
        &self,
        kind: ContentKind,
        channel: &str,
        since: i64,
    ) -> Result<Vec<RawItem>> {
        self.fetch_page(kind, channel, since, self.page_size).await
    }

    async fn fetch_page(
        &self,
        kind: ContentKind,
        channel: &str,
        since: i64,
        limit: usize,
    ) -> Result<Vec<RawItem>> {
        let mut batch = self.source.fetch_since(kind, channel, since, limit).await?;
        batch.truncate(limit);
        log::debug!(
            "📥 {} r/{}: fetched {} items after {}",
            kind,
            channel,
            batch.len(),
            since
        );
        Ok(batch)
    }

    /// Ingest a single channel until caught up, stalled, or `budget` items fetched
    pub async fn ingest_channel(
        &self,
        kind: ContentKind,
        channel: &str,
        budget: usize,
        now: i64,
    ) -> Result<IngestStats> {
        let mut stats = IngestStats::default();
        let mut after =
            resume_after(self.store.as_ref(), kind, channel, self.earliest_content).await?;

        loop {
            let limit = self.page_size.min(budget.saturating_sub(stats.fetched));
            if limit == 0 {
                break;
            }

            let batch = self.fetch_page(kind, channel, after, limit).await?;
            let fetched = batch.len();
            stats.fetched += fetched;

            let items = normalize_batch(kind, channel, &batch, now, &mut stats);
            let stored = if items.is_empty() {
                0
            } else {
                self.store.upsert_content(&items).await?
            };
            stats.stored += stored;

            if fetched < limit {
                break;
            }
            if stats.fetched >= budget {
                log::info!(
                    "⏸️  {} r/{}: item budget of {} reached, resuming next iteration",
                    kind,
                    channel,
                    budget
                );
                break;
            }
            if stored == 0 {
                log::warn!(
                    "⚠️  {} r/{}: full page after {} held nothing new, stopping channel",
                    kind,
                    channel,
                    after
                );
                stats.stalled_channels += 1;
                break;
            }

            after = resume_after(self.store.as_ref(), kind, channel, self.earliest_content).await?;
        }

        Ok(stats)
    }

    /// Ingest every channel for one content kind, sharing the item budget
    pub async fn ingest_kind(
        &self,
        kind: ContentKind,
        channels: &[String],
        now: i64,
    ) -> Result<IngestStats> {
        let mut total = IngestStats::default();

        for channel in channels {
            let remaining = self.item_budget.saturating_sub(total.fetched);
            if remaining == 0 {
                break;
            }
            let stats = self.ingest_channel(kind, channel, remaining, now).await?;
            total.absorb(stats);
        }

        log::info!(
            "✅ Ingested {}: {} fetched, {} new, {} malformed",
            kind,
            total.fetched,
            total.stored,
            total.malformed
        );
        Ok(total)
    }

    /// Ingest posts, then comments
    pub async fn ingest_all(&self, channels: &[String], now: i64) -> Result<IngestStats> {
        let mut total = IngestStats::default();
        for kind in ContentKind::ALL {
            total.absorb(self.ingest_kind(kind, channels, now).await?);
        }
        Ok(total)
    }
}

/// Normalize raw records, skipping (and counting) malformed ones
fn normalize_batch(
    kind: ContentKind,
    channel: &str,
    batch: &[RawItem],
    now: i64,
    stats: &mut IngestStats,
) -> Vec<ContentItem> {
    batch
        .iter()
        .filter_map(|raw| match ContentItem::from_raw(kind, channel, raw, now) {
            Ok(item) => Some(item),
            Err(e) => {
                log::warn!("⚠️  Skipping record from r/{}: {}", channel, e);
                stats.malformed += 1;
                None
            }
        })
        .collect()
}
