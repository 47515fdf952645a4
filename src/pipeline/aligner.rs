//! Time-series alignment of sentiment onto daily price bars
//!
//! Each non-zero sentiment event is attributed to the first bar dated on or
//! after the day it was posted (UTC). Events newer than the last bar are
//! dropped until a later price refresh adds that trading day.
//!
//! Aggregates are rebuilt from scratch on every run and events are folded in
//! a fixed `(created_utc, score)` order, so re-running over the same inputs
//! yields bitwise-identical bars regardless of store row order.

use super::db::ContentStore;
use super::error::Result;
use super::types::{PriceBar, SentimentEvent};
use chrono::{DateTime, NaiveDate};
use std::collections::BTreeSet;

/// Counters for one `refresh_all` pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AlignStats {
    pub aligned: usize,
    /// Tickers without a stored price series
    pub skipped: usize,
    pub failed: usize,
}

fn event_date(created_utc: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(created_utc, 0).map(|dt| dt.date_naive())
}

/// Rebuild the per-bar sentiment aggregates of `bars` from `events`
pub fn align(bars: &[PriceBar], events: &[SentimentEvent]) -> Vec<PriceBar> {
    let mut aligned = bars.to_vec();
    aligned.sort_by_key(|bar| bar.date);
    for bar in &mut aligned {
        bar.reset_sentiment();
    }

    let mut signal: Vec<SentimentEvent> = events
        .iter()
        .copied()
        .filter(|e| e.score != 0.0 && e.score.is_finite())
        .collect();
    signal.sort_by(|a, b| {
        a.created_utc
            .cmp(&b.created_utc)
            .then_with(|| a.score.total_cmp(&b.score))
    });

    for event in signal {
        let Some(date) = event_date(event.created_utc) else {
            continue;
        };

        // Right-nearest bar: first with bar.date >= date
        let index = aligned.partition_point(|bar| bar.date < date);
        let Some(bar) = aligned.get_mut(index) else {
            continue;
        };

        if event.score > 0.0 {
            bar.positive_count += 1;
        } else {
            bar.negative_count += 1;
        }
        bar.sentiment_sum += event.score;
    }

    for bar in &mut aligned {
        let scored = bar.positive_count + bar.negative_count;
        bar.scaled_sentiment = if scored > 0 {
            bar.sentiment_sum / f64::from(scored)
        } else {
            0.0
        };
    }

    aligned
}

/// Re-align one ticker. Returns false when it has no price series yet.
pub async fn refresh_ticker_sentiment(store: &dyn ContentStore, symbol: &str) -> Result<bool> {
    let Some(bars) = store.get_price_series(symbol).await? else {
        return Ok(false);
    };

    let events = store.sentiment_events(symbol).await?;
    let aligned = align(&bars, &events);
    store.set_price_series(symbol, &aligned, None).await?;

    log::debug!(
        "📈 {}: {} events over {} bars",
        symbol,
        events.len(),
        aligned.len()
    );
    Ok(true)
}

/// Re-align the given tickers, or every ticker when `symbols` is None.
///
/// A failure on one ticker is logged and does not stop the others.
pub async fn refresh_all(
    store: &dyn ContentStore,
    symbols: Option<&BTreeSet<String>>,
) -> Result<AlignStats> {
    let all;
    let symbols = match symbols {
        Some(symbols) => symbols,
        None => {
            all = store.list_ticker_symbols().await?;
            &all
        }
    };

    let mut stats = AlignStats::default();
    for symbol in symbols {
        match refresh_ticker_sentiment(store, symbol).await {
            Ok(true) => stats.aligned += 1,
            Ok(false) => stats.skipped += 1,
            Err(e) => {
                log::error!("❌ Failed to align sentiment for {}: {}", symbol, e);
                stats.failed += 1;
            }
        }
    }

    log::info!(
        "✅ Sentiment aligned: {} tickers ({} without prices, {} failed)",
        stats.aligned,
        stats.skipped,
        stats.failed
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::db::SqliteContentStore;
    use crate::pipeline::types::{ContentItem, ContentKind, RawItem};
    use std::collections::BTreeMap;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 1, d).unwrap()
    }

    /// Noon UTC on January `d`, 2021
    fn at(d: u32) -> i64 {
        day(d).and_hms_opt(12, 0, 0).unwrap().and_utc().timestamp()
    }

    fn bars(days: &[u32]) -> Vec<PriceBar> {
        days.iter().map(|d| PriceBar::new(day(*d), 10.0, 11.0)).collect()
    }

    fn event(score: f64, created_utc: i64) -> SentimentEvent {
        SentimentEvent { score, created_utc }
    }

    #[test]
    fn test_event_attributes_to_next_bar() {
        let aligned = align(&bars(&[1, 3, 5]), &[event(0.5, at(2)), event(0.9, at(6))]);

        assert_eq!(aligned[1].date, day(3));
        assert_eq!(aligned[1].positive_count, 1);
        assert_eq!(aligned[1].sentiment_sum, 0.5);
        assert_eq!(aligned[1].scaled_sentiment, 0.5);

        // The Jan 6 event has no bar on or after it
        for bar in [&aligned[0], &aligned[2]] {
            assert_eq!(bar.positive_count, 0);
            assert_eq!(bar.negative_count, 0);
            assert_eq!(bar.sentiment_sum, 0.0);
            assert_eq!(bar.scaled_sentiment, 0.0);
        }
    }

    #[test]
    fn test_same_day_event_stays_on_its_bar() {
        let aligned = align(&bars(&[1, 3, 5]), &[event(-0.3, at(3))]);
        assert_eq!(aligned[1].negative_count, 1);
        assert_eq!(aligned[2].negative_count, 0);
    }

    #[test]
    fn test_mixed_signs_scale_by_count() {
        let aligned = align(&bars(&[4]), &[event(0.6, at(4)), event(-0.2, at(4))]);

        let bar = &aligned[0];
        assert_eq!(bar.positive_count, 1);
        assert_eq!(bar.negative_count, 1);
        assert!((bar.sentiment_sum - 0.4).abs() < 1e-12);
        assert!((bar.scaled_sentiment - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_zero_scores_are_ignored() {
        let aligned = align(&bars(&[1]), &[event(0.0, at(1)), event(-0.0, at(1))]);
        assert_eq!(aligned[0].positive_count, 0);
        assert_eq!(aligned[0].negative_count, 0);
        assert_eq!(aligned[0].sentiment_sum, 0.0);
    }

    #[test]
    fn test_realigning_is_bitwise_identical() {
        let events = vec![
            event(0.1, at(1)),
            event(0.7, at(2)),
            event(-0.3, at(2)),
            event(0.2, at(2)),
            event(-0.9, at(4)),
        ];
        let mut shuffled = events.clone();
        shuffled.reverse();

        let first = align(&bars(&[2, 4]), &events);
        // Feeding the output back in must not double count
        let second = align(&first, &shuffled);

        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.scaled_sentiment.to_bits(), b.scaled_sentiment.to_bits());
            assert_eq!(a.sentiment_sum.to_bits(), b.sentiment_sum.to_bits());
            assert_eq!(a.positive_count, b.positive_count);
            assert_eq!(a.negative_count, b.negative_count);
        }
        assert_eq!(first[0].positive_count, 3);
        assert_eq!(first[0].negative_count, 1);
    }

    #[test]
    fn test_unsorted_bars_are_ordered_by_date() {
        let aligned = align(&bars(&[5, 1, 3]), &[event(0.5, at(2))]);
        let dates: Vec<NaiveDate> = aligned.iter().map(|b| b.date).collect();
        assert_eq!(dates, vec![day(1), day(3), day(5)]);
        assert_eq!(aligned[1].positive_count, 1);
    }

    #[tokio::test]
    async fn test_refresh_all_writes_aligned_series() {
        let store = SqliteContentStore::open_in_memory().unwrap();
        store
            .add_tickers(&[
                ("GME".to_string(), "GameStop".to_string()),
                ("AMC".to_string(), "AMC Entertainment".to_string()),
            ])
            .await
            .unwrap();
        store.set_price_series("GME", &bars(&[1, 3, 5]), Some(77)).await.unwrap();

        let raw = RawItem {
            id: Some("c1".to_string()),
            created_utc: Some(at(2)),
            body: Some("GME".to_string()),
            ..Default::default()
        };
        let item = ContentItem::from_raw(ContentKind::Comment, "stocks", &raw, 0).unwrap();
        store.upsert_content(&[item]).await.unwrap();
        let mut scores = BTreeMap::new();
        scores.insert("c1".to_string(), 0.8);
        store.update_sentiment(ContentKind::Comment, &scores).await.unwrap();
        store
            .append_ticker_content_ids("GME", &["t1_c1".to_string()])
            .await
            .unwrap();

        let stats = refresh_all(&store, None).await.unwrap();
        assert_eq!(stats, AlignStats { aligned: 1, skipped: 1, failed: 0 });

        let series = store.get_price_series("GME").await.unwrap().unwrap();
        assert_eq!(series[1].positive_count, 1);
        assert_eq!(series[1].scaled_sentiment, 0.8);
        // Alignment doesn't count as a price refresh
        assert_eq!(store.get_ticker("GME").await.unwrap().unwrap().last_update, Some(77));
    }
}
