//! Daily price refresh
//!
//! Replaces each ticker's stored series with a fresh download. A price
//! source failure for one symbol is logged and that symbol is skipped; its
//! existing series is never cleared. Fresh bars carry no sentiment, so run
//! the aligner after a refresh.

use super::db::ContentStore;
use super::error::{PipelineError, Result};
use crate::sources::PriceSource;
use chrono::NaiveDate;
use std::collections::BTreeSet;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PriceRefreshStats {
    pub updated: usize,
    pub skipped: usize,
}

/// Refresh price series for `symbols`, or for every known ticker when None
pub async fn update_price_data(
    store: &dyn ContentStore,
    source: &dyn PriceSource,
    start_date: NaiveDate,
    symbols: Option<&BTreeSet<String>>,
    now: i64,
) -> Result<PriceRefreshStats> {
    let all;
    let symbols = match symbols {
        Some(symbols) => symbols,
        None => {
            all = store.list_ticker_symbols().await?;
            &all
        }
    };

    let mut stats = PriceRefreshStats::default();
    for symbol in symbols {
        let bars = match source.fetch_daily_series(symbol, start_date).await {
            Ok(bars) => bars,
            Err(e @ PipelineError::PriceSource { .. }) => {
                log::warn!("⚠️  {}", e);
                stats.skipped += 1;
                continue;
            }
            Err(e) => return Err(e),
        };

        store.set_price_series(symbol, &bars, Some(now)).await?;
        stats.updated += 1;
    }

    log::info!(
        "💹 Price refresh: {} updated, {} skipped",
        stats.updated,
        stats.skipped
    );
    Ok(stats)
}
