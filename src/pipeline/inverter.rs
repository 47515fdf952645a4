//! Ticker index inversion
//!
//! Turns per-item label sets into per-ticker lists of prefixed content ids
//! and folds them into each ticker's append-only content index. Items are
//! flagged processed only after their index entries are committed.

use super::db::ContentStore;
use super::error::Result;
use super::types::{ContentKind, UNKNOWN_TICKER};
use std::collections::{BTreeMap, BTreeSet};

/// Output of one inversion pass
#[derive(Debug, Default, Clone, PartialEq)]
pub struct InvertedBatch {
    /// symbol -> prefixed content ids to append
    pub ticker_updates: BTreeMap<String, Vec<String>>,
    /// Exact ids consumed by this batch
    pub processed_ids: Vec<String>,
}

impl InvertedBatch {
    pub fn is_empty(&self) -> bool {
        self.processed_ids.is_empty()
    }
}

/// Invert `id -> labels` into `symbol -> [prefix + id]`, dropping `UNKNOWN`
pub fn invert_labels(
    kind: ContentKind,
    labels: &BTreeMap<String, BTreeSet<String>>,
) -> BTreeMap<String, Vec<String>> {
    let mut symbol_map: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (id, symbols) in labels {
        for symbol in symbols.iter().filter(|s| s.as_str() != UNKNOWN_TICKER) {
            symbol_map
                .entry(symbol.clone())
                .or_default()
                .push(kind.prefixed(id));
        }
    }

    symbol_map
}

/// Select up to `batch_size` labeled, unprocessed items and invert them
pub async fn invert_batch(
    store: &dyn ContentStore,
    kind: ContentKind,
    batch_size: usize,
) -> Result<InvertedBatch> {
    let items = store.select_unprocessed(kind, batch_size).await?;

    let mut labels = BTreeMap::new();
    let mut processed_ids = Vec::with_capacity(items.len());
    for item in items {
        processed_ids.push(item.id.clone());
        if let Some(set) = item.labels {
            labels.insert(item.id, set);
        }
    }

    Ok(InvertedBatch {
        ticker_updates: invert_labels(kind, &labels),
        processed_ids,
    })
}

/// Append the batch to the ticker index, then flag its items processed
pub async fn commit(store: &dyn ContentStore, kind: ContentKind, batch: &InvertedBatch) -> Result<()> {
    store
        .commit_inversion(kind, &batch.ticker_updates, &batch.processed_ids)
        .await
}

/// Invert every labeled, unprocessed item of `kind`. Returns items processed.
pub async fn invert_all(store: &dyn ContentStore, kind: ContentKind, batch_size: usize) -> Result<usize> {
    let mut total = 0;
    let mut touched: BTreeSet<String> = BTreeSet::new();

    loop {
        let batch = invert_batch(store, kind, batch_size).await?;
        if batch.is_empty() {
            break;
        }
        commit(store, kind, &batch).await?;

        total += batch.processed_ids.len();
        touched.extend(batch.ticker_updates.into_keys());
    }

    if total > 0 {
        log::info!(
            "🔁 Folded {} {} into {} ticker indexes",
            total,
            kind,
            touched.len()
        );
    }
    Ok(total)
}
