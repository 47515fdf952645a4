//! Ticker labeling
//!
//! Matching rule: a token is a maximal run of non-whitespace characters.
//! It names a ticker when it is one or more ASCII capitals, optionally
//! preceded by a single `$`, and the capitals are in the ticker universe.
//! So `"F is great"` and `"$F"` match `F`, while `"aF"`, `"Fa"` and
//! `"F,"` do not.
//!
//! Short symbols collide with ordinary capitalized words, and index entries
//! are append-only, so ambiguous results are not trusted: no match, or more
//! than `TOO_MANY_LABELS` matches, collapses to `{UNKNOWN}`.

use super::db::ContentStore;
use super::error::Result;
use super::types::{ContentKind, TOO_MANY_LABELS, UNKNOWN_TICKER};
use std::collections::{BTreeMap, BTreeSet};

/// Symbol candidate for a single whitespace-delimited token
fn ticker_token(token: &str) -> Option<&str> {
    let symbol = token.strip_prefix('$').unwrap_or(token);
    if !symbol.is_empty() && symbol.bytes().all(|b| b.is_ascii_uppercase()) {
        Some(symbol)
    } else {
        None
    }
}

/// Label set for one piece of text. Never empty.
pub fn find_tickers(universe: &BTreeSet<String>, text: &str) -> BTreeSet<String> {
    let found: BTreeSet<String> = text
        .split_whitespace()
        .filter_map(ticker_token)
        .filter(|symbol| universe.contains(*symbol))
        .map(str::to_string)
        .collect();

    if found.is_empty() || found.len() > TOO_MANY_LABELS {
        BTreeSet::from([UNKNOWN_TICKER.to_string()])
    } else {
        found
    }
}

/// Label up to `batch_size` unlabeled items and write the labels back.
///
/// Re-entrant: labeled items are excluded by the selection predicate, so a
/// second call without new content sees nothing.
pub async fn label_batch(
    store: &dyn ContentStore,
    kind: ContentKind,
    universe: &BTreeSet<String>,
    batch_size: usize,
) -> Result<BTreeMap<String, BTreeSet<String>>> {
    let items = store.select_unlabeled(kind, batch_size).await?;
    if items.is_empty() {
        return Ok(BTreeMap::new());
    }

    let labels: BTreeMap<String, BTreeSet<String>> = items
        .into_iter()
        .map(|item| {
            let symbols = find_tickers(universe, &item.text);
            (item.id, symbols)
        })
        .collect();

    store.update_labels(kind, &labels).await?;
    Ok(labels)
}

/// Label every unlabeled item of `kind`. Returns the number labeled.
pub async fn label_all(store: &dyn ContentStore, kind: ContentKind, batch_size: usize) -> Result<usize> {
    let universe = store.list_ticker_symbols().await?;
    let mut total = 0;
    let mut unknown = 0;

    loop {
        let labels = label_batch(store, kind, &universe, batch_size).await?;
        if labels.is_empty() {
            break;
        }
        total += labels.len();
        unknown += labels
            .values()
            .filter(|set| set.contains(UNKNOWN_TICKER))
            .count();
    }

    if total > 0 {
        log::info!("🏷️  Labeled {} {} ({} unknown)", total, kind, unknown);
    }
    Ok(total)
}
