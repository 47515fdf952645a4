//! Incremental fetch cursor
//!
//! The cursor is derived state: it is recomputed from the store on every
//! call, never written anywhere. Ingestion advances it only by storing items.

use super::db::ContentStore;
use super::error::Result;
use super::types::ContentKind;

/// Latest processed `created_utc` for a (kind, channel) pair.
///
/// Never returns less than `earliest_allowed`, which bounds how far back a
/// new channel's backfill reaches.
pub async fn latest_timestamp(
    store: &dyn ContentStore,
    kind: ContentKind,
    channel: &str,
    earliest_allowed: i64,
) -> Result<i64> {
    let latest = store.max_created_at(kind, channel).await?;
    Ok(latest.map_or(earliest_allowed, |ts| ts.max(earliest_allowed)))
}

/// Exclusive lower bound for the next fetch.
///
/// One second below the latest stored item, so items sharing that second
/// which didn't fit in the previous page are read again. The id-keyed upsert
/// absorbs the overlap. Without stored content above the floor this is the
/// floor itself.
pub async fn resume_after(
    store: &dyn ContentStore,
    kind: ContentKind,
    channel: &str,
    earliest_allowed: i64,
) -> Result<i64> {
    let latest = latest_timestamp(store, kind, channel, earliest_allowed).await?;
    Ok(if latest > earliest_allowed { latest - 1 } else { earliest_allowed })
}
