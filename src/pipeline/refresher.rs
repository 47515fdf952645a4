//! Score refresh for aged content
//!
//! Scores captured at ingestion time are early snapshots. Once an item is
//! older than `update_frequency` and its last retrieval happened less than
//! `update_frequency` after creation, its score is fetched again. Items the
//! lookup no longer returns are flagged deleted and never selected again.

use super::db::ContentStore;
use super::error::Result;
use super::types::{ContentKind, StaleItem};
use crate::sources::ScoreLookup;
use std::collections::BTreeSet;

/// Maximum ids per lookup request
pub const LOOKUP_CHUNK: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Seconds after creation at which a score is considered settled
    pub update_frequency: i64,
    /// Extra age required before a refresh pass starts
    pub update_buffer: i64,
    pub batch_size: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshStats {
    pub updated: usize,
    pub deleted: usize,
}

/// True when at least one item is older than `update_frequency + update_buffer`
/// and still needs its settled score
pub async fn needs_refresh(
    store: &dyn ContentStore,
    kind: ContentKind,
    policy: &RefreshPolicy,
    now: i64,
) -> Result<bool> {
    let cutoff = now - (policy.update_frequency + policy.update_buffer);
    let pending = store
        .select_stale(kind, cutoff, policy.update_frequency, 1)
        .await?;
    Ok(!pending.is_empty())
}

/// Refresh one batch of stale items. Nothing is written if any lookup fails.
pub async fn refresh_batch(
    store: &dyn ContentStore,
    lookup: &dyn ScoreLookup,
    kind: ContentKind,
    policy: &RefreshPolicy,
    now: i64,
) -> Result<RefreshStats> {
    let cutoff = now - policy.update_frequency;
    let stale: Vec<StaleItem> = store
        .select_stale(kind, cutoff, policy.update_frequency, policy.batch_size)
        .await?;
    if stale.is_empty() {
        return Ok(RefreshStats::default());
    }

    let ids: Vec<String> = stale.into_iter().map(|item| item.id).collect();
    let mut updated = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(LOOKUP_CHUNK) {
        updated.extend(lookup.current_scores(kind, chunk).await?);
    }

    let found: BTreeSet<&str> = updated.iter().map(|s| s.id.as_str()).collect();
    let deleted: Vec<String> = ids
        .iter()
        .filter(|id| !found.contains(id.as_str()))
        .cloned()
        .collect();

    store
        .apply_score_updates(kind, &updated, &deleted, now)
        .await?;

    Ok(RefreshStats {
        updated: updated.len(),
        deleted: deleted.len(),
    })
}

/// Refresh stale items of `kind` until none are left
pub async fn refresh_all(
    store: &dyn ContentStore,
    lookup: &dyn ScoreLookup,
    kind: ContentKind,
    policy: &RefreshPolicy,
    now: i64,
) -> Result<RefreshStats> {
    let mut total = RefreshStats::default();
    if !needs_refresh(store, kind, policy, now).await? {
        return Ok(total);
    }

    loop {
        let stats = refresh_batch(store, lookup, kind, policy, now).await?;
        total.updated += stats.updated;
        total.deleted += stats.deleted;

        // A short batch drained the backlog
        if stats.updated + stats.deleted < policy.batch_size.max(1) {
            break;
        }
    }

    log::info!(
        "🔄 Refreshed {} scores: {} updated, {} deleted",
        kind,
        total.updated,
        total.deleted
    );
    Ok(total)
}
