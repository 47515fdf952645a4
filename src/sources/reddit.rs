//! reddit `api/info` client for current scores
//!
//! Endpoint: `{url}?id=t3_a,t1_b,..` (at most 100 fullnames per request)
//! Returns a listing: `{"data": {"children": [{"kind": "t3", "data": {"id", "score", ..}}]}}`
//!
//! Removed items are simply absent from the listing.

use super::ScoreLookup;
use crate::pipeline::error::{PipelineError, Result};
use crate::pipeline::types::{ContentKind, ScoreSnapshot};
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: ChildData,
}

#[derive(Debug, Deserialize)]
struct ChildData {
    id: String,
    score: Option<i64>,
}

pub struct RedditInfoClient {
    client: reqwest::Client,
    info_url: String,
}

impl RedditInfoClient {
    pub fn new(client: reqwest::Client, info_url: impl Into<String>) -> Self {
        Self {
            client,
            info_url: info_url.into(),
        }
    }
}

/// Snapshots from an `api/info` listing body
pub fn parse_info_listing(body: &str, retrieved_on: i64) -> Result<Vec<ScoreSnapshot>> {
    let listing: Listing = serde_json::from_str(body).map_err(|e| {
        PipelineError::SourceUnavailable(format!("unexpected api/info response: {}", e))
    })?;

    Ok(listing
        .data
        .children
        .into_iter()
        .filter_map(|child| {
            let score = child.data.score?;
            Some(ScoreSnapshot {
                id: child.data.id,
                score,
                retrieved_on,
            })
        })
        .collect())
}

#[async_trait]
impl ScoreLookup for RedditInfoClient {
    async fn current_scores(&self, kind: ContentKind, ids: &[String]) -> Result<Vec<ScoreSnapshot>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let fullnames = ids
            .iter()
            .map(|id| kind.prefixed(id))
            .collect::<Vec<_>>()
            .join(",");

        let response = self
            .client
            .get(&self.info_url)
            .query(&[("id", fullnames.as_str()), ("raw_json", "1")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PipelineError::SourceUnavailable(format!(
                "api/info for {} {}: HTTP {}",
                ids.len(),
                kind,
                response.status()
            )));
        }

        let body = response.text().await?;
        parse_info_listing(&body, chrono::Utc::now().timestamp())
    }
}
