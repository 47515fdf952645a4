//! pushshift.io archive client
//!
//! Endpoint: `{base}/search/{submission|comment}/?subreddit=..&after=..&sort=asc&size=..`
//! Returns: `{"data": [ {..record..}, .. ]}`

use super::ContentSource;
use crate::pipeline::error::{PipelineError, Result};
use crate::pipeline::types::{ContentKind, RawItem};
use async_trait::async_trait;
use serde_json::Value;

pub struct PushshiftClient {
    client: reqwest::Client,
    base_url: String,
}

impl PushshiftClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn search_url(&self, kind: ContentKind) -> String {
        let endpoint = match kind {
            ContentKind::Post => "submission",
            ContentKind::Comment => "comment",
        };
        format!("{}/search/{}/", self.base_url, endpoint)
    }
}

/// Records from a search response, oldest first.
///
/// A body without a `data` array is an outage-style failure; individual
/// records are passed through as-is and validated during ingestion.
pub fn parse_search_response(body: &Value) -> Result<Vec<RawItem>> {
    let data = body
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            PipelineError::SourceUnavailable("pushshift response has no data array".to_string())
        })?;

    let mut items: Vec<RawItem> = data.iter().map(RawItem::from_value).collect();
    items.sort_by_key(|item| item.created_utc);
    Ok(items)
}

#[async_trait]
impl ContentSource for PushshiftClient {
    async fn fetch_since(
        &self,
        kind: ContentKind,
        channel: &str,
        after: i64,
        page_size: usize,
    ) -> Result<Vec<RawItem>> {
        let after = after.to_string();
        let size = page_size.to_string();
        let response = self
            .client
            .get(self.search_url(kind))
            .query(&[
                ("subreddit", channel),
                ("after", after.as_str()),
                ("sort", "asc"),
                ("sort_type", "created_utc"),
                ("size", size.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PipelineError::SourceUnavailable(format!(
                "pushshift {} r/{}: HTTP {}",
                kind,
                channel,
                response.status()
            )));
        }

        let body: Value = response.json().await?;
        parse_search_response(&body)
    }
}
