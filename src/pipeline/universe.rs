//! Ticker universe refresh
//!
//! Pulls the full list of tradable symbols and inserts the ones the store
//! hasn't seen. Existing tickers keep their content index and prices.

use super::db::ContentStore;
use super::error::Result;
use crate::sources::TickerDirectory;

/// Add unseen symbols from `directory`. Returns the number added.
pub async fn refresh_universe(
    store: &dyn ContentStore,
    directory: &dyn TickerDirectory,
) -> Result<usize> {
    let known = store.list_ticker_symbols().await?;
    let listed = directory.fetch_symbols().await?;
    let total = listed.len();

    let mut unseen: Vec<(String, String)> = listed
        .into_iter()
        .filter(|(symbol, _)| !symbol.is_empty() && !known.contains(symbol))
        .collect();
    unseen.sort();
    unseen.dedup_by(|a, b| a.0 == b.0);

    let added = if unseen.is_empty() {
        0
    } else {
        store.add_tickers(&unseen).await?
    };

    log::info!(
        "📋 Ticker universe: {} listed, {} known, {} added",
        total,
        known.len(),
        added
    );
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::db::SqliteContentStore;
    use crate::pipeline::error::PipelineError;
    use async_trait::async_trait;

    struct FakeDirectory(Vec<(&'static str, &'static str)>);

    #[async_trait]
    impl TickerDirectory for FakeDirectory {
        async fn fetch_symbols(&self) -> Result<Vec<(String, String)>> {
            Ok(self
                .0
                .iter()
                .map(|(s, n)| (s.to_string(), n.to_string()))
                .collect())
        }
    }

    struct DownDirectory;

    #[async_trait]
    impl TickerDirectory for DownDirectory {
        async fn fetch_symbols(&self) -> Result<Vec<(String, String)>> {
            Err(PipelineError::SourceUnavailable("ftp timeout".to_string()))
        }
    }

    #[tokio::test]
    async fn test_only_unseen_symbols_are_added() {
        let store = SqliteContentStore::open_in_memory().unwrap();
        store
            .add_tickers(&[("AAPL".to_string(), "Apple Inc.".to_string())])
            .await
            .unwrap();
        store
            .append_ticker_content_ids("AAPL", &["t3_x".to_string()])
            .await
            .unwrap();

        let directory = FakeDirectory(vec![
            ("AAPL", "Apple Inc. Common Stock"),
            ("MSFT", "Microsoft Corporation"),
            ("MSFT", "Microsoft Corporation"),
            ("F", "Ford Motor Company"),
        ]);

        assert_eq!(refresh_universe(&store, &directory).await.unwrap(), 2);
        assert_eq!(refresh_universe(&store, &directory).await.unwrap(), 0);

        let symbols = store.list_ticker_symbols().await.unwrap();
        assert_eq!(symbols.len(), 3);

        let aapl = store.get_ticker("AAPL").await.unwrap().unwrap();
        assert_eq!(aapl.name, "Apple Inc.");
        assert_eq!(aapl.content_ids, vec!["t3_x"]);
    }

    #[tokio::test]
    async fn test_directory_outage_is_surfaced() {
        let store = SqliteContentStore::open_in_memory().unwrap();
        let result = refresh_universe(&store, &DownDirectory).await;
        assert!(matches!(result, Err(PipelineError::SourceUnavailable(_))));
    }
}
