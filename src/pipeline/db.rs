//! Content store: persistence for posts, comments, tickers and price series
//!
//! Tables (see `/sql/`):
//! - `posts`, `comments` - one row per content item, pipeline state in
//!   `labels` / `processed` / `sentiment`
//! - `tickers` - symbol, name, JSON price series
//! - `ticker_content` - append-only (symbol, prefixed content id) index
//!
//! Every multi-row write runs in a single transaction, so a failed batch
//! leaves nothing behind and the stage's selection predicate picks the
//! same rows up again on the next pass.

use super::error::{PipelineError, Result};
use super::types::{
    ContentItem, ContentKind, PriceBar, ScoreSnapshot, SentimentEvent, StaleItem, Ticker,
};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Schema files, applied in order. All statements use IF NOT EXISTS.
const SCHEMA: [(&str, &str); 2] = [
    ("01_content.sql", include_str!("../../sql/01_content.sql")),
    ("02_tickers.sql", include_str!("../../sql/02_tickers.sql")),
];

const CONTENT_COLUMNS: &str = "id, created_utc, subreddit, body, author, score, retrieved_on, \
                               update_age, deleted, labels, processed, sentiment";

/// Read/write interface every pipeline stage talks to.
///
/// A handle is created once by the runtime and passed explicitly to each
/// stage; nothing in the pipeline holds a global connection.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert new items keyed by id.
    ///
    /// Re-fetched ids only refresh `score` and `retrieved_on`; labels,
    /// processed flag and sentiment are never reset. Returns rows inserted.
    async fn upsert_content(&self, items: &[ContentItem]) -> Result<usize>;

    /// Items with `labels IS NULL`
    async fn select_unlabeled(&self, kind: ContentKind, limit: usize) -> Result<Vec<ContentItem>>;

    /// Labeled items with `processed = 0`
    async fn select_unprocessed(&self, kind: ContentKind, limit: usize) -> Result<Vec<ContentItem>>;

    /// Items with `sentiment IS NULL`
    async fn select_unscored(&self, kind: ContentKind, limit: usize) -> Result<Vec<ContentItem>>;

    async fn update_labels(
        &self,
        kind: ContentKind,
        labels: &BTreeMap<String, BTreeSet<String>>,
    ) -> Result<()>;

    async fn update_processed(&self, kind: ContentKind, ids: &[String]) -> Result<()>;

    /// Set-union append to a ticker's content index. Returns ids newly added.
    async fn append_ticker_content_ids(&self, symbol: &str, ids: &[String]) -> Result<usize>;

    /// Fold an inverted batch into the ticker index, then flag its items processed.
    ///
    /// The flag flip must only happen after the appends are committed. Both
    /// steps are idempotent, so a crash in between is safe to retry.
    async fn commit_inversion(
        &self,
        kind: ContentKind,
        ticker_updates: &BTreeMap<String, Vec<String>>,
        processed_ids: &[String],
    ) -> Result<()> {
        for (symbol, ids) in ticker_updates {
            self.append_ticker_content_ids(symbol, ids).await?;
        }
        self.update_processed(kind, processed_ids).await
    }

    async fn update_sentiment(&self, kind: ContentKind, scores: &BTreeMap<String, f64>) -> Result<()>;

    /// Newest `created_utc` stored for a channel
    async fn max_created_at(&self, kind: ContentKind, channel: &str) -> Result<Option<i64>>;

    async fn get_ticker(&self, symbol: &str) -> Result<Option<Ticker>>;

    async fn list_ticker_symbols(&self) -> Result<BTreeSet<String>>;

    /// Insert (symbol, name) pairs not yet present. Returns rows inserted.
    async fn add_tickers(&self, tickers: &[(String, String)]) -> Result<usize>;

    async fn get_price_series(&self, symbol: &str) -> Result<Option<Vec<PriceBar>>>;

    /// Replace a ticker's series. `updated_at` stamps `last_update` when the
    /// bars come from the price source; re-aligned series pass None.
    async fn set_price_series(
        &self,
        symbol: &str,
        bars: &[PriceBar],
        updated_at: Option<i64>,
    ) -> Result<()>;

    /// Scored content attributed to a ticker through its content index
    async fn sentiment_events(&self, symbol: &str) -> Result<Vec<SentimentEvent>>;

    /// Items created before `created_before` whose score hasn't been refreshed
    /// at least `update_frequency` seconds after creation
    async fn select_stale(
        &self,
        kind: ContentKind,
        created_before: i64,
        update_frequency: i64,
        limit: usize,
    ) -> Result<Vec<StaleItem>>;

    /// Write refreshed scores and flag items the source no longer returns
    async fn apply_score_updates(
        &self,
        kind: ContentKind,
        updated: &[ScoreSnapshot],
        deleted: &[String],
        retrieved_on: i64,
    ) -> Result<()>;
}

/// Apply the embedded schema
///
/// Idempotent: every statement uses IF NOT EXISTS, so this runs on each start.
pub fn run_schema_migrations(conn: &mut Connection) -> Result<()> {
    log::info!("🔧 Running schema migrations");

    let tx = conn.transaction()?;
    for (filename, sql) in SCHEMA {
        log::debug!("   ├─ Executing: {}", filename);
        tx.execute_batch(sql)?;
    }
    tx.commit()?;

    log::info!("✅ Schema migrations completed");
    Ok(())
}

/// SQLite implementation of ContentStore
pub struct SqliteContentStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteContentStore {
    /// Open (or create) a database file and bring its schema up to date
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                PipelineError::StoreWrite(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let mut conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        run_schema_migrations(&mut conn)?;

        log::info!("📊 Content store opened: {}", db_path.display());
        Ok(Self::from_connection(conn))
    }

    /// In-memory store with schema applied
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        run_schema_migrations(&mut conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| PipelineError::StoreWrite("connection lock poisoned".to_string()))
    }

    fn select_where(
        &self,
        kind: ContentKind,
        predicate: &str,
        limit: usize,
    ) -> Result<Vec<ContentItem>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&selection_sql(kind, predicate))?;
        let items = stmt
            .query_map([limit as i64], |row| row_to_item(kind, row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    fn load_ticker(conn: &Connection, symbol: &str) -> Result<Option<Ticker>> {
        let row: Option<(String, String, Option<String>, Option<i64>)> = conn
            .query_row(
                "SELECT symbol, name, price_data, last_update FROM tickers WHERE symbol = ?1",
                [symbol],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let Some((symbol, name, price_json, last_update)) = row else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT content_id FROM ticker_content WHERE symbol = ?1 ORDER BY rowid ASC",
        )?;
        let content_ids = stmt
            .query_map([&symbol], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        let price_data = price_json
            .map(|json| serde_json::from_str::<Vec<PriceBar>>(&json))
            .transpose()?;

        Ok(Some(Ticker {
            symbol,
            name,
            content_ids,
            price_data,
            last_update,
        }))
    }
}

const UNLABELED: &str = "labels IS NULL";
const UNPROCESSED: &str = "processed = 0 AND labels IS NOT NULL";
const UNSCORED: &str = "sentiment IS NULL";

fn selection_sql(kind: ContentKind, predicate: &str) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} ORDER BY created_utc ASC, id ASC LIMIT ?1",
        CONTENT_COLUMNS,
        kind.table_name(),
        predicate
    )
}

fn row_to_item(kind: ContentKind, row: &Row<'_>) -> rusqlite::Result<ContentItem> {
    let labels_json: Option<String> = row.get(9)?;
    let labels = labels_json
        .map(|json| serde_json::from_str::<BTreeSet<String>>(&json))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(ContentItem {
        id: row.get(0)?,
        kind,
        created_utc: row.get(1)?,
        channel: row.get(2)?,
        text: row.get(3)?,
        author: row.get(4)?,
        score: row.get(5)?,
        retrieved_on: row.get(6)?,
        update_age: row.get(7)?,
        deleted: row.get(8)?,
        labels,
        processed: row.get(10)?,
        sentiment: row.get(11)?,
    })
}

#[async_trait]
impl ContentStore for SqliteContentStore {
    async fn upsert_content(&self, items: &[ContentItem]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;

        for item in items {
            let sql = format!(
                r#"
                INSERT INTO {} (
                    id, created_utc, subreddit, body, author, score,
                    retrieved_on, update_age, deleted, labels, processed, sentiment
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, NULL, 0, NULL)
                ON CONFLICT(id) DO UPDATE SET
                    score = excluded.score,
                    retrieved_on = excluded.retrieved_on
                "#,
                item.kind.table_name()
            );
            let existed: bool = tx
                .prepare_cached(&format!("SELECT 1 FROM {} WHERE id = ?1", item.kind.table_name()))?
                .exists([&item.id])?;

            tx.execute(
                &sql,
                params![
                    item.id,
                    item.created_utc,
                    item.channel,
                    item.text,
                    item.author,
                    item.score,
                    item.retrieved_on,
                    item.update_age,
                ],
            )?;

            if !existed {
                inserted += 1;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    async fn select_unlabeled(&self, kind: ContentKind, limit: usize) -> Result<Vec<ContentItem>> {
        self.select_where(kind, UNLABELED, limit)
    }

    async fn select_unprocessed(&self, kind: ContentKind, limit: usize) -> Result<Vec<ContentItem>> {
        self.select_where(kind, UNPROCESSED, limit)
    }

    async fn select_unscored(&self, kind: ContentKind, limit: usize) -> Result<Vec<ContentItem>> {
        self.select_where(kind, UNSCORED, limit)
    }

    async fn update_labels(
        &self,
        kind: ContentKind,
        labels: &BTreeMap<String, BTreeSet<String>>,
    ) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "UPDATE {} SET labels = ?1 WHERE id = ?2",
                kind.table_name()
            ))?;
            for (id, symbols) in labels {
                let json = serde_json::to_string(symbols)?;
                stmt.execute(params![json, id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn update_processed(&self, kind: ContentKind, ids: &[String]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "UPDATE {} SET processed = 1 WHERE id = ?1",
                kind.table_name()
            ))?;
            for id in ids {
                stmt.execute([id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn append_ticker_content_ids(&self, symbol: &str, ids: &[String]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut added = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO ticker_content (symbol, content_id) VALUES (?1, ?2)",
            )?;
            for id in ids {
                added += stmt.execute(params![symbol, id])?;
            }
        }
        tx.commit()?;
        Ok(added)
    }

    /// Appends and the processed flip share one transaction here
    async fn commit_inversion(
        &self,
        kind: ContentKind,
        ticker_updates: &BTreeMap<String, Vec<String>>,
        processed_ids: &[String],
    ) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut append = tx.prepare(
                "INSERT OR IGNORE INTO ticker_content (symbol, content_id) VALUES (?1, ?2)",
            )?;
            for (symbol, ids) in ticker_updates {
                for id in ids {
                    append.execute(params![symbol, id])?;
                }
            }

            let mut flag = tx.prepare(&format!(
                "UPDATE {} SET processed = 1 WHERE id = ?1",
                kind.table_name()
            ))?;
            for id in processed_ids {
                flag.execute([id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn update_sentiment(&self, kind: ContentKind, scores: &BTreeMap<String, f64>) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "UPDATE {} SET sentiment = ?1 WHERE id = ?2",
                kind.table_name()
            ))?;
            for (id, score) in scores {
                stmt.execute(params![score, id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn max_created_at(&self, kind: ContentKind, channel: &str) -> Result<Option<i64>> {
        let conn = self.lock()?;
        let latest = conn.query_row(
            &format!(
                "SELECT MAX(created_utc) FROM {} WHERE subreddit = ?1",
                kind.table_name()
            ),
            [channel],
            |row| row.get(0),
        )?;
        Ok(latest)
    }

    async fn get_ticker(&self, symbol: &str) -> Result<Option<Ticker>> {
        let conn = self.lock()?;
        Self::load_ticker(&conn, symbol)
    }

    async fn list_ticker_symbols(&self) -> Result<BTreeSet<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT symbol FROM tickers")?;
        let symbols = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<BTreeSet<String>>>()?;
        Ok(symbols)
    }

    async fn add_tickers(&self, tickers: &[(String, String)]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt =
                tx.prepare("INSERT OR IGNORE INTO tickers (symbol, name) VALUES (?1, ?2)")?;
            for (symbol, name) in tickers {
                inserted += stmt.execute(params![symbol, name])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    async fn get_price_series(&self, symbol: &str) -> Result<Option<Vec<PriceBar>>> {
        let conn = self.lock()?;
        let json: Option<Option<String>> = conn
            .query_row(
                "SELECT price_data FROM tickers WHERE symbol = ?1",
                [symbol],
                |row| row.get(0),
            )
            .optional()?;

        match json.flatten() {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set_price_series(
        &self,
        symbol: &str,
        bars: &[PriceBar],
        updated_at: Option<i64>,
    ) -> Result<()> {
        let json = serde_json::to_string(bars)?;
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE tickers SET price_data = ?1, last_update = COALESCE(?2, last_update)
             WHERE symbol = ?3",
            params![json, updated_at, symbol],
        )?;
        if changed == 0 {
            return Err(PipelineError::StoreWrite(format!(
                "Ticker {} not found, price series not written",
                symbol
            )));
        }
        Ok(())
    }

    async fn sentiment_events(&self, symbol: &str) -> Result<Vec<SentimentEvent>> {
        let conn = self.lock()?;
        let mut events = Vec::new();

        for kind in ContentKind::ALL {
            let sql = format!(
                r#"
                SELECT c.sentiment, c.created_utc
                FROM ticker_content tc
                JOIN {} c ON c.id = substr(tc.content_id, length(?2) + 1)
                WHERE tc.symbol = ?1
                  AND substr(tc.content_id, 1, length(?2)) = ?2
                  AND c.sentiment IS NOT NULL
                "#,
                kind.table_name()
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![symbol, kind.id_prefix()], |row| {
                Ok(SentimentEvent {
                    score: row.get(0)?,
                    created_utc: row.get(1)?,
                })
            })?;
            for event in rows {
                events.push(event?);
            }
        }

        Ok(events)
    }

    async fn select_stale(
        &self,
        kind: ContentKind,
        created_before: i64,
        update_frequency: i64,
        limit: usize,
    ) -> Result<Vec<StaleItem>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT id, created_utc FROM {}
             WHERE created_utc < ?1 AND update_age < ?2 AND deleted = 0
             ORDER BY created_utc ASC
             LIMIT ?3",
            kind.table_name()
        ))?;
        let items = stmt
            .query_map(params![created_before, update_frequency, limit as i64], |row| {
                Ok(StaleItem {
                    id: row.get(0)?,
                    created_utc: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    async fn apply_score_updates(
        &self,
        kind: ContentKind,
        updated: &[ScoreSnapshot],
        deleted: &[String],
        retrieved_on: i64,
    ) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut update = tx.prepare(&format!(
                "UPDATE {} SET score = ?1, retrieved_on = ?2, update_age = ?2 - created_utc
                 WHERE id = ?3",
                kind.table_name()
            ))?;
            for snapshot in updated {
                update.execute(params![snapshot.score, snapshot.retrieved_on, snapshot.id])?;
            }

            let mut flag = tx.prepare(&format!(
                "UPDATE {} SET deleted = 1, retrieved_on = ?1, update_age = ?1 WHERE id = ?2",
                kind.table_name()
            ))?;
            for id in deleted {
                flag.execute(params![retrieved_on, id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::RawItem;
    use chrono::NaiveDate;
    use tempfile::NamedTempFile;

    /// Helper to create a file-backed test store
    fn create_test_db() -> (NamedTempFile, SqliteContentStore) {
        let temp_file = NamedTempFile::new().unwrap();
        let store = SqliteContentStore::new(temp_file.path()).unwrap();
        (temp_file, store)
    }

    fn make_item(kind: ContentKind, id: &str, created_utc: i64, text: &str) -> ContentItem {
        let raw = RawItem {
            id: Some(id.to_string()),
            created_utc: Some(created_utc),
            title: Some(text.to_string()),
            body: Some(text.to_string()),
            score: Some(1),
            retrieved_on: Some(created_utc),
            ..Default::default()
        };
        ContentItem::from_raw(kind, "stocks", &raw, created_utc).unwrap()
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let temp_file = NamedTempFile::new().unwrap();
        let mut conn = Connection::open(temp_file.path()).unwrap();
        run_schema_migrations(&mut conn).unwrap();
        run_schema_migrations(&mut conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('posts', 'comments', 'tickers', 'ticker_content')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 4);
    }

    #[tokio::test]
    async fn test_upsert_preserves_pipeline_state() {
        let (_temp, store) = create_test_db();
        let item = make_item(ContentKind::Comment, "c1", 1000, "AAPL up");

        assert_eq!(store.upsert_content(&[item.clone()]).await.unwrap(), 1);

        let mut labels = BTreeMap::new();
        labels.insert("c1".to_string(), BTreeSet::from(["AAPL".to_string()]));
        store.update_labels(ContentKind::Comment, &labels).await.unwrap();

        // Overlapping re-fetch with a newer score
        let mut refetched = item.clone();
        refetched.score = Some(42);
        assert_eq!(store.upsert_content(&[refetched]).await.unwrap(), 0);

        let conn = store.conn.lock().unwrap();
        let (score, labels): (i64, String) = conn
            .query_row("SELECT score, labels FROM comments WHERE id = 'c1'", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(score, 42);
        assert_eq!(labels, r#"["AAPL"]"#);
    }

    #[tokio::test]
    async fn test_selection_predicates() {
        let store = SqliteContentStore::open_in_memory().unwrap();
        store
            .upsert_content(&[
                make_item(ContentKind::Post, "p1", 100, "one"),
                make_item(ContentKind::Post, "p2", 200, "two"),
            ])
            .await
            .unwrap();

        assert_eq!(store.select_unlabeled(ContentKind::Post, 10).await.unwrap().len(), 2);
        assert_eq!(store.select_unlabeled(ContentKind::Comment, 10).await.unwrap().len(), 0);
        // Unlabeled items are never eligible for inversion
        assert!(store.select_unprocessed(ContentKind::Post, 10).await.unwrap().is_empty());

        let mut labels = BTreeMap::new();
        labels.insert("p1".to_string(), BTreeSet::from(["UNKNOWN".to_string()]));
        store.update_labels(ContentKind::Post, &labels).await.unwrap();

        let unlabeled = store.select_unlabeled(ContentKind::Post, 10).await.unwrap();
        assert_eq!(unlabeled.len(), 1);
        assert_eq!(unlabeled[0].id, "p2");

        let unprocessed = store.select_unprocessed(ContentKind::Post, 10).await.unwrap();
        assert_eq!(unprocessed.len(), 1);
        assert_eq!(
            unprocessed[0].labels,
            Some(BTreeSet::from(["UNKNOWN".to_string()]))
        );

        assert_eq!(store.select_unscored(ContentKind::Post, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_append_is_set_union() {
        let store = SqliteContentStore::open_in_memory().unwrap();
        store
            .add_tickers(&[("AAPL".to_string(), "Apple Inc.".to_string())])
            .await
            .unwrap();

        let ids = vec!["t3_a".to_string(), "t1_b".to_string()];
        assert_eq!(store.append_ticker_content_ids("AAPL", &ids).await.unwrap(), 2);
        assert_eq!(store.append_ticker_content_ids("AAPL", &ids).await.unwrap(), 0);

        let ticker = store.get_ticker("AAPL").await.unwrap().unwrap();
        assert_eq!(ticker.content_ids, ids);
        assert_eq!(ticker.name, "Apple Inc.");
    }

    #[tokio::test]
    async fn test_max_created_at_per_channel() {
        let store = SqliteContentStore::open_in_memory().unwrap();
        assert_eq!(store.max_created_at(ContentKind::Post, "stocks").await.unwrap(), None);

        store
            .upsert_content(&[
                make_item(ContentKind::Post, "p1", 100, "one"),
                make_item(ContentKind::Post, "p2", 300, "two"),
            ])
            .await
            .unwrap();

        assert_eq!(store.max_created_at(ContentKind::Post, "stocks").await.unwrap(), Some(300));
        assert_eq!(store.max_created_at(ContentKind::Post, "options").await.unwrap(), None);
        assert_eq!(store.max_created_at(ContentKind::Comment, "stocks").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_price_series_round_trip_and_missing_ticker() {
        let store = SqliteContentStore::open_in_memory().unwrap();
        store
            .add_tickers(&[("F".to_string(), "Ford Motor Company".to_string())])
            .await
            .unwrap();
        assert_eq!(store.get_price_series("F").await.unwrap(), None);

        let bars = vec![PriceBar::new(NaiveDate::from_ymd_opt(2020, 1, 2).unwrap(), 9.0, 9.5)];
        store.set_price_series("F", &bars, Some(1234)).await.unwrap();
        assert_eq!(store.get_price_series("F").await.unwrap(), Some(bars.clone()));
        assert_eq!(store.get_ticker("F").await.unwrap().unwrap().last_update, Some(1234));

        // Rewriting without a timestamp keeps the last price refresh time
        store.set_price_series("F", &bars, None).await.unwrap();
        assert_eq!(store.get_ticker("F").await.unwrap().unwrap().last_update, Some(1234));

        let result = store.set_price_series("NOPE", &bars, Some(1234)).await;
        assert!(matches!(result, Err(PipelineError::StoreWrite(_))));
    }

    #[tokio::test]
    async fn test_sentiment_events_follow_content_index() {
        let store = SqliteContentStore::open_in_memory().unwrap();
        store
            .add_tickers(&[("GME".to_string(), "GameStop".to_string())])
            .await
            .unwrap();
        store
            .upsert_content(&[
                make_item(ContentKind::Post, "x", 100, "GME"),
                make_item(ContentKind::Comment, "x", 200, "GME"),
                make_item(ContentKind::Comment, "unscored", 300, "GME"),
            ])
            .await
            .unwrap();

        let mut post_scores = BTreeMap::new();
        post_scores.insert("x".to_string(), 0.5);
        store.update_sentiment(ContentKind::Post, &post_scores).await.unwrap();
        let mut comment_scores = BTreeMap::new();
        comment_scores.insert("x".to_string(), -0.25);
        store.update_sentiment(ContentKind::Comment, &comment_scores).await.unwrap();

        store
            .append_ticker_content_ids(
                "GME",
                &["t3_x".to_string(), "t1_x".to_string(), "t1_unscored".to_string()],
            )
            .await
            .unwrap();

        let mut events = store.sentiment_events("GME").await.unwrap();
        events.sort_by_key(|e| e.created_utc);
        assert_eq!(
            events,
            vec![
                SentimentEvent { score: 0.5, created_utc: 100 },
                SentimentEvent { score: -0.25, created_utc: 200 },
            ]
        );
    }

    #[tokio::test]
    async fn test_score_updates_and_deletion_flag() {
        let store = SqliteContentStore::open_in_memory().unwrap();
        store
            .upsert_content(&[
                make_item(ContentKind::Post, "alive", 100, "a"),
                make_item(ContentKind::Post, "gone", 100, "b"),
            ])
            .await
            .unwrap();

        let stale = store.select_stale(ContentKind::Post, 1000, 500, 10).await.unwrap();
        assert_eq!(stale.len(), 2);

        let updated = vec![ScoreSnapshot {
            id: "alive".to_string(),
            score: 77,
            retrieved_on: 2000,
        }];
        store
            .apply_score_updates(ContentKind::Post, &updated, &["gone".to_string()], 2000)
            .await
            .unwrap();

        // Neither item is stale anymore: one refreshed late enough, one deleted
        assert!(store.select_stale(ContentKind::Post, 1000, 500, 10).await.unwrap().is_empty());

        let conn = store.conn.lock().unwrap();
        let (score, age): (i64, i64) = conn
            .query_row("SELECT score, update_age FROM posts WHERE id = 'alive'", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(score, 77);
        assert_eq!(age, 1900);

        let deleted: bool = conn
            .query_row("SELECT deleted FROM posts WHERE id = 'gone'", [], |row| row.get(0))
            .unwrap();
        assert!(deleted);
    }

    fn row_count(store: &SqliteContentStore, sql: &str) -> i64 {
        store.conn.lock().unwrap().query_row(sql, [], |row| row.get(0)).unwrap()
    }

    #[tokio::test]
    async fn test_failed_upsert_commits_nothing() {
        let store = SqliteContentStore::open_in_memory().unwrap();
        store
            .conn
            .lock()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_c3 BEFORE INSERT ON comments WHEN NEW.id = 'c3'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let items: Vec<ContentItem> = (1..=4)
            .map(|i| make_item(ContentKind::Comment, &format!("c{}", i), 100 + i, "text"))
            .collect();
        assert!(store.upsert_content(&items).await.is_err());

        assert_eq!(row_count(&store, "SELECT COUNT(*) FROM comments"), 0);
        // The store stays usable after the rollback
        assert_eq!(store.upsert_content(&items[..2]).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_inversion_commits_nothing() {
        let store = SqliteContentStore::open_in_memory().unwrap();
        store
            .upsert_content(&[
                make_item(ContentKind::Comment, "a", 100, "GME"),
                make_item(ContentKind::Comment, "b", 200, "AMC"),
            ])
            .await
            .unwrap();
        // Fails after every append and the first processed flip have run
        store
            .conn
            .lock()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_b BEFORE UPDATE OF processed ON comments
                 WHEN NEW.id = 'b' AND NEW.processed = 1
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let updates = BTreeMap::from([
            ("AMC".to_string(), vec!["t1_b".to_string()]),
            ("GME".to_string(), vec!["t1_a".to_string()]),
        ]);
        let processed = vec!["a".to_string(), "b".to_string()];
        let result = store
            .commit_inversion(ContentKind::Comment, &updates, &processed)
            .await;

        assert!(result.is_err());
        assert_eq!(row_count(&store, "SELECT COUNT(*) FROM ticker_content"), 0);
        assert_eq!(
            row_count(&store, "SELECT COUNT(*) FROM comments WHERE processed = 1"),
            0
        );
    }

    #[tokio::test]
    async fn test_selections_read_through_ordered_indexes() {
        let store = SqliteContentStore::open_in_memory().unwrap();
        let conn = store.conn.lock().unwrap();

        for (predicate, index) in [
            (UNLABELED, "idx_posts_unlabeled_created"),
            (UNPROCESSED, "idx_posts_unprocessed_created"),
            (UNSCORED, "idx_posts_unscored_created"),
        ] {
            let sql = format!("EXPLAIN QUERY PLAN {}", selection_sql(ContentKind::Post, predicate));
            let mut stmt = conn.prepare(&sql).unwrap();
            let plan: Vec<String> = stmt
                .query_map([10_i64], |row| row.get(3))
                .unwrap()
                .collect::<rusqlite::Result<_>>()
                .unwrap();
            let plan = plan.join("\n");

            assert!(plan.contains(index), "{}: {}", predicate, plan);
            assert!(!plan.contains("TEMP B-TREE"), "{}: {}", predicate, plan);
        }
    }
}
