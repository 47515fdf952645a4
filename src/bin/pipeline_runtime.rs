//! Pipeline Runtime - continuous ingest/label/invert/score loop
//!
//! Usage:
//!   cargo run --release --bin pipeline_runtime
//!
//! Environment variables (see `PipelineConfig::from_env` for the full list):
//!   TICKERFLOW_DB_PATH - SQLite database path (default: data/tickerflow.db)
//!   CHANNELS - Comma-separated subreddits
//!   MIN_LOOP_SECS - Minimum iteration duration (default: 60)
//!   ENABLE_SCORE_REFRESH - Refresh scores of aged content (default: false)
//!   RUST_LOG - Log level (e.g. info, debug)

use dotenv::dotenv;
use log::{error, info};
use std::sync::Arc;
use tickerflow::pipeline::{
    config::PipelineConfig,
    db::{ContentStore, SqliteContentStore},
    engine::PipelineEngine,
    scorer::LexiconScorer,
};
use tickerflow::sources::{http_client, NasdaqDirectory, PushshiftClient, RedditInfoClient};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize environment and logging
    dotenv().ok();
    env_logger::init();

    info!("🚀 Pipeline Runtime");
    info!("   └─ Version: {}", env!("CARGO_PKG_VERSION"));

    let config = PipelineConfig::from_env()?;

    info!("✅ Configuration loaded");
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Channels: {}", config.channels.join(", "));
    info!("   ├─ Page size: {} (budget {} per kind)", config.page_size, config.ingest_budget);
    info!("   ├─ Batch size: {}", config.batch_size);
    info!("   ├─ Min loop: {}s", config.min_loop_secs);
    info!(
        "   └─ Score refresh: {}",
        if config.enable_score_refresh { "ENABLED" } else { "disabled" }
    );

    // Initialize database (schema migrations are idempotent)
    info!("🔧 Initializing database...");
    let store: Arc<dyn ContentStore> = Arc::new(SqliteContentStore::new(&config.db_path)?);
    info!("✅ Database initialized");

    let http = http_client(config.http_timeout_secs)?;
    let source = Arc::new(PushshiftClient::new(http.clone(), &config.pushshift_url));
    let directory = Arc::new(NasdaqDirectory::new(http.clone(), &config.nasdaq_directory_url));

    let mut engine = PipelineEngine::new(store, source, Arc::new(LexiconScorer::new()), &config)
        .with_ticker_directory(directory);
    if config.enable_score_refresh {
        engine = engine.with_score_lookup(Arc::new(RedditInfoClient::new(
            http,
            &config.reddit_info_url,
        )));
    }
    info!("✅ PipelineEngine created");
    info!("🔄 Press CTRL+C to shutdown");

    // Stages commit per batch, so stopping between awaits loses nothing
    tokio::select! {
        _ = engine.run() => {}
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("⚠️  Received CTRL+C, shutting down..."),
            Err(err) => error!("❌ Failed to listen for CTRL+C: {}", err),
        },
    }

    info!("✅ Pipeline runtime stopped");
    Ok(())
}
