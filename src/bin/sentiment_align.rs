//! Sentiment Align - price refresh and sentiment/price alignment
//!
//! Downloads daily bars (when `TIINGO_API_KEY` is set) and rebuilds the
//! per-bar sentiment aggregates for the given tickers, or for all tickers.
//!
//! Usage:
//!   cargo run --release --bin sentiment_align -- [--skip-prices] [SYMBOL ...]

use dotenv::dotenv;
use log::{info, warn};
use std::collections::BTreeSet;
use tickerflow::pipeline::{
    aligner, config::PipelineConfig, db::SqliteContentStore, prices::update_price_data,
};
use tickerflow::sources::{http_client, TiingoClient};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::init();

    let mut skip_prices = false;
    let mut symbols = BTreeSet::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--skip-prices" => skip_prices = true,
            symbol => {
                symbols.insert(symbol.to_uppercase());
            }
        }
    }
    let symbols = if symbols.is_empty() { None } else { Some(symbols) };

    let config = PipelineConfig::from_env()?;
    let store = SqliteContentStore::new(&config.db_path)?;
    let now = chrono::Utc::now().timestamp();

    info!(
        "📈 Sentiment alignment for {}",
        match &symbols {
            Some(s) => format!("{} tickers", s.len()),
            None => "all tickers".to_string(),
        }
    );

    match (&config.tiingo_api_key, skip_prices) {
        (_, true) => info!("⏭️  Price refresh skipped"),
        (None, false) => warn!("⚠️  TIINGO_API_KEY not set, using stored price series"),
        (Some(key), false) => {
            let http = http_client(config.http_timeout_secs)?;
            let tiingo = TiingoClient::new(http, &config.tiingo_url, key);
            update_price_data(
                &store,
                &tiingo,
                config.price_start_date,
                symbols.as_ref(),
                now,
            )
            .await?;
        }
    }

    let stats = aligner::refresh_all(&store, symbols.as_ref()).await?;
    info!(
        "✅ Done: {} aligned, {} without prices, {} failed",
        stats.aligned, stats.skipped, stats.failed
    );
    Ok(())
}
