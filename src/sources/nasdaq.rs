//! NASDAQ Trader symbol directory
//!
//! Two pipe-delimited files: `nasdaqlisted.txt` and `otherlisted.txt`.
//! First line is a header, the last is a `File Creation Time: ..` footer,
//! and the first two columns are symbol and security name.

use super::TickerDirectory;
use crate::pipeline::error::{PipelineError, Result};
use async_trait::async_trait;

pub const DIRECTORY_FILES: [&str; 2] = ["nasdaqlisted.txt", "otherlisted.txt"];

pub struct NasdaqDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl NasdaqDirectory {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

/// (symbol, name) pairs from one directory file. Commas are removed from names.
pub fn parse_symbol_directory(text: &str) -> Vec<(String, String)> {
    text.lines()
        .skip(1)
        .filter(|line| !line.starts_with("File Creation Time"))
        .filter_map(|line| {
            let mut columns = line.trim_end_matches('\r').split('|');
            let symbol = columns.next()?.trim();
            let name = columns.next()?.replace(',', "");
            if symbol.is_empty() {
                return None;
            }
            Some((symbol.to_string(), name.trim().to_string()))
        })
        .collect()
}

#[async_trait]
impl TickerDirectory for NasdaqDirectory {
    async fn fetch_symbols(&self) -> Result<Vec<(String, String)>> {
        let mut symbols = Vec::new();

        for file in DIRECTORY_FILES {
            let url = format!("{}/{}", self.base_url, file);
            let response = self.client.get(&url).send().await?;
            if !response.status().is_success() {
                return Err(PipelineError::SourceUnavailable(format!(
                    "{}: HTTP {}",
                    url,
                    response.status()
                )));
            }

            let parsed = parse_symbol_directory(&response.text().await?);
            log::debug!("📋 {}: {} symbols", file, parsed.len());
            symbols.extend(parsed);
        }

        Ok(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_listed_file() {
        let text = "Symbol|Security Name|Market Category|Test Issue|Financial Status|Round Lot Size|ETF|NextShares\r\n\
                    AAPL|Apple Inc. - Common Stock|Q|N|N|100|N|N\r\n\
                    AMZN|Amazon.com, Inc. - Common Stock|Q|N|N|100|N|N\r\n\
                    File Creation Time: 0203202117:01|||||||\r\n";

        let symbols = parse_symbol_directory(text);

        assert_eq!(
            symbols,
            vec![
                ("AAPL".to_string(), "Apple Inc. - Common Stock".to_string()),
                ("AMZN".to_string(), "Amazon.com Inc. - Common Stock".to_string()),
            ]
        );
    }

    #[test]
    fn test_skips_short_and_blank_rows() {
        let text = "ACT Symbol|Security Name|Exchange\n\
                    F|Ford Motor Company Common Stock|N\n\
                    \n\
                    |orphan name|N\n\
                    BROKEN\n";

        let symbols = parse_symbol_directory(text);

        assert_eq!(symbols, vec![("F".to_string(), "Ford Motor Company Common Stock".to_string())]);
    }
}
