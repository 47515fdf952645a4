//! Sentiment scoring
//!
//! `ScoreFunction` is the seam for any polarity model. The built-in
//! `LexiconScorer` is a small rule-based scorer in the style of VADER:
//! per-word valences on a [-4, 4] scale, boosters, negation within three
//! words, and the compound normalization `x / sqrt(x^2 + 15)`.

use super::db::ContentStore;
use super::error::{PipelineError, Result};
use super::types::ContentKind;
use std::collections::{BTreeMap, HashMap};

/// Polarity model: text in, score in [-1, 1] out
pub trait ScoreFunction: Send + Sync {
    fn score(&self, text: &str) -> Result<f64>;
}

const NORMALIZATION_ALPHA: f64 = 15.0;
const BOOSTER_INCREMENT: f64 = 0.293;
const NEGATION_SCALAR: f64 = -0.74;
const NEGATION_WINDOW: usize = 3;

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "nothing", "cannot", "don't", "dont", "doesn't", "didn't", "isn't",
    "wasn't", "aren't", "won't", "can't", "shouldn't", "wouldn't",
];

const BOOSTERS: &[&str] = &[
    "very", "really", "extremely", "super", "so", "incredibly", "totally", "hugely", "massively",
];

const BASE_LEXICON: &[(&str, f64)] = &[
    ("good", 1.9),
    ("great", 3.1),
    ("excellent", 3.2),
    ("awesome", 3.1),
    ("amazing", 2.8),
    ("love", 3.2),
    ("happy", 2.7),
    ("win", 2.8),
    ("winning", 2.4),
    ("profit", 1.9),
    ("profits", 1.9),
    ("gain", 2.0),
    ("gains", 2.0),
    ("strong", 1.8),
    ("beat", 1.5),
    ("rally", 2.0),
    ("soar", 2.5),
    ("soaring", 2.5),
    ("bullish", 2.5),
    ("bull", 1.5),
    ("moon", 2.0),
    ("mooning", 2.5),
    ("rocket", 1.5),
    ("tendies", 2.0),
    ("undervalued", 1.5),
    ("calls", 1.0),
    ("buy", 1.0),
    ("buying", 1.0),
    ("bad", -2.5),
    ("terrible", -3.0),
    ("awful", -3.1),
    ("worst", -3.1),
    ("hate", -2.7),
    ("fear", -2.2),
    ("panic", -2.3),
    ("loss", -2.0),
    ("losses", -2.0),
    ("lose", -2.0),
    ("losing", -2.0),
    ("weak", -1.9),
    ("miss", -1.5),
    ("drop", -1.5),
    ("tank", -2.0),
    ("tanking", -2.3),
    ("crash", -2.7),
    ("dump", -2.0),
    ("dumping", -2.0),
    ("bearish", -2.5),
    ("bear", -1.5),
    ("overvalued", -1.5),
    ("bagholder", -1.8),
    ("bankrupt", -3.0),
    ("bankruptcy", -3.0),
    ("fraud", -3.0),
    ("scam", -2.9),
    ("puts", -1.0),
    ("sell", -1.0),
    ("selling", -1.0),
];

/// Rule-based polarity scorer
#[derive(Debug, Clone)]
pub struct LexiconScorer {
    lexicon: HashMap<String, f64>,
}

impl LexiconScorer {
    pub fn new() -> Self {
        Self {
            lexicon: BASE_LEXICON
                .iter()
                .map(|(word, valence)| (word.to_string(), *valence))
                .collect(),
        }
    }

    /// Compound polarity in [-1, 1]
    pub fn polarity(&self, text: &str) -> f64 {
        let words: Vec<String> = text
            .split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();

        let mut sum = 0.0;
        for (i, word) in words.iter().enumerate() {
            let Some(&valence) = self.lexicon.get(word) else {
                continue;
            };

            let mut value = valence;
            if i > 0 && BOOSTERS.contains(&words[i - 1].as_str()) {
                value += BOOSTER_INCREMENT * value.signum();
            }

            let window = &words[i.saturating_sub(NEGATION_WINDOW)..i];
            if window.iter().any(|w| NEGATIONS.contains(&w.as_str())) {
                value *= NEGATION_SCALAR;
            }

            sum += value;
        }

        normalize(sum)
    }
}

impl Default for LexiconScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreFunction for LexiconScorer {
    fn score(&self, text: &str) -> Result<f64> {
        Ok(self.polarity(text))
    }
}

fn normalize(sum: f64) -> f64 {
    if sum == 0.0 {
        return 0.0;
    }
    (sum / (sum * sum + NORMALIZATION_ALPHA).sqrt()).clamp(-1.0, 1.0)
}

/// Score up to `batch_size` unscored items.
///
/// All-or-nothing: one failed or out-of-range score rejects the whole
/// batch, so every item keeps `sentiment = NULL` for a later retry.
pub async fn score_batch(
    store: &dyn ContentStore,
    kind: ContentKind,
    scorer: &dyn ScoreFunction,
    batch_size: usize,
) -> Result<BTreeMap<String, f64>> {
    let items = store.select_unscored(kind, batch_size).await?;

    let mut scores = BTreeMap::new();
    for item in items {
        let score = scorer.score(&item.text)?;
        if !score.is_finite() || !(-1.0..=1.0).contains(&score) {
            return Err(PipelineError::ScoreFunction(format!(
                "score {} for {} {} is outside [-1, 1]",
                score, kind, item.id
            )));
        }
        scores.insert(item.id, score);
    }

    Ok(scores)
}

/// Score every unscored item of `kind`. Returns the number scored.
pub async fn score_all(
    store: &dyn ContentStore,
    kind: ContentKind,
    scorer: &dyn ScoreFunction,
    batch_size: usize,
) -> Result<usize> {
    let mut total = 0;

    loop {
        let scores = score_batch(store, kind, scorer, batch_size).await?;
        if scores.is_empty() {
            break;
        }
        store.update_sentiment(kind, &scores).await?;
        total += scores.len();
    }

    if total > 0 {
        log::info!("💬 Scored {} {}", total, kind);
    }
    Ok(total)
}
