//! Text scoring collaborator
//!
//! `TextScorer` turns raw texts into sentiment scores in [0,1]. Two
//! implementations ship with the crate:
//! - `LexiconScorer`: local word lexicon plus crypto-specific term adjustments
//! - `HttpTextScorer`: delegates to a model-inference endpoint

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::adapters::errors::{SourceError, SourceResult};
use crate::adapters::http::build_client;
use crate::adapters::types::{weighted_mean, Credential};

// =============================================================================
// Contract
// =============================================================================

#[derive(Error, Debug)]
pub enum ScorerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Scorer returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid scorer response: {0}")]
    InvalidResponse(String),

    #[error("Scorer returned {got} scores for {expected} texts")]
    LengthMismatch { expected: usize, got: usize },
}

/// Stateless text → score function; batching is the implementor's concern
#[async_trait]
pub trait TextScorer: Send + Sync {
    /// One score in [0,1] per input text, same order
    async fn score(&self, texts: &[String]) -> Result<Vec<f64>, ScorerError>;
}

/// Score `(text, weight)` pairs and return their weighted mean.
///
/// Used by every text-based adapter; an empty batch is `NoData`.
pub async fn score_weighted(scorer: &dyn TextScorer, items: Vec<(String, f64)>) -> SourceResult<f64> {
    if items.is_empty() {
        return Err(SourceError::NoData);
    }

    let (texts, weights): (Vec<String>, Vec<f64>) = items.into_iter().unzip();
    let scores = scorer
        .score(&texts)
        .await
        .map_err(|e| SourceError::Scoring(e.to_string()))?;

    if scores.len() != texts.len() {
        return Err(SourceError::Scoring(
            ScorerError::LengthMismatch {
                expected: texts.len(),
                got: scores.len(),
            }
            .to_string(),
        ));
    }

    weighted_mean(scores.into_iter().zip(weights)).ok_or(SourceError::NoData)
}

// =============================================================================
// Lexicon scorer
// =============================================================================

/// Crypto-specific terms and their sentiment weights
const CRYPTO_TERMS: &[(&str, f64)] = &[
    ("hack", -0.8),
    ("security breach", -0.9),
    ("partnership", 0.6),
    ("adoption", 0.7),
    ("integration", 0.5),
    ("upgrade", 0.4),
    ("vulnerability", -0.7),
    ("scam", -0.9),
    ("mainnet", 0.6),
    ("launch", 0.5),
];

/// Share of the crypto-term adjustment applied on top of the base score
const CRYPTO_TERM_DAMPENING: f64 = 0.3;

/// Normalization constant for summed valences (x / sqrt(x² + α))
const VALENCE_ALPHA: f64 = 15.0;

/// Valence multiplier applied after a negation word
const NEGATION_SCALAR: f64 = -0.74;

const GENERAL_LEXICON: &[(&str, f64)] = &[
    ("good", 1.9),
    ("great", 3.1),
    ("amazing", 2.8),
    ("love", 3.2),
    ("bullish", 2.5),
    ("moon", 2.0),
    ("pump", 1.5),
    ("gain", 2.0),
    ("gains", 2.0),
    ("growth", 2.0),
    ("rally", 2.0),
    ("strong", 2.3),
    ("win", 2.8),
    ("excited", 2.2),
    ("optimistic", 2.0),
    ("profit", 2.0),
    ("success", 2.7),
    ("breakout", 1.8),
    ("buy", 1.0),
    ("bad", -2.5),
    ("terrible", -3.0),
    ("bearish", -2.5),
    ("dump", -2.0),
    ("crash", -2.8),
    ("loss", -2.0),
    ("losses", -2.0),
    ("weak", -1.9),
    ("fear", -2.2),
    ("panic", -2.5),
    ("sell", -1.0),
    ("rug", -2.8),
    ("fraud", -3.0),
    ("exploit", -2.5),
    ("fail", -2.5),
    ("failed", -2.4),
    ("worried", -1.8),
    ("hate", -2.7),
    ("scared", -2.2),
    ("dead", -3.0),
];

const NEGATIONS: &[&str] = &["not", "no", "never", "isn't", "don't", "doesn't", "won't", "cannot"];

/// Local lexicon-based scorer
#[derive(Debug, Clone, Default)]
pub struct LexiconScorer;

impl LexiconScorer {
    pub fn new() -> Self {
        Self
    }

    /// Strip URLs, mentions and the hashtag sign; collapse whitespace
    pub fn preprocess(text: &str) -> String {
        text.split_whitespace()
            .filter(|token| !token.starts_with("http") && !token.starts_with("www."))
            .filter(|token| !token.starts_with('@'))
            .map(|token| token.replace('#', ""))
            .filter(|token| !token.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Score one text in [0,1]; 0.5 is neutral
    pub fn score_text(&self, text: &str) -> f64 {
        let cleaned = Self::preprocess(text).to_lowercase();

        let mut raw = 0.0;
        let mut previous: Option<&str> = None;
        for token in cleaned
            .split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '$'))
            .filter(|t| !t.is_empty())
        {
            if let Some(valence) = lookup(GENERAL_LEXICON, token) {
                let negated = previous.map(|p| NEGATIONS.contains(&p)).unwrap_or(false);
                raw += if negated { valence * NEGATION_SCALAR } else { valence };
            }
            previous = Some(token);
        }

        let base = 0.5 + 0.5 * raw / (raw * raw + VALENCE_ALPHA).sqrt();

        let adjustment: f64 = CRYPTO_TERMS
            .iter()
            .filter(|(term, _)| cleaned.contains(term))
            .map(|(_, weight)| weight)
            .sum();

        (base + adjustment * CRYPTO_TERM_DAMPENING).clamp(0.0, 1.0)
    }
}

fn lookup(table: &[(&str, f64)], token: &str) -> Option<f64> {
    table.iter().find(|(word, _)| *word == token).map(|(_, v)| *v)
}

#[async_trait]
impl TextScorer for LexiconScorer {
    async fn score(&self, texts: &[String]) -> Result<Vec<f64>, ScorerError> {
        Ok(texts.iter().map(|t| self.score_text(t)).collect())
    }
}

// =============================================================================
// HTTP scorer
// =============================================================================

#[derive(Debug, Serialize)]
struct ScoreRequest<'a> {
    texts: &'a [String],
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    scores: Vec<f64>,
}

/// Scorer backed by a remote inference endpoint.
///
/// POSTs `{"texts": [...]}` and expects `{"scores": [...]}`.
pub struct HttpTextScorer {
    url: String,
    api_key: Option<Credential>,
    http_client: reqwest::Client,
}

impl HttpTextScorer {
    pub fn new(url: impl Into<String>, api_key: Option<Credential>) -> Self {
        Self {
            url: url.into(),
            api_key,
            http_client: build_client("sentiment_engine/text-scorer"),
        }
    }

    /// Build from `TEXT_SCORER_URL` / `TEXT_SCORER_API_KEY`; `None` if unset
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("TEXT_SCORER_URL")
            .ok()
            .filter(|u| !u.trim().is_empty())?;
        Some(Self::new(url, Credential::from_env("TEXT_SCORER_API_KEY")))
    }
}

#[async_trait]
impl TextScorer for HttpTextScorer {
    async fn score(&self, texts: &[String]) -> Result<Vec<f64>, ScorerError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self.http_client.post(&self.url).json(&ScoreRequest { texts });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose());
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(ScorerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let parsed: ScoreResponse =
            serde_json::from_str(&body).map_err(|e| ScorerError::InvalidResponse(e.to_string()))?;

        if parsed.scores.len() != texts.len() {
            return Err(ScorerError::LengthMismatch {
                expected: texts.len(),
                got: parsed.scores.len(),
            });
        }
        if let Some(bad) = parsed
            .scores
            .iter()
            .find(|s| !s.is_finite() || **s < 0.0 || **s > 1.0)
        {
            return Err(ScorerError::InvalidResponse(format!(
                "score {} outside [0,1]",
                bad
            )));
        }

        debug!(batch = texts.len(), "Remote scorer batch complete");
        Ok(parsed.scores)
    }
}

/// Remote scorer when `TEXT_SCORER_URL` is set, the local lexicon otherwise
pub fn scorer_from_env() -> Arc<dyn TextScorer> {
    match HttpTextScorer::from_env() {
        Some(remote) => {
            info!(url = %remote.url, "[CONFIG] Using remote text scorer");
            Arc::new(remote)
        }
        None => {
            info!("[CONFIG] Using local lexicon scorer");
            Arc::new(LexiconScorer::new())
        }
    }
}
