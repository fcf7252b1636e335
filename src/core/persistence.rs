//! Composite history persistence
//!
//! Append-only recording of every `CompositeResult`. Failures are returned to
//! the pipeline, which logs them and carries on.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::adapters::types::SourceId;
use crate::config::SupabaseConfig;
use crate::core::aggregator::{CompositeResult, Strength, Trend, Warning};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

#[async_trait]
pub trait Recorder: Send + Sync {
    async fn record(&self, result: &CompositeResult) -> Result<(), PersistenceError>;
}

/// Recorder used when no database is configured
#[derive(Debug, Default)]
pub struct NullRecorder;

#[async_trait]
impl Recorder for NullRecorder {
    async fn record(&self, result: &CompositeResult) -> Result<(), PersistenceError> {
        debug!(id = %result.id, "Persistence disabled, composite not saved");
        Ok(())
    }
}

/// Row shape of the `sentiment_history` table
#[derive(Debug, Serialize)]
struct SentimentRow<'a> {
    id: Uuid,
    composite_score: f64,
    confidence: f64,
    trend: Trend,
    strength: Strength,
    warnings: Vec<Warning>,
    /// `null` for absent sources
    source_scores: BTreeMap<SourceId, Option<f64>>,
    weights_used: &'a BTreeMap<SourceId, f64>,
    substitutions: &'a BTreeMap<SourceId, SourceId>,
    recorded_at: DateTime<Utc>,
}

impl<'a> From<&'a CompositeResult> for SentimentRow<'a> {
    fn from(result: &'a CompositeResult) -> Self {
        Self {
            id: result.id,
            composite_score: result.composite_score,
            confidence: result.confidence,
            trend: result.market_signals.trend,
            strength: result.market_signals.strength,
            warnings: result.market_signals.warnings.iter().copied().collect(),
            source_scores: result
                .source_scores
                .iter()
                .map(|(id, score)| (*id, score.value()))
                .collect(),
            weights_used: &result.weights_used,
            substitutions: &result.substitutions,
            recorded_at: result.timestamp,
        }
    }
}

/// Supabase (PostgREST) recorder writing to `/rest/v1/sentiment_history`
pub struct SupabaseRecorder {
    supabase_url: String,
    client: reqwest::Client,
}

impl SupabaseRecorder {
    pub fn new(config: SupabaseConfig) -> Result<Self, PersistenceError> {
        let mut headers = reqwest::header::HeaderMap::new();
        let apikey = reqwest::header::HeaderValue::from_str(config.anon_key.expose())
            .map_err(|e| PersistenceError::DatabaseError(format!("Invalid apikey header: {}", e)))?;
        let bearer = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", config.anon_key.expose()))
            .map_err(|e| PersistenceError::DatabaseError(format!("Invalid authorization header: {}", e)))?;
        headers.insert("apikey", apikey);
        headers.insert(reqwest::header::AUTHORIZATION, bearer);
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(crate::config::constants::http_timeout())
            .build()?;

        Ok(Self {
            supabase_url: config.url,
            client,
        })
    }
}

#[async_trait]
impl Recorder for SupabaseRecorder {
    async fn record(&self, result: &CompositeResult) -> Result<(), PersistenceError> {
        let url = format!("{}/rest/v1/sentiment_history", self.supabase_url);
        let response = self
            .client
            .post(&url)
            .header("Prefer", "return=minimal")
            .json(&SentimentRow::from(result))
            .send()
            .await?;

        match response.status() {
            reqwest::StatusCode::CREATED => {
                info!(
                    id = %result.id,
                    composite = result.composite_score,
                    "[PERSIST] Composite saved to Supabase"
                );
                Ok(())
            }
            reqwest::StatusCode::CONFLICT => {
                let msg = format!("Composite {} already recorded", result.id);
                error!(id = %result.id, "[PERSIST] {}", msg);
                Err(PersistenceError::DatabaseError(msg))
            }
            reqwest::StatusCode::UNAUTHORIZED => {
                error!(id = %result.id, "[PERSIST] Invalid Supabase credentials");
                Err(PersistenceError::DatabaseError(
                    "Invalid Supabase credentials".to_string(),
                ))
            }
            status => {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<no body>".to_string());
                error!(id = %result.id, status = %status, response_body = %body, "[PERSIST] Supabase error");
                Err(PersistenceError::DatabaseError(format!(
                    "Supabase error {}: {}",
                    status, body
                )))
            }
        }
    }
}
