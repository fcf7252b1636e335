//! Fallback cascade for a starved primary stream
//!
//! When the window is below threshold (or every source is absent) the
//! pipeline asks a secondary, news-style source for a point score and blends
//! it with the smoothed historical sentiment:
//!
//! `blended = w * secondary + (1 - w) * historical` (w = 0.7 by default)
//!
//! With the secondary also absent the historical value is returned as-is
//! and the estimate is flagged `degraded`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::adapters::traits::SourceAdapter;
use crate::adapters::types::{FetchParams, SourceScore};
use crate::core::aggregator::fetch_bounded;
use crate::core::store::{StoreResult, TtlStore};

/// Latest published estimate (window-derived or fallback)
pub const CURRENT_SENTIMENT_KEY: &str = "current_sentiment";
/// Exponentially smoothed baseline
pub const HISTORICAL_SENTIMENT_KEY: &str = "historical_sentiment";
/// Baseline before any observation
pub const NEUTRAL_SENTIMENT: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackEstimate {
    pub value: f64,
    pub secondary: SourceScore,
    pub historical: f64,
    pub degraded: bool,
    pub timestamp: DateTime<Utc>,
}

pub struct FallbackCascade {
    secondary: Arc<dyn SourceAdapter>,
    store: Arc<dyn TtlStore>,
    ttl: Duration,
    secondary_weight: f64,
    smoothing: f64,
    adapter_timeout: Duration,
    params: FetchParams,
}

impl FallbackCascade {
    /// `ttl` is the lifetime of published current-sentiment values
    pub fn new(secondary: Arc<dyn SourceAdapter>, store: Arc<dyn TtlStore>, ttl: Duration) -> Self {
        Self {
            secondary,
            store,
            ttl,
            secondary_weight: 0.7,
            smoothing: 0.2,
            adapter_timeout: Duration::from_secs(5),
            params: FetchParams::default(),
        }
    }

    pub fn with_secondary_weight(mut self, weight: f64) -> Self {
        self.secondary_weight = weight.clamp(0.0, 1.0);
        self
    }

    /// EMA factor for `record_observation`
    pub fn with_smoothing(mut self, smoothing: f64) -> Self {
        self.smoothing = smoothing.clamp(0.0, 1.0);
        self
    }

    pub fn with_timeout(mut self, adapter_timeout: Duration) -> Self {
        self.adapter_timeout = adapter_timeout;
        self
    }

    pub fn with_params(mut self, params: FetchParams) -> Self {
        self.params = params;
        self
    }

    /// Last smoothed sentiment, or 0.5 when none is stored or readable
    pub async fn historical(&self) -> f64 {
        self.read_score(HISTORICAL_SENTIMENT_KEY)
            .await
            .unwrap_or(NEUTRAL_SENTIMENT)
    }

    /// Last published estimate, if still within its TTL
    pub async fn current_sentiment(&self) -> Option<f64> {
        self.read_score(CURRENT_SENTIMENT_KEY).await
    }

    async fn read_score(&self, key: &str) -> Option<f64> {
        match self.store.get(key).await {
            Ok(Some(raw)) => match raw.parse::<f64>() {
                Ok(v) if v.is_finite() => Some(v.clamp(0.0, 1.0)),
                _ => {
                    warn!(key, raw = %raw, "[FALLBACK] Stored value is not a score");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "[FALLBACK] Store read failed");
                None
            }
        }
    }

    /// Produce an estimate; never fails
    pub async fn estimate(&self) -> FallbackEstimate {
        let secondary = fetch_bounded(self.secondary.as_ref(), &self.params, self.adapter_timeout).await;
        let historical = self.historical().await;

        let Some(secondary_value) = secondary.value() else {
            warn!(
                source = %secondary.source,
                historical,
                "[FALLBACK] Secondary absent - degraded mode"
            );
            return FallbackEstimate {
                value: historical,
                secondary,
                historical,
                degraded: true,
                timestamp: Utc::now(),
            };
        };

        let value = (self.secondary_weight * secondary_value
            + (1.0 - self.secondary_weight) * historical)
            .clamp(0.0, 1.0);

        if let Err(e) = self.publish_current(value).await {
            warn!(error = %e, "[FALLBACK] Failed to persist blended estimate");
        }

        info!(
            secondary = secondary_value,
            historical,
            blended = value,
            "[FALLBACK] Blended estimate"
        );
        FallbackEstimate {
            value,
            secondary,
            historical,
            degraded: false,
            timestamp: Utc::now(),
        }
    }

    /// Store `value` as the current sentiment with the window TTL
    pub async fn publish_current(&self, value: f64) -> StoreResult<()> {
        self.store
            .set(CURRENT_SENTIMENT_KEY, value.to_string(), Some(self.ttl))
            .await
    }

    /// Fold a composite score into the historical baseline; returns the new baseline
    pub async fn record_observation(&self, score: f64) -> StoreResult<f64> {
        let previous = self.historical().await;
        let updated = (self.smoothing * score.clamp(0.0, 1.0) + (1.0 - self.smoothing) * previous)
            .clamp(0.0, 1.0);
        self.store
            .set(HISTORICAL_SENTIMENT_KEY, updated.to_string(), None)
            .await?;
        Ok(updated)
    }
}
