//! Composite sentiment aggregation
//!
//! One round queries every adapter concurrently (each bounded by the
//! adapter timeout), drops absent sources, re-normalizes the configured
//! weights over the remainder and derives confidence and market signals.
//!
//! # Example
//!
//! weights `{twitter: 0.40, santiment: 0.35, reddit: 0.25}`, reddit absent:
//! renormalized `{twitter: 0.533, santiment: 0.467}`; with twitter = 0.8 and
//! santiment = 0.6 the composite is ≈ 0.707.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::adapters::traits::SourceAdapter;
use crate::adapters::types::{FetchParams, SourceId, SourceScore};
use crate::error::AppError;

/// Tolerance on the sum of configured weights
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-3;

// =============================================================================
// Errors
// =============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregateError {
    /// Every adapter reported absence (after substitution)
    #[error("no valid sentiment sources ({attempted} attempted)")]
    NoValidSources { attempted: usize },
}

// =============================================================================
// Weights & reliability
// =============================================================================

/// Validated per-source aggregation weights (sum 1.0 ± 1e-3)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SourceWeights(BTreeMap<SourceId, f64>);

impl SourceWeights {
    pub fn new(weights: BTreeMap<SourceId, f64>) -> Result<Self, AppError> {
        if weights.is_empty() {
            return Err(AppError::WeightConfig("no source weights configured".to_string()));
        }
        if let Some((id, w)) = weights.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
            return Err(AppError::WeightConfig(format!(
                "weight for {} must be a non-negative number, got {}",
                id, w
            )));
        }
        let total: f64 = weights.values().sum();
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(AppError::WeightConfig(format!(
                "weights must sum to 1.0, got {:.4}",
                total
            )));
        }
        Ok(Self(weights))
    }

    pub fn get(&self, source: SourceId) -> Option<f64> {
        self.0.get(&source).copied()
    }

    pub fn sources(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.0.keys().copied()
    }

    pub fn as_map(&self) -> &BTreeMap<SourceId, f64> {
        &self.0
    }
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self(BTreeMap::from([
            (SourceId::Twitter, 0.40),
            (SourceId::Santiment, 0.35),
            (SourceId::Reddit, 0.25),
        ]))
    }
}

/// Fixed data-quality table used for confidence, independent of weights
pub type ReliabilityTable = BTreeMap<SourceId, f64>;

pub fn default_reliability() -> ReliabilityTable {
    BTreeMap::from([
        (SourceId::Twitter, 0.4),
        (SourceId::Santiment, 0.4),
        (SourceId::Reddit, 0.2),
        (SourceId::CryptoPanic, 0.3),
    ])
}

// =============================================================================
// Result types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Bearish,
    Neutral,
    Bullish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    Weak,
    Normal,
    Strong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Warning {
    ExtremeFear,
    ExtremeGreed,
    HighDivergence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSignals {
    pub trend: Trend,
    pub strength: Strength,
    pub warnings: BTreeSet<Warning>,
}

impl MarketSignals {
    /// Derive signals from the available (present) scores
    pub fn analyze(scores: &[f64], divergence_threshold: f64) -> Self {
        let mut warnings = BTreeSet::new();

        if scores.iter().any(|s| *s <= 0.2) {
            warnings.insert(Warning::ExtremeFear);
        }
        if scores.iter().any(|s| *s >= 0.8) {
            warnings.insert(Warning::ExtremeGreed);
        }
        if scores.len() >= 2 {
            let max = scores.iter().copied().fold(f64::MIN, f64::max);
            let min = scores.iter().copied().fold(f64::MAX, f64::min);
            if max - min > divergence_threshold {
                warnings.insert(Warning::HighDivergence);
            }
        }

        let mean = if scores.is_empty() {
            0.5
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };
        let trend = if mean < 0.4 {
            Trend::Bearish
        } else if mean > 0.6 {
            Trend::Bullish
        } else {
            Trend::Neutral
        };

        let strength = match warnings.len() {
            0 => Strength::Strong,
            1 => Strength::Normal,
            _ => Strength::Weak,
        };

        Self {
            trend,
            strength,
            warnings,
        }
    }
}

/// Outcome of one aggregation round; immutable once built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeResult {
    pub id: Uuid,
    pub composite_score: f64,
    pub source_scores: BTreeMap<SourceId, SourceScore>,
    /// Renormalized weights of the contributing sources (sum 1.0)
    pub weights_used: BTreeMap<SourceId, f64>,
    pub confidence: f64,
    pub market_signals: MarketSignals,
    /// Slot → stand-in source that filled it this round
    #[serde(default)]
    pub substitutions: BTreeMap<SourceId, SourceId>,
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// Pure composition
// =============================================================================

/// Build a `CompositeResult` from one round's readings.
///
/// Sources without a configured weight never contribute. Confidence uses
/// the reliability of the source that actually answered (the stand-in for
/// substituted slots).
pub fn compose(
    readings: BTreeMap<SourceId, SourceScore>,
    substitutions: BTreeMap<SourceId, SourceId>,
    weights: &SourceWeights,
    reliability: &ReliabilityTable,
    divergence_threshold: f64,
) -> Result<CompositeResult, AggregateError> {
    let attempted = readings.len();

    let available: Vec<(SourceId, f64, f64)> = readings
        .iter()
        .filter_map(|(id, score)| {
            let value = score.value()?;
            let weight = weights.get(*id)?;
            Some((*id, value, weight))
        })
        .collect();

    let total_weight: f64 = available.iter().map(|(_, _, w)| w).sum();
    if available.is_empty() || total_weight <= 0.0 {
        return Err(AggregateError::NoValidSources { attempted });
    }

    let weights_used: BTreeMap<SourceId, f64> = available
        .iter()
        .map(|(id, _, w)| (*id, w / total_weight))
        .collect();

    let composite_score = available
        .iter()
        .map(|(id, value, _)| value * weights_used[id])
        .sum::<f64>()
        .clamp(0.0, 1.0);

    let confidence = available
        .iter()
        .map(|(id, _, _)| {
            let answered_by = substitutions.get(id).unwrap_or(id);
            reliability.get(answered_by).copied().unwrap_or(0.0)
        })
        .sum::<f64>()
        .clamp(0.0, 1.0);

    let values: Vec<f64> = available.iter().map(|(_, v, _)| *v).collect();
    let market_signals = MarketSignals::analyze(&values, divergence_threshold);

    Ok(CompositeResult {
        id: Uuid::new_v4(),
        composite_score,
        source_scores: readings,
        weights_used,
        confidence,
        market_signals,
        substitutions,
        timestamp: Utc::now(),
    })
}

// =============================================================================
// Aggregator
// =============================================================================

/// Query one adapter, mapping a timeout to absence
pub async fn fetch_bounded(adapter: &dyn SourceAdapter, params: &FetchParams, timeout: Duration) -> SourceScore {
    let source = adapter.source_id();
    match tokio::time::timeout(timeout, adapter.fetch(params)).await {
        Ok(score) => SourceScore {
            source,
            reading: score.reading,
        },
        Err(_) => {
            warn!(
                source = %source,
                timeout_ms = timeout.as_millis() as u64,
                "[SOURCE] Timed out - treating as absent"
            );
            SourceScore::absent(source)
        }
    }
}

/// Combines SourceAdapter scores into composite results
pub struct Aggregator {
    sources: Vec<Arc<dyn SourceAdapter>>,
    substitutes: BTreeMap<SourceId, Arc<dyn SourceAdapter>>,
    weights: RwLock<SourceWeights>,
    reliability: ReliabilityTable,
    adapter_timeout: Duration,
    divergence_threshold: f64,
    params: FetchParams,
}

impl Aggregator {
    pub fn new(sources: Vec<Arc<dyn SourceAdapter>>, weights: SourceWeights) -> Self {
        Self {
            sources,
            substitutes: BTreeMap::new(),
            weights: RwLock::new(weights),
            reliability: default_reliability(),
            adapter_timeout: Duration::from_secs(5),
            divergence_threshold: 0.4,
            params: FetchParams::default(),
        }
    }

    pub fn with_reliability(mut self, reliability: ReliabilityTable) -> Self {
        self.reliability = reliability;
        self
    }

    pub fn with_timeout(mut self, adapter_timeout: Duration) -> Self {
        self.adapter_timeout = adapter_timeout;
        self
    }

    pub fn with_divergence_threshold(mut self, divergence_threshold: f64) -> Self {
        self.divergence_threshold = divergence_threshold;
        self
    }

    pub fn with_params(mut self, params: FetchParams) -> Self {
        self.params = params;
        self
    }

    /// Query `stand_in` whenever `primary` is absent in a round
    pub fn with_substitute(mut self, primary: SourceId, stand_in: Arc<dyn SourceAdapter>) -> Self {
        self.substitutes.insert(primary, stand_in);
        self
    }

    pub fn params(&self) -> &FetchParams {
        &self.params
    }

    pub async fn weights(&self) -> SourceWeights {
        self.weights.read().await.clone()
    }

    /// Replace the default weights used by `compute_composite_default`
    pub async fn set_weights(&self, weights: SourceWeights) {
        info!(weights = ?weights.as_map(), "[AGGREGATOR] Weights updated");
        *self.weights.write().await = weights;
    }

    /// Run one round with the current default weights
    pub async fn compute_composite_default(&self) -> Result<CompositeResult, AggregateError> {
        let weights = self.weights().await;
        self.compute_composite(&weights).await
    }

    /// Run one aggregation round with explicit weights
    pub async fn compute_composite(&self, weights: &SourceWeights) -> Result<CompositeResult, AggregateError> {
        let scores = join_all(
            self.sources
                .iter()
                .map(|adapter| fetch_bounded(adapter.as_ref(), &self.params, self.adapter_timeout)),
        )
        .await;

        let mut readings: BTreeMap<SourceId, SourceScore> =
            scores.into_iter().map(|s| (s.source, s)).collect();

        let mut substitutions = BTreeMap::new();
        let missing: Vec<(SourceId, &Arc<dyn SourceAdapter>)> = readings
            .iter()
            .filter(|(_, s)| !s.is_present())
            .filter_map(|(id, _)| self.substitutes.get(id).map(|stand_in| (*id, stand_in)))
            .collect();
        let stand_in_scores = join_all(
            missing
                .iter()
                .map(|(_, stand_in)| fetch_bounded(stand_in.as_ref(), &self.params, self.adapter_timeout)),
        )
        .await;
        for ((primary, stand_in), score) in missing.into_iter().zip(stand_in_scores) {
            if let Some(value) = score.value() {
                warn!(
                    primary = %primary,
                    stand_in = %stand_in.source_id(),
                    score = value,
                    "[AGGREGATOR] Primary absent - using substitute"
                );
                readings.insert(primary, SourceScore::present(primary, value));
                substitutions.insert(primary, stand_in.source_id());
            }
        }

        match compose(
            readings,
            substitutions,
            weights,
            &self.reliability,
            self.divergence_threshold,
        ) {
            Ok(result) => {
                info!(
                    composite = result.composite_score,
                    confidence = result.confidence,
                    trend = ?result.market_signals.trend,
                    warnings = ?result.market_signals.warnings,
                    "[AGGREGATOR] Composite computed"
                );
                debug!(source_scores = ?result.source_scores, "Round readings");
                Ok(result)
            }
            Err(e) => {
                error!(error = %e, "[AGGREGATOR] Round failed");
                Err(e)
            }
        }
    }

    /// Close every adapter, substitutes included
    pub async fn close(&self) {
        for adapter in self.sources.iter().chain(self.substitutes.values()) {
            adapter.close().await;
        }
    }
}
