//! Two-source confirmation state machine
//!
//! ```text
//! Neutral --score <= bearish--> PendingBearish --confirm <= bearish--> emit Defensive, Neutral
//!                                             \--otherwise----------> Neutral (unconfirmed)
//! Neutral --score >= bullish--> PendingBullish --confirm >= bullish--> emit Aggressive, Neutral
//!                                             \--otherwise----------> Neutral (unconfirmed)
//! ```
//!
//! Every new composite supersedes a pending confirmation: the in-flight
//! confirmation call is cancelled and its result discarded. There is no
//! hysteresis; a score oscillating around a threshold can emit on every
//! confirmed crossing.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapters::traits::SourceAdapter;
use crate::adapters::types::{FetchParams, SourceId};
use crate::core::aggregator::{fetch_bounded, CompositeResult};

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerThresholds {
    pub bearish: f64,
    pub bullish: f64,
}

impl Default for TriggerThresholds {
    fn default() -> Self {
        Self {
            bearish: 0.25,
            bullish: 0.75,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Defensive,
    Aggressive,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::Defensive => "defensive",
            IntentKind::Aggressive => "aggressive",
        }
    }
}

/// Emitted once per confirmed crossing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionIntent {
    /// Identifies the confirmed crossing; at most one delivery in flight per id
    pub episode_id: Uuid,
    pub kind: IntentKind,
    pub trigger_score: f64,
    pub confirming_source_score: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerState {
    Neutral,
    PendingBearish,
    PendingBullish,
}

impl TriggerState {
    /// Transition on a fresh composite score; any state restarts from Neutral
    pub fn on_composite(self, score: f64, thresholds: &TriggerThresholds) -> TriggerState {
        if score <= thresholds.bearish {
            TriggerState::PendingBearish
        } else if score >= thresholds.bullish {
            TriggerState::PendingBullish
        } else {
            TriggerState::Neutral
        }
    }

    /// Settle a pending state with the confirming score; always returns to Neutral
    pub fn resolve(self, confirming: Option<f64>, thresholds: &TriggerThresholds) -> (TriggerState, Option<IntentKind>) {
        let kind = match (self, confirming) {
            (TriggerState::PendingBearish, Some(c)) if c <= thresholds.bearish => Some(IntentKind::Defensive),
            (TriggerState::PendingBullish, Some(c)) if c >= thresholds.bullish => Some(IntentKind::Aggressive),
            _ => None,
        };
        (TriggerState::Neutral, kind)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    /// Composite strictly between the thresholds
    NoCrossing,
    Confirmed(ActionIntent),
    /// Second source absent or on the other side of the threshold
    Unconfirmed { pending: TriggerState, confirming: Option<f64> },
    /// A newer composite arrived before the confirmation settled
    Superseded,
}

// =============================================================================
// ActionTrigger
// =============================================================================

#[derive(Debug)]
struct Inner {
    state: TriggerState,
    round: u64,
    pending: Option<CancellationToken>,
}

pub struct ActionTrigger {
    thresholds: TriggerThresholds,
    confirmer: Arc<dyn SourceAdapter>,
    params: FetchParams,
    confirm_timeout: Duration,
    inner: Mutex<Inner>,
}

impl ActionTrigger {
    pub fn new(thresholds: TriggerThresholds, confirmer: Arc<dyn SourceAdapter>) -> Self {
        Self {
            thresholds,
            confirmer,
            params: FetchParams::default(),
            confirm_timeout: Duration::from_secs(5),
            inner: Mutex::new(Inner {
                state: TriggerState::Neutral,
                round: 0,
                pending: None,
            }),
        }
    }

    pub fn with_params(mut self, params: FetchParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_timeout(mut self, confirm_timeout: Duration) -> Self {
        self.confirm_timeout = confirm_timeout;
        self
    }

    pub async fn state(&self) -> TriggerState {
        self.inner.lock().await.state
    }

    pub fn confirmer_source(&self) -> SourceId {
        self.confirmer.source_id()
    }

    /// Feed a full composite through the state machine.
    ///
    /// A composite whose slots were filled by the confirming source cannot be
    /// confirmed by that same source: a crossing is reported unconfirmed
    /// without querying it.
    pub async fn on_composite_result(&self, result: &CompositeResult) -> TriggerOutcome {
        let confirmer = self.confirmer_source();
        if !result.substitutions.values().any(|s| *s == confirmer) {
            return self.on_composite(result.composite_score).await;
        }

        let score = result.composite_score;
        let mut inner = self.inner.lock().await;
        if let Some(previous) = inner.pending.take() {
            debug!("[TRIGGER] Superseding pending confirmation");
            previous.cancel();
        }
        inner.round += 1;
        inner.state = TriggerState::Neutral;

        let pending = TriggerState::Neutral.on_composite(score, &self.thresholds);
        if pending == TriggerState::Neutral {
            return TriggerOutcome::NoCrossing;
        }
        warn!(
            state = ?pending,
            score,
            confirmer = %confirmer,
            "[TRIGGER] Crossing unconfirmed - confirmer already contributed as a stand-in"
        );
        TriggerOutcome::Unconfirmed {
            pending,
            confirming: None,
        }
    }

    /// Feed one composite score through the state machine.
    ///
    /// The state lock is released while the confirming source is queried.
    pub async fn on_composite(&self, score: f64) -> TriggerOutcome {
        let (pending, round, token) = {
            let mut inner = self.inner.lock().await;
            if let Some(previous) = inner.pending.take() {
                debug!("[TRIGGER] Superseding pending confirmation");
                previous.cancel();
            }
            inner.round += 1;

            let next = TriggerState::Neutral.on_composite(score, &self.thresholds);
            inner.state = next;
            if next == TriggerState::Neutral {
                return TriggerOutcome::NoCrossing;
            }

            let token = CancellationToken::new();
            inner.pending = Some(token.clone());
            (next, inner.round, token)
        };

        info!(
            state = ?pending,
            score,
            confirmer = %self.confirmer.source_id(),
            "[TRIGGER] Threshold crossed - awaiting confirmation"
        );

        let confirmation = tokio::select! {
            _ = token.cancelled() => None,
            score = fetch_bounded(self.confirmer.as_ref(), &self.params, self.confirm_timeout) => Some(score),
        };
        let Some(confirmation) = confirmation else {
            info!(state = ?pending, "[TRIGGER] Confirmation abandoned - superseded");
            return TriggerOutcome::Superseded;
        };

        let mut inner = self.inner.lock().await;
        if inner.round != round {
            info!(state = ?pending, "[TRIGGER] Confirmation discarded - superseded");
            return TriggerOutcome::Superseded;
        }
        let confirming = confirmation.value();
        let (next, kind) = pending.resolve(confirming, &self.thresholds);
        inner.state = next;
        inner.pending = None;
        drop(inner);

        match (kind, confirming) {
            (Some(kind), Some(confirming_source_score)) => {
                let intent = ActionIntent {
                    episode_id: Uuid::new_v4(),
                    kind,
                    trigger_score: score,
                    confirming_source_score,
                    timestamp: Utc::now(),
                };
                info!(
                    episode_id = %intent.episode_id,
                    kind = kind.as_str(),
                    trigger_score = score,
                    confirming = confirming_source_score,
                    "[TRIGGER] Crossing confirmed - intent emitted"
                );
                TriggerOutcome::Confirmed(intent)
            }
            _ => {
                info!(
                    state = ?pending,
                    score,
                    confirming = ?confirming,
                    "[TRIGGER] Crossing unconfirmed - back to neutral"
                );
                TriggerOutcome::Unconfirmed {
                    pending,
                    confirming,
                }
            }
        }
    }
}
