//! Action intent delivery
//!
//! The pipeline hands confirmed intents to an `IntentDispatcher`, which
//! delivers them in the background. Delivery failures are logged and
//! swallowed; a second dispatch of the same episode is refused while the
//! first is still in flight.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::core::trigger::ActionIntent;

/// Contract method notified on every intent
pub const CONTRACT_METHOD: &str = "handle_twitter_sentiment";

#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Actuator rejected intent with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// External receiver of action intents; assumed idempotent under retry
#[async_trait]
pub trait Actuator: Send + Sync {
    async fn notify(&self, intent: &ActionIntent) -> Result<(), ActuatorError>;
}

// =============================================================================
// Implementations
// =============================================================================

#[derive(Debug, Serialize)]
struct ContractArgs {
    sentiment: f64,
}

#[derive(Debug, Serialize)]
struct ContractCall {
    method: &'static str,
    args: ContractArgs,
    action: &'static str,
    episode_id: Uuid,
    confirming_source_score: f64,
    timestamp: DateTime<Utc>,
}

impl From<&ActionIntent> for ContractCall {
    fn from(intent: &ActionIntent) -> Self {
        Self {
            method: CONTRACT_METHOD,
            args: ContractArgs {
                sentiment: intent.trigger_score,
            },
            action: intent.kind.as_str(),
            episode_id: intent.episode_id,
            confirming_source_score: intent.confirming_source_score,
            timestamp: intent.timestamp,
        }
    }
}

/// POSTs the contract-call payload to a relay webhook
pub struct WebhookActuator {
    url: String,
    http_client: reqwest::Client,
}

impl WebhookActuator {
    pub fn new(url: impl Into<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(crate::config::constants::http_timeout())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            url: url.into(),
            http_client,
        }
    }
}

#[async_trait]
impl Actuator for WebhookActuator {
    async fn notify(&self, intent: &ActionIntent) -> Result<(), ActuatorError> {
        let response = self
            .http_client
            .post(&self.url)
            .json(&ContractCall::from(intent))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(ActuatorError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Actuator used when no webhook is configured
#[derive(Debug, Default)]
pub struct LogActuator;

#[async_trait]
impl Actuator for LogActuator {
    async fn notify(&self, intent: &ActionIntent) -> Result<(), ActuatorError> {
        info!(
            episode_id = %intent.episode_id,
            action = intent.kind.as_str(),
            sentiment = intent.trigger_score,
            "[ACTUATOR] Intent (no webhook configured)"
        );
        Ok(())
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

pub enum DispatchOutcome {
    /// Delivery running in the background; the handle yields `true` on success
    Spawned(JoinHandle<bool>),
    /// Same episode already being delivered
    AlreadyInFlight,
}

/// Fire-and-forget delivery with one outstanding delivery per episode
#[derive(Clone)]
pub struct IntentDispatcher {
    actuator: Arc<dyn Actuator>,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl IntentDispatcher {
    pub fn new(actuator: Arc<dyn Actuator>) -> Self {
        Self {
            actuator,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub async fn in_flight(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    pub async fn dispatch(&self, intent: ActionIntent) -> DispatchOutcome {
        if !self.in_flight.lock().await.insert(intent.episode_id) {
            warn!(episode_id = %intent.episode_id, "[ACTUATOR] Intent already in flight - not re-sent");
            return DispatchOutcome::AlreadyInFlight;
        }

        let actuator = self.actuator.clone();
        let in_flight = self.in_flight.clone();
        DispatchOutcome::Spawned(tokio::spawn(async move {
            let delivered = match actuator.notify(&intent).await {
                Ok(()) => {
                    info!(
                        episode_id = %intent.episode_id,
                        action = intent.kind.as_str(),
                        "[ACTUATOR] Intent delivered"
                    );
                    true
                }
                Err(e) => {
                    error!(
                        episode_id = %intent.episode_id,
                        action = intent.kind.as_str(),
                        error = %e,
                        "[ACTUATOR] Intent delivery failed"
                    );
                    false
                }
            };
            in_flight.lock().await.remove(&intent.episode_id);
            delivered
        }))
    }
}

/// Drain confirmed intents into the dispatcher until shutdown
pub async fn intent_dispatch_task(
    mut intents: mpsc::Receiver<ActionIntent>,
    dispatcher: IntentDispatcher,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    info!("[ACTUATOR] Dispatch task started");
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("[ACTUATOR] Shutdown signal received");
                break;
            }
            intent = intents.recv() => {
                match intent {
                    Some(intent) => {
                        dispatcher.dispatch(intent).await;
                    }
                    None => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::trigger::IntentKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn intent(kind: IntentKind) -> ActionIntent {
        ActionIntent {
            episode_id: Uuid::new_v4(),
            kind,
            trigger_score: 0.2,
            confirming_source_score: 0.22,
            timestamp: Utc::now(),
        }
    }

    struct SlowActuator {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Actuator for SlowActuator {
        async fn notify(&self, _intent: &ActionIntent) -> Result<(), ActuatorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.fail {
                Err(ActuatorError::Rejected {
                    status: 503,
                    body: "relay down".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_webhook_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/notify")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"method": "handle_twitter_sentiment", "args": {"sentiment": 0.2}, "action": "defensive"}"#
                    .to_string(),
            ))
            .with_status(200)
            .create_async()
            .await;

        let actuator = WebhookActuator::new(format!("{}/notify", server.url()));
        actuator.notify(&intent(IntentKind::Defensive)).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_webhook_rejection() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/notify")
            .with_status(500)
            .with_body("contract paused")
            .create_async()
            .await;

        let actuator = WebhookActuator::new(format!("{}/notify", server.url()));
        let err = actuator.notify(&intent(IntentKind::Aggressive)).await.unwrap_err();
        assert!(matches!(err, ActuatorError::Rejected { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_same_episode_not_dispatched_twice_while_in_flight() {
        let actuator = Arc::new(SlowActuator {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let dispatcher = IntentDispatcher::new(actuator.clone());
        let intent = intent(IntentKind::Defensive);

        let first = dispatcher.dispatch(intent.clone()).await;
        assert!(matches!(
            dispatcher.dispatch(intent.clone()).await,
            DispatchOutcome::AlreadyInFlight
        ));

        match first {
            DispatchOutcome::Spawned(handle) => assert!(handle.await.unwrap()),
            DispatchOutcome::AlreadyInFlight => panic!("first dispatch must spawn"),
        }
        assert_eq!(actuator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.in_flight().await, 0);
    }

    #[tokio::test]
    async fn test_failure_is_swallowed_and_released() {
        let actuator = Arc::new(SlowActuator {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let dispatcher = IntentDispatcher::new(actuator);
        match dispatcher.dispatch(intent(IntentKind::Aggressive)).await {
            DispatchOutcome::Spawned(handle) => assert!(!handle.await.unwrap()),
            DispatchOutcome::AlreadyInFlight => panic!("first dispatch must spawn"),
        }
        assert_eq!(dispatcher.in_flight().await, 0);
    }

    #[tokio::test]
    async fn test_dispatch_task_stops_on_shutdown() {
        let (tx, rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let dispatcher = IntentDispatcher::new(Arc::new(LogActuator));

        let handle = tokio::spawn(intent_dispatch_task(rx, dispatcher, shutdown_rx));
        tx.send(intent(IntentKind::Defensive)).await.unwrap();
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
