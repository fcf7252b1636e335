//! Pipeline runtime tasks
//!
//! `Pipeline` owns the scoring components and drives them from three loops:
//! ingestion (samples into the window), the periodic aggregation round, and
//! a sweep that evicts expired window buckets. Confirmed intents leave the
//! round through an mpsc channel towards the dispatch task.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::adapters::types::{SentimentSample, SourceId};
use crate::core::actuator::{intent_dispatch_task, IntentDispatcher};
use crate::core::aggregator::{Aggregator, CompositeResult};
use crate::core::fallback::{FallbackCascade, FallbackEstimate};
use crate::core::persistence::Recorder;
use crate::core::trigger::{ActionIntent, ActionTrigger, TriggerOutcome};
use crate::core::window::{Readiness, WindowBuffer};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Source whose window gates the aggregation round
    pub primary_source: SourceId,
    pub aggregation_interval: Duration,
    pub sweep_interval: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            primary_source: SourceId::Twitter,
            aggregation_interval: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

/// Result of one aggregation round
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoundOutcome {
    Composite(CompositeResult),
    Fallback(FallbackEstimate),
}

impl RoundOutcome {
    pub fn score(&self) -> f64 {
        match self {
            RoundOutcome::Composite(result) => result.composite_score,
            RoundOutcome::Fallback(estimate) => estimate.value,
        }
    }
}

pub struct Pipeline {
    window: Arc<WindowBuffer>,
    aggregator: Arc<Aggregator>,
    fallback: Arc<FallbackCascade>,
    trigger: Arc<ActionTrigger>,
    recorder: Arc<dyn Recorder>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        window: Arc<WindowBuffer>,
        aggregator: Arc<Aggregator>,
        fallback: Arc<FallbackCascade>,
        trigger: Arc<ActionTrigger>,
        recorder: Arc<dyn Recorder>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            window,
            aggregator,
            fallback,
            trigger,
            recorder,
            settings,
        }
    }

    pub fn window(&self) -> &Arc<WindowBuffer> {
        &self.window
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// One aggregation round.
    ///
    /// A ready primary window yields a composite, which is recorded, folded
    /// into the historical baseline and handed to the trigger in the
    /// background. Otherwise, or when no source is present, the fallback
    /// cascade produces the estimate.
    pub async fn run_round(&self, intent_tx: &mpsc::Sender<ActionIntent>) -> RoundOutcome {
        let now = Utc::now();
        self.window.evict_expired_at(now).await;

        if let Readiness::Underflow { count, threshold } =
            self.window.readiness(self.settings.primary_source, now).await
        {
            info!(
                source = %self.settings.primary_source,
                count,
                threshold,
                "[WINDOW] Below threshold - using fallback"
            );
            return RoundOutcome::Fallback(self.fallback.estimate().await);
        }

        match self.aggregator.compute_composite_default().await {
            Ok(result) => {
                self.on_composite(&result, intent_tx).await;
                RoundOutcome::Composite(result)
            }
            Err(e) => {
                warn!(error = %e, "[FALLBACK] Aggregation failed - using fallback");
                RoundOutcome::Fallback(self.fallback.estimate().await)
            }
        }
    }

    async fn on_composite(&self, result: &CompositeResult, intent_tx: &mpsc::Sender<ActionIntent>) {
        // Recording runs off the round so a slow sink cannot delay it.
        let recorder = self.recorder.clone();
        let record = result.clone();
        tokio::spawn(async move {
            if let Err(e) = recorder.record(&record).await {
                warn!(id = %record.id, error = %e, "[PERSIST] Composite not recorded");
            }
        });

        let score = result.composite_score;
        match self.fallback.record_observation(score).await {
            Ok(historical) => debug!(historical, "[FALLBACK] Historical baseline updated"),
            Err(e) => warn!(error = %e, "[FALLBACK] Historical baseline not updated"),
        }
        if let Err(e) = self.fallback.publish_current(score).await {
            warn!(error = %e, "[FALLBACK] Current sentiment not published");
        }

        // A newer composite supersedes any confirmation still pending.
        let trigger = self.trigger.clone();
        let intent_tx = intent_tx.clone();
        let result = result.clone();
        tokio::spawn(async move {
            if let TriggerOutcome::Confirmed(intent) = trigger.on_composite_result(&result).await {
                if intent_tx.send(intent).await.is_err() {
                    error!("[TRIGGER] Intent channel closed - intent dropped");
                }
            }
        });
    }

    /// Spawn ingestion, round, sweep and dispatch tasks
    pub fn spawn_tasks(
        self: &Arc<Self>,
        sample_rx: mpsc::Receiver<SentimentSample>,
        intent_tx: mpsc::Sender<ActionIntent>,
        intent_rx: mpsc::Receiver<ActionIntent>,
        dispatcher: IntentDispatcher,
        shutdown_tx: &broadcast::Sender<()>,
    ) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(ingestion_task(
                sample_rx,
                self.window.clone(),
                shutdown_tx.subscribe(),
            )),
            tokio::spawn(round_task(self.clone(), intent_tx, shutdown_tx.subscribe())),
            tokio::spawn(sweep_task(
                self.window.clone(),
                self.settings.sweep_interval,
                shutdown_tx.subscribe(),
            )),
            tokio::spawn(intent_dispatch_task(intent_rx, dispatcher, shutdown_tx.subscribe())),
        ]
    }

    /// Close every adapter behind the aggregator
    pub async fn close(&self) {
        self.aggregator.close().await;
    }
}

// =============================================================================
// Tasks
// =============================================================================

/// Move samples from the stream channel into the window
pub async fn ingestion_task(
    mut sample_rx: mpsc::Receiver<SentimentSample>,
    window: Arc<WindowBuffer>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    info!("[WINDOW] Ingestion task started");
    let mut ingested: u64 = 0;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!(ingested, "[WINDOW] Ingestion task shutting down");
                break;
            }
            sample = sample_rx.recv() => {
                let Some(sample) = sample else {
                    info!(ingested, "[WINDOW] Sample channel closed");
                    break;
                };
                let key = window.ingest(sample).await;
                ingested += 1;
                debug!(source = %key.source, quantum = key.quantum_start, "[WINDOW] Sample ingested");
            }
        }
    }
}

/// Run an aggregation round every `aggregation_interval`
pub async fn round_task(
    pipeline: Arc<Pipeline>,
    intent_tx: mpsc::Sender<ActionIntent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = interval(pipeline.settings.aggregation_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(
        interval_secs = pipeline.settings.aggregation_interval.as_secs(),
        "[AGGREGATOR] Round task started"
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("[AGGREGATOR] Round task shutting down");
                break;
            }
            _ = ticker.tick() => {
                let outcome = pipeline.run_round(&intent_tx).await;
                debug!(score = outcome.score(), "[AGGREGATOR] Round complete");
            }
        }
    }
}

/// Evict expired buckets on a fixed cadence, independent of ingestion
pub async fn sweep_task(
    window: Arc<WindowBuffer>,
    sweep_interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = interval(sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                window.evict_expired().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::traits::tests::MockSource;
    use crate::adapters::traits::SourceAdapter;
    use crate::core::aggregator::SourceWeights;
    use crate::core::fallback::{CURRENT_SENTIMENT_KEY, HISTORICAL_SENTIMENT_KEY};
    use crate::core::persistence::PersistenceError;
    use crate::core::scorer::LexiconScorer;
    use crate::core::store::{InMemoryStore, TtlStore};
    use crate::core::trigger::{IntentKind, TriggerThresholds};
    use crate::core::window::{WindowSettings, WindowSource};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingRecorder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Recorder for CountingRecorder {
        async fn record(&self, _result: &CompositeResult) -> Result<(), PersistenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(PersistenceError::DatabaseError("offline".to_string()))
        }
    }

    /// Sink that takes its time and then fails
    struct SlowRecorder {
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Recorder for SlowRecorder {
        async fn record(&self, _result: &CompositeResult) -> Result<(), PersistenceError> {
            tokio::time::sleep(self.delay).await;
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(PersistenceError::DatabaseError("timed out".to_string()))
        }
    }

    async fn wait_for_calls(calls: &AtomicUsize, expected: usize) {
        for _ in 0..100 {
            if calls.load(Ordering::SeqCst) >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("recorder called {} times", calls.load(Ordering::SeqCst));
    }

    struct Fixture {
        pipeline: Pipeline,
        store: Arc<dyn TtlStore>,
        recorder: Arc<CountingRecorder>,
    }

    fn fixture(santiment: Option<f64>, news: Option<f64>) -> Fixture {
        let store: Arc<dyn TtlStore> = Arc::new(InMemoryStore::new());
        let window = Arc::new(WindowBuffer::new(WindowSettings {
            min_sample_threshold: 3,
            ..WindowSettings::default()
        }));
        let news: Arc<dyn SourceAdapter> = Arc::new(MockSource::new(SourceId::CryptoPanic, news));
        let weights = SourceWeights::new(BTreeMap::from([
            (SourceId::Twitter, 0.6),
            (SourceId::Santiment, 0.4),
        ]))
        .unwrap();
        let aggregator = Aggregator::new(
            vec![
                Arc::new(WindowSource::new(
                    SourceId::Twitter,
                    window.clone(),
                    Arc::new(LexiconScorer::new()),
                )),
                Arc::new(MockSource::new(SourceId::Santiment, santiment)),
            ],
            weights,
        );
        let fallback = FallbackCascade::new(news.clone(), store.clone(), Duration::from_secs(300));
        let trigger = ActionTrigger::new(TriggerThresholds::default(), news);
        let recorder = Arc::new(CountingRecorder::default());

        Fixture {
            pipeline: Pipeline::new(
                window,
                Arc::new(aggregator),
                Arc::new(fallback),
                Arc::new(trigger),
                recorder.clone(),
                PipelineSettings::default(),
            ),
            store,
            recorder,
        }
    }

    async fn fill(window: &WindowBuffer, text: &str, n: usize) {
        for _ in 0..n {
            window
                .ingest(SentimentSample::new(SourceId::Twitter, text, Utc::now()))
                .await;
        }
    }

    #[tokio::test]
    async fn test_underflow_routes_to_fallback() {
        let fx = fixture(Some(0.9), Some(0.6));
        fill(fx.pipeline.window(), "scam after hack", 2).await;
        let (tx, _rx) = mpsc::channel(1);

        match fx.pipeline.run_round(&tx).await {
            RoundOutcome::Fallback(estimate) => {
                assert!((estimate.value - 0.57).abs() < 1e-9);
                assert!(!estimate.degraded);
            }
            other => panic!("expected fallback, got {:?}", other),
        }
        assert_eq!(fx.recorder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ready_window_composes_records_and_updates_baseline() {
        let fx = fixture(Some(0.5), Some(0.5));
        fill(fx.pipeline.window(), "scam after hack", 3).await;
        let (tx, _rx) = mpsc::channel(1);

        let RoundOutcome::Composite(result) = fx.pipeline.run_round(&tx).await else {
            panic!("expected composite");
        };
        // twitter 0.0 at 0.6, santiment 0.5 at 0.4
        assert!((result.composite_score - 0.2).abs() < 1e-9);
        wait_for_calls(&fx.recorder.calls, 1).await;

        let historical: f64 = fx.store.get(HISTORICAL_SENTIMENT_KEY).await.unwrap().unwrap().parse().unwrap();
        assert!((historical - 0.44).abs() < 1e-9);
        let current: f64 = fx.store.get(CURRENT_SENTIMENT_KEY).await.unwrap().unwrap().parse().unwrap();
        assert!((current - 0.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_confirmed_crossing_emits_intent() {
        let fx = fixture(Some(0.1), Some(0.2));
        fill(fx.pipeline.window(), "scam after hack", 5).await;
        let (tx, mut rx) = mpsc::channel(1);

        assert!(matches!(fx.pipeline.run_round(&tx).await, RoundOutcome::Composite(_)));
        let intent = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(intent.kind, IntentKind::Defensive);
        assert_eq!(intent.confirming_source_score, 0.2);
    }

    #[tokio::test]
    async fn test_slow_recorder_does_not_delay_round() {
        let fx = fixture(Some(0.5), Some(0.5));
        fill(fx.pipeline.window(), "scam after hack", 3).await;
        let recorder = Arc::new(SlowRecorder {
            delay: Duration::from_secs(2),
            calls: AtomicUsize::new(0),
        });
        let pipeline = Pipeline::new(
            fx.pipeline.window.clone(),
            fx.pipeline.aggregator.clone(),
            fx.pipeline.fallback.clone(),
            fx.pipeline.trigger.clone(),
            recorder.clone(),
            PipelineSettings::default(),
        );
        let (tx, _rx) = mpsc::channel(1);

        let started = std::time::Instant::now();
        let outcome = pipeline.run_round(&tx).await;
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(matches!(outcome, RoundOutcome::Composite(_)));
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_crossing_filled_by_confirmer_emits_nothing() {
        // Twitter absent, cryptopanic both stands in for it and confirms
        let window = Arc::new(WindowBuffer::new(WindowSettings {
            min_sample_threshold: 1,
            ..WindowSettings::default()
        }));
        fill(&window, "near", 1).await;
        let news = Arc::new(MockSource::new(SourceId::CryptoPanic, Some(0.1)));
        let aggregator = Aggregator::new(
            vec![Arc::new(MockSource::new(SourceId::Twitter, None))],
            SourceWeights::default(),
        )
        .with_substitute(SourceId::Twitter, news.clone());
        let store: Arc<dyn TtlStore> = Arc::new(InMemoryStore::new());
        let pipeline = Pipeline::new(
            window,
            Arc::new(aggregator),
            Arc::new(FallbackCascade::new(news.clone(), store, Duration::from_secs(300))),
            Arc::new(ActionTrigger::new(TriggerThresholds::default(), news.clone())),
            Arc::new(CountingRecorder::default()),
            PipelineSettings::default(),
        );
        let (tx, mut rx) = mpsc::channel(1);

        let RoundOutcome::Composite(result) = pipeline.run_round(&tx).await else {
            panic!("expected composite");
        };
        assert_eq!(result.substitutions[&SourceId::Twitter], SourceId::CryptoPanic);
        assert!((result.composite_score - 0.1).abs() < 1e-9);

        let received = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(received.is_err(), "no intent expected, got {:?}", received);
        // Only the substitution query reached cryptopanic
        assert_eq!(news.call_count(), 1);
    }

    #[tokio::test]
    async fn test_all_sources_absent_falls_back_degraded() {
        let fx = fixture(None, None);
        let (tx, _rx) = mpsc::channel(1);
        // Window is ready but every adapter is closed, so none is present
        fill(fx.pipeline.window(), "scam after hack", 3).await;
        fx.pipeline.close().await;

        match fx.pipeline.run_round(&tx).await {
            RoundOutcome::Fallback(estimate) => {
                assert!(estimate.degraded);
                assert_eq!(estimate.value, 0.5);
            }
            other => panic!("expected fallback, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ingestion_task_fills_window_until_shutdown() {
        let window = Arc::new(WindowBuffer::new(WindowSettings::default()));
        let (tx, rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(ingestion_task(rx, window.clone(), shutdown_rx));

        tx.send(SentimentSample::new(SourceId::Twitter, "near", Utc::now()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(window.bucket_count().await, 1);

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
