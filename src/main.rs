//! Sentiment engine service
//!
//! 1. Loads configuration (`SENTIMENT_CONFIG`, default `config.yaml`)
//! 2. Streams tweets into the time window
//! 3. Aggregates sources on a fixed cadence, falling back when starved
//! 4. Confirms threshold crossings and notifies the actuator
//! 5. Shuts down on Ctrl+C

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::signal;
use tracing::{error, info, warn};

use sentiment_engine::adapters::{build_adapter, SourceAdapter, SourceId};
use sentiment_engine::config::{self, constants, AppConfig, SupabaseConfig};
use sentiment_engine::core::{
    init_logging, scorer_from_env, stream_ingest_task, ActionTrigger, Actuator, Aggregator,
    ChannelBundle, FallbackCascade, InMemoryStore, IntentDispatcher, LogActuator, NullRecorder,
    Pipeline, Recorder, SqliteStore, SupabaseRecorder, TtlStore, WebhookActuator, WindowBuffer,
    WindowSource,
};

const CONFIG_PATH_ENV: &str = "SENTIMENT_CONFIG";
const ACTUATOR_URL_ENV: &str = "ACTUATOR_URL";

fn load_app_config() -> anyhow::Result<AppConfig> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.yaml".to_string());
    let path = Path::new(&path);
    if path.exists() {
        return Ok(config::load_config(path)?);
    }
    warn!(path = %path.display(), "[CONFIG] No configuration file - using defaults");
    let config = AppConfig::default();
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    info!("Sentiment engine starting");
    constants::log_configuration();

    let config = match load_app_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "[CONFIG] Configuration failed");
            std::process::exit(1);
        }
    };
    info!(
        weights = ?config.sources.weights,
        primary = %config.pipeline.primary_source,
        confirmation = %config.pipeline.confirmation_source,
        "[CONFIG] Loaded"
    );

    // ------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------
    let scorer = scorer_from_env();
    let store: Arc<dyn TtlStore> = match config.store.sqlite_path.as_deref() {
        Some(path) => Arc::new(SqliteStore::open(path)?),
        None => {
            warn!("[PERSIST] No store path configured - window journal is lost on restart");
            Arc::new(InMemoryStore::new())
        }
    };
    let window = Arc::new(WindowBuffer::new(config.window.settings()).with_store(store.clone()));
    let restored = window.rehydrate(Utc::now()).await?;
    if restored > 0 {
        info!(restored, "[WINDOW] Journal rehydrated");
    }

    let primary = config.pipeline.primary_source;
    let mut adapters: BTreeMap<SourceId, Arc<dyn SourceAdapter>> = BTreeMap::new();
    let mut adapter_for = |source: SourceId| -> Arc<dyn SourceAdapter> {
        adapters
            .entry(source)
            .or_insert_with(|| build_adapter(source, &config.providers, scorer.clone()))
            .clone()
    };

    let mut sources: Vec<Arc<dyn SourceAdapter>> = Vec::new();
    for &source in config.sources.weights.keys() {
        if source == primary {
            sources.push(Arc::new(WindowSource::new(source, window.clone(), scorer.clone())));
        } else {
            sources.push(adapter_for(source));
        }
    }

    let params = config.sources.fetch_params();
    let timeout = config.sources.adapter_timeout();

    let mut aggregator = Aggregator::new(sources, config.sources.source_weights()?)
        .with_reliability(config.sources.reliability.clone())
        .with_timeout(timeout)
        .with_divergence_threshold(config.thresholds.divergence)
        .with_params(params.clone());
    for (&slot, &stand_in) in &config.sources.substitutes {
        aggregator = aggregator.with_substitute(slot, adapter_for(stand_in));
    }

    let fallback = FallbackCascade::new(
        adapter_for(config.pipeline.secondary_source),
        store.clone(),
        config.window.ttl(),
    )
    .with_secondary_weight(config.fallback.secondary_weight)
    .with_smoothing(config.fallback.history_smoothing)
    .with_timeout(timeout)
    .with_params(params.clone());

    let trigger = ActionTrigger::new(
        config.thresholds.trigger_thresholds(),
        adapter_for(config.pipeline.confirmation_source),
    )
    .with_params(params)
    .with_timeout(timeout);

    let recorder: Arc<dyn Recorder> = match SupabaseConfig::from_env()? {
        Some(supabase) => Arc::new(SupabaseRecorder::new(supabase)?),
        None => {
            info!("[PERSIST] Supabase not configured - composites are not recorded");
            Arc::new(NullRecorder)
        }
    };

    let webhook_url = std::env::var(ACTUATOR_URL_ENV)
        .ok()
        .filter(|u| !u.trim().is_empty())
        .or_else(|| config.actuator.webhook_url.clone());
    let actuator: Arc<dyn Actuator> = match webhook_url {
        Some(url) => {
            info!(url = %url, "[ACTUATOR] Webhook configured");
            Arc::new(WebhookActuator::new(url))
        }
        None => {
            warn!("[ACTUATOR] No webhook configured - intents are only logged");
            Arc::new(LogActuator)
        }
    };

    let pipeline = Arc::new(Pipeline::new(
        window,
        Arc::new(aggregator),
        Arc::new(fallback),
        Arc::new(trigger),
        recorder,
        config.pipeline.settings(config.window.sweep_interval_secs),
    ));

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------
    let ChannelBundle {
        sample_tx,
        sample_rx,
        intent_tx,
        intent_rx,
        shutdown_tx,
    } = ChannelBundle::default();

    let mut handles = pipeline.spawn_tasks(
        sample_rx,
        intent_tx,
        intent_rx,
        IntentDispatcher::new(actuator),
        &shutdown_tx,
    );

    if primary == SourceId::Twitter {
        let twitter = config.providers.twitter.clone().with_env();
        handles.push(tokio::spawn(stream_ingest_task(
            twitter.stream_url,
            twitter.bearer_token,
            sample_tx,
            constants::stream_reconnect_delay(),
            shutdown_tx.subscribe(),
        )));
    } else {
        warn!(primary = %primary, "[SOURCE] No live stream for primary source - window fills only from the journal");
        drop(sample_tx);
    }

    info!("Sentiment engine running. Press Ctrl+C to stop.");

    match signal::ctrl_c().await {
        Ok(()) => info!("[SHUTDOWN] Graceful shutdown initiated"),
        Err(e) => error!(error = %e, "[SHUTDOWN] Failed to listen for Ctrl+C - shutting down"),
    }
    let _ = shutdown_tx.send(());

    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "[SHUTDOWN] Task ended abnormally");
        }
    }
    pipeline.close().await;

    info!("[SHUTDOWN] Clean exit");
    Ok(())
}
