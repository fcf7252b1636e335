//! Core module - scoring, aggregation, windowing, fallback, trigger, runtime
//!
//! Submodules are public; the most used types are re-exported explicitly
//! (no glob exports) so the public surface stays deliberate.
//!
//! ```ignore
//! use sentiment_engine::core::{Aggregator, WindowBuffer, ActionTrigger};
//! ```

pub mod actuator;
pub mod aggregator;
pub mod channels;
pub mod fallback;
pub mod logging;
pub mod persistence;
pub mod runtime;
pub mod scorer;
pub mod sqlite_store;
pub mod store;
pub mod stream;
pub mod trigger;
pub mod window;

pub use actuator::{
    intent_dispatch_task, Actuator, ActuatorError, DispatchOutcome, IntentDispatcher, LogActuator,
    WebhookActuator, CONTRACT_METHOD,
};

pub use aggregator::{
    compose, default_reliability, fetch_bounded, AggregateError, Aggregator, CompositeResult,
    MarketSignals, ReliabilityTable, SourceWeights, Strength, Trend, Warning,
};

pub use channels::ChannelBundle;

pub use fallback::{FallbackCascade, FallbackEstimate};

pub use logging::{
    init_logging, init_logging_with_config, sanitize, LoggingConfig, SanitizedValue,
    DEFAULT_LOG_LEVEL,
};

pub use persistence::{NullRecorder, PersistenceError, Recorder, SupabaseRecorder};

pub use runtime::{ingestion_task, round_task, sweep_task, Pipeline, PipelineSettings, RoundOutcome};

pub use scorer::{score_weighted, scorer_from_env, HttpTextScorer, LexiconScorer, ScorerError, TextScorer};

pub use sqlite_store::SqliteStore;

pub use store::{InMemoryStore, StoreError, StoreResult, TtlStore};

pub use stream::{decode_frame, stream_ingest_task, StreamError};

pub use trigger::{
    ActionIntent, ActionTrigger, IntentKind, TriggerOutcome, TriggerState, TriggerThresholds,
};

pub use window::{BucketKey, Readiness, WindowBuffer, WindowSettings, WindowSource};
