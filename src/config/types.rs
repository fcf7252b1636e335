//! Configuration types loaded from YAML
//!
//! Every section has defaults, so a partial file (or an empty one) is a
//! valid configuration. `AppConfig::validate` rejects inconsistent values
//! before any task starts.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapters::types::{FetchParams, SourceId};
use crate::adapters::{CryptoPanicConfig, RedditConfig, SantimentConfig, TwitterConfig};
use crate::core::aggregator::{default_reliability, ReliabilityTable, SourceWeights};
use crate::core::runtime::PipelineSettings;
use crate::core::trigger::TriggerThresholds;
use crate::core::window::WindowSettings;
use crate::error::AppError;

// ============================================================================
// Sections
// ============================================================================

/// Which sources are aggregated and how
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Base weights; must sum to 1.0
    pub weights: BTreeMap<SourceId, f64>,
    /// Per-source reliability used for confidence
    pub reliability: ReliabilityTable,
    pub adapter_timeout_ms: u64,
    pub asset: String,
    pub keywords: Vec<String>,
    /// Primary → stand-in queried when the primary is absent
    pub substitutes: BTreeMap<SourceId, SourceId>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        let params = FetchParams::default();
        Self {
            weights: SourceWeights::default().as_map().clone(),
            reliability: default_reliability(),
            adapter_timeout_ms: 5_000,
            asset: params.asset,
            keywords: params.keywords,
            substitutes: BTreeMap::from([(SourceId::Twitter, SourceId::CryptoPanic)]),
        }
    }
}

impl SourcesConfig {
    pub fn source_weights(&self) -> Result<SourceWeights, AppError> {
        SourceWeights::new(self.weights.clone())
    }

    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_millis(self.adapter_timeout_ms)
    }

    pub fn fetch_params(&self) -> FetchParams {
        FetchParams::new(self.asset.clone(), self.keywords.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    pub bearish: f64,
    pub bullish: f64,
    /// Max-min spread that flags source divergence
    pub divergence: f64,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        let trigger = TriggerThresholds::default();
        Self {
            bearish: trigger.bearish,
            bullish: trigger.bullish,
            divergence: 0.4,
        }
    }
}

impl ThresholdsConfig {
    pub fn trigger_thresholds(&self) -> TriggerThresholds {
        TriggerThresholds {
            bearish: self.bearish,
            bullish: self.bullish,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub min_sample_threshold: usize,
    pub ttl_seconds: u64,
    pub bucket_granularity_seconds: u64,
    pub sweep_interval_secs: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        let settings = WindowSettings::default();
        Self {
            min_sample_threshold: settings.min_sample_threshold,
            ttl_seconds: settings.ttl.as_secs(),
            bucket_granularity_seconds: settings.granularity.as_secs(),
            sweep_interval_secs: PipelineSettings::default().sweep_interval.as_secs(),
        }
    }
}

impl WindowConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Bucket cap comes from `MAX_SAMPLES_PER_BUCKET`
    pub fn settings(&self) -> WindowSettings {
        WindowSettings {
            ttl: self.ttl(),
            min_sample_threshold: self.min_sample_threshold,
            granularity: Duration::from_secs(self.bucket_granularity_seconds),
            max_samples_per_bucket: super::constants::max_samples_per_bucket(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Share of the secondary score in the blended estimate
    pub secondary_weight: f64,
    /// EMA factor for the historical baseline
    pub history_smoothing: f64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            secondary_weight: 0.7,
            history_smoothing: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Windowed stream that gates each round
    pub primary_source: SourceId,
    /// Second source queried before an intent is emitted
    pub confirmation_source: SourceId,
    /// Source blended by the fallback cascade
    pub secondary_source: SourceId,
    pub aggregation_interval_secs: u64,
}

impl PipelineConfig {
    pub fn settings(&self, sweep_interval_secs: u64) -> PipelineSettings {
        PipelineSettings {
            primary_source: self.primary_source,
            aggregation_interval: Duration::from_secs(self.aggregation_interval_secs),
            sweep_interval: Duration::from_secs(sweep_interval_secs),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            primary_source: SourceId::Twitter,
            confirmation_source: SourceId::Santiment,
            secondary_source: SourceId::CryptoPanic,
            aggregation_interval_secs: PipelineSettings::default().aggregation_interval.as_secs(),
        }
    }
}

/// Per-provider endpoints and parameters; credentials come from the environment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub twitter: TwitterConfig,
    pub reddit: RedditConfig,
    pub cryptopanic: CryptoPanicConfig,
    pub santiment: SantimentConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    /// Relay receiving contract-call payloads; intents are only logged when unset
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file backing the window journal and the sentiment keys;
    /// unset keeps them in memory and loses them on restart
    pub sqlite_path: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: Some("data/sentiment_store.db".to_string()),
        }
    }
}

/// Root application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sources: SourcesConfig,
    pub thresholds: ThresholdsConfig,
    pub window: WindowConfig,
    pub fallback: FallbackConfig,
    pub pipeline: PipelineConfig,
    pub providers: ProvidersConfig,
    pub actuator: ActuatorConfig,
    pub store: StoreConfig,
}

fn unit_interval(name: &str, value: f64) -> Result<(), AppError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(AppError::Config(format!(
            "{} must be within [0, 1] (got {})",
            name, value
        )));
    }
    Ok(())
}

impl AppConfig {
    /// Validate all configuration rules
    pub fn validate(&self) -> Result<(), AppError> {
        // Weight rules live with SourceWeights
        let weights = self.sources.source_weights()?;

        for (source, value) in &self.sources.reliability {
            unit_interval(&format!("reliability of {}", source), *value)?;
        }
        for (primary, stand_in) in &self.sources.substitutes {
            if primary == stand_in {
                return Err(AppError::Config(format!(
                    "source {} cannot substitute for itself",
                    primary
                )));
            }
        }
        if self.sources.adapter_timeout_ms == 0 {
            return Err(AppError::Config("adapter_timeout_ms must be > 0".to_string()));
        }

        let t = &self.thresholds;
        unit_interval("bearish threshold", t.bearish)?;
        unit_interval("bullish threshold", t.bullish)?;
        if t.bearish >= t.bullish {
            return Err(AppError::Config(format!(
                "bearish threshold ({}) must be < bullish threshold ({})",
                t.bearish, t.bullish
            )));
        }
        if !(t.divergence > 0.0 && t.divergence <= 1.0) {
            return Err(AppError::Config(format!(
                "divergence threshold must be within (0, 1] (got {})",
                t.divergence
            )));
        }

        let w = &self.window;
        if w.min_sample_threshold == 0 {
            return Err(AppError::Config("min_sample_threshold must be > 0".to_string()));
        }
        if w.ttl_seconds == 0 || w.bucket_granularity_seconds == 0 || w.sweep_interval_secs == 0 {
            return Err(AppError::Config(
                "window ttl, bucket granularity and sweep interval must be > 0".to_string(),
            ));
        }

        unit_interval("fallback secondary_weight", self.fallback.secondary_weight)?;
        unit_interval("fallback history_smoothing", self.fallback.history_smoothing)?;

        let p = &self.pipeline;
        if weights.get(p.primary_source).is_none() {
            return Err(AppError::Config(format!(
                "primary source {} has no configured weight",
                p.primary_source
            )));
        }
        if p.confirmation_source == p.primary_source {
            return Err(AppError::Config(format!(
                "confirmation source must differ from the primary source ({})",
                p.primary_source
            )));
        }
        if self.sources.substitutes.values().any(|s| *s == p.confirmation_source) {
            return Err(AppError::Config(format!(
                "confirmation source {} is also a substitute and could confirm its own crossing",
                p.confirmation_source
            )));
        }
        if p.secondary_source == p.primary_source {
            return Err(AppError::Config(format!(
                "fallback secondary source must differ from the primary source ({})",
                p.primary_source
            )));
        }
        if p.aggregation_interval_secs == 0 {
            return Err(AppError::Config("aggregation_interval_secs must be > 0".to_string()));
        }
        if matches!(self.store.sqlite_path.as_deref(), Some("")) {
            return Err(AppError::Config("store sqlite_path must not be empty".to_string()));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sources.weights[&SourceId::Twitter], 0.40);
        assert_eq!(config.window.min_sample_threshold, 50);
        assert_eq!(config.window.ttl_seconds, 300);
        assert_eq!(config.fallback.secondary_weight, 0.7);
        assert_eq!(
            config.sources.substitutes.get(&SourceId::Twitter),
            Some(&SourceId::CryptoPanic)
        );
        assert_eq!(config.pipeline.confirmation_source, SourceId::Santiment);
        assert!(config.store.sqlite_path.is_some());
    }

    #[test]
    fn test_confirmation_cannot_be_a_substitute() {
        let mut config = AppConfig::default();
        config.pipeline.confirmation_source = SourceId::CryptoPanic;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("also a substitute"));

        config.sources.substitutes.clear();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_weights_not_summing_to_one_rejected() {
        let mut config = AppConfig::default();
        config.sources.weights.insert(SourceId::Reddit, 0.5);
        assert!(matches!(config.validate(), Err(AppError::WeightConfig(_))));
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut config = AppConfig::default();
        config.thresholds.bearish = 0.8;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must be < bullish"));
    }

    #[test]
    fn test_zero_divergence_rejected() {
        let mut config = AppConfig::default();
        config.thresholds.divergence = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_window_values_rejected() {
        let mut config = AppConfig::default();
        config.window.min_sample_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.window.bucket_granularity_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_confirmation_must_differ_from_primary() {
        let mut config = AppConfig::default();
        config.pipeline.confirmation_source = SourceId::Twitter;
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("confirmation source"));
    }

    #[test]
    fn test_unweighted_primary_rejected() {
        let mut config = AppConfig::default();
        config.pipeline.primary_source = SourceId::CryptoPanic;
        config.pipeline.confirmation_source = SourceId::Santiment;
        config.pipeline.secondary_source = SourceId::Santiment;
        assert!(config.validate().unwrap_err().to_string().contains("no configured weight"));
    }

    #[test]
    fn test_self_substitution_rejected() {
        let mut config = AppConfig::default();
        config.sources.substitutes.insert(SourceId::Reddit, SourceId::Reddit);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_window_settings_conversion() {
        let window = WindowConfig {
            min_sample_threshold: 10,
            ttl_seconds: 120,
            bucket_granularity_seconds: 30,
            sweep_interval_secs: 15,
        };
        let settings = window.settings();
        assert_eq!(settings.ttl, Duration::from_secs(120));
        assert_eq!(settings.granularity, Duration::from_secs(30));
        assert_eq!(settings.min_sample_threshold, 10);
    }
}
