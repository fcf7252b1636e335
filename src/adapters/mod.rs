//! Sentiment source adapters for Twitter, Reddit, CryptoPanic, Santiment
//!
//! This module provides the per-source contract (`SourceAdapter`) and one
//! implementation per external provider. Every adapter turns its raw data
//! into a normalized score in [0,1] or an explicit absence.

pub mod errors;
pub(crate) mod http;
pub mod traits;
pub mod types;

pub mod cryptopanic;
pub mod reddit;
pub mod santiment;
pub mod twitter;

// Re-export commonly used types for convenience
pub use cryptopanic::{CryptoPanicAdapter, CryptoPanicConfig};
pub use errors::{SourceError, SourceResult};
pub use reddit::{RedditAdapter, RedditConfig};
pub use santiment::{SantimentAdapter, SantimentConfig};
pub use traits::{into_source_score, SourceAdapter};
pub use twitter::{TwitterAdapter, TwitterConfig};
pub use types::{
    Credential, EngagementMetrics, FetchParams, Reading, SentimentSample, SourceId, SourceScore,
};

use std::sync::Arc;

use crate::config::ProvidersConfig;
use crate::core::scorer::TextScorer;

/// Build the REST adapter for `source`, filling credentials from the environment
pub fn build_adapter(
    source: SourceId,
    providers: &ProvidersConfig,
    scorer: Arc<dyn TextScorer>,
) -> Arc<dyn SourceAdapter> {
    match source {
        SourceId::Twitter => Arc::new(TwitterAdapter::new(providers.twitter.clone().with_env(), scorer)),
        SourceId::Reddit => Arc::new(RedditAdapter::new(providers.reddit.clone().with_env(), scorer)),
        SourceId::CryptoPanic => Arc::new(CryptoPanicAdapter::new(providers.cryptopanic.clone().with_env())),
        SourceId::Santiment => Arc::new(SantimentAdapter::new(providers.santiment.clone().with_env())),
    }
}
