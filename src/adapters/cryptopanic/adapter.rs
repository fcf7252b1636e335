//! CryptoPanic Adapter Implementation
//!
//! Docs: https://cryptopanic.com/developers/api/

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::adapters::errors::{SourceError, SourceResult};
use crate::adapters::http::{build_client, read_json};
use crate::adapters::traits::{into_source_score, SourceAdapter};
use crate::adapters::types::{FetchParams, SourceId, SourceScore};

use super::config::{CryptoPanicConfig, API_KEY_ENV};
use super::types::{score_news, PostsResponse};

/// CryptoPanic news adapter implementing SourceAdapter
pub struct CryptoPanicAdapter {
    config: CryptoPanicConfig,
    http_client: reqwest::Client,
    closed: AtomicBool,
}

impl CryptoPanicAdapter {
    pub fn new(config: CryptoPanicConfig) -> Self {
        info!(
            currencies = %config.currencies,
            api_key = ?config.api_key,
            "[SOURCE] CryptoPanic adapter configured"
        );
        Self {
            config,
            http_client: build_client("sentiment_engine/cryptopanic"),
            closed: AtomicBool::new(false),
        }
    }

    async fn collect(&self) -> SourceResult<f64> {
        if self.is_closed() {
            return Err(SourceError::Closed);
        }
        let key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| SourceError::MissingCredential(API_KEY_ENV.to_string()))?;

        let mut query = vec![
            ("auth_token", key.expose()),
            ("currencies", self.config.currencies.as_str()),
            ("kind", self.config.kind.as_str()),
        ];
        if let Some(filter) = &self.config.filter {
            query.push(("filter", filter.as_str()));
        }

        let url = format!("{}/posts/", self.config.base_url);
        let response = self.http_client.get(&url).query(&query).send().await?;
        let body: PostsResponse = read_json(response).await?;

        debug!(items = body.results.len(), "CryptoPanic news received");
        score_news(&body.results).ok_or(SourceError::NoData)
    }
}

#[async_trait]
impl SourceAdapter for CryptoPanicAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::CryptoPanic
    }

    /// News coverage is filtered server-side by currency; keywords are unused
    async fn fetch(&self, _params: &FetchParams) -> SourceScore {
        into_source_score(SourceId::CryptoPanic, self.collect().await)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        info!("[SOURCE] CryptoPanic adapter closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
