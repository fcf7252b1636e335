//! Santiment Adapter Implementation
//!
//! Docs: https://academy.santiment.net/sanapi/

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::adapters::errors::{SourceError, SourceResult};
use crate::adapters::http::{build_client, read_json};
use crate::adapters::traits::{into_source_score, SourceAdapter};
use crate::adapters::types::{FetchParams, SourceId, SourceScore};

use super::config::{SantimentConfig, API_KEY_ENV};
use super::types::{sentiment_volume_query, GraphQlRequest, GraphQlResponse};

/// Santiment adapter implementing SourceAdapter
pub struct SantimentAdapter {
    config: SantimentConfig,
    http_client: reqwest::Client,
    closed: AtomicBool,
}

impl SantimentAdapter {
    pub fn new(config: SantimentConfig) -> Self {
        info!(
            slug = ?config.slug,
            api_key = ?config.api_key,
            "[SOURCE] Santiment adapter configured"
        );
        Self {
            config,
            http_client: build_client("sentiment_engine/santiment"),
            closed: AtomicBool::new(false),
        }
    }

    async fn collect(&self, params: &FetchParams) -> SourceResult<f64> {
        if self.is_closed() {
            return Err(SourceError::Closed);
        }
        let key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| SourceError::MissingCredential(API_KEY_ENV.to_string()))?;

        let slug = self.config.slug.as_deref().unwrap_or(params.asset.as_str());
        let request = GraphQlRequest {
            query: sentiment_volume_query(slug, &self.config.lookback, &self.config.interval),
        };

        let response = self
            .http_client
            .post(format!("{}/graphql", self.config.base_url))
            .header("Authorization", format!("Apikey {}", key.expose()))
            .json(&request)
            .send()
            .await?;
        let body: GraphQlResponse = read_json(response).await?;

        if let Some(err) = body.errors.first() {
            return Err(SourceError::InvalidResponse(format!(
                "GraphQL error: {}",
                err.message
            )));
        }
        let volume = body
            .data
            .ok_or_else(|| SourceError::InvalidResponse("missing data".to_string()))?;

        debug!(slug = %slug, "Santiment volume received");
        volume.score().ok_or(SourceError::NoData)
    }
}

#[async_trait]
impl SourceAdapter for SantimentAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::Santiment
    }

    async fn fetch(&self, params: &FetchParams) -> SourceScore {
        into_source_score(SourceId::Santiment, self.collect(params).await)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        info!("[SOURCE] Santiment adapter closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
