//! Twitter Adapter Implementation
//!
//! Engagement-weighted text sentiment over recent posts matching the asset
//! keywords.
//!
//! Docs: https://developer.twitter.com/en/docs/twitter-api/tweets/search

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::adapters::errors::{SourceError, SourceResult};
use crate::adapters::http::{build_client, read_json};
use crate::adapters::traits::{into_source_score, SourceAdapter};
use crate::adapters::types::{FetchParams, SourceId, SourceScore};
use crate::core::scorer::{score_weighted, TextScorer};

use super::config::{TwitterConfig, BEARER_TOKEN_ENV};
use super::types::SearchResponse;

/// Twitter recent-search adapter implementing SourceAdapter
pub struct TwitterAdapter {
    config: TwitterConfig,
    scorer: Arc<dyn TextScorer>,
    http_client: reqwest::Client,
    closed: AtomicBool,
}

impl TwitterAdapter {
    pub fn new(config: TwitterConfig, scorer: Arc<dyn TextScorer>) -> Self {
        info!(
            base_url = %config.base_url,
            token = ?config.bearer_token,
            "[SOURCE] Twitter adapter configured"
        );
        Self {
            config,
            scorer,
            http_client: build_client("sentiment_engine/twitter"),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &TwitterConfig {
        &self.config
    }

    async fn collect(&self, params: &FetchParams) -> SourceResult<f64> {
        if self.is_closed() {
            return Err(SourceError::Closed);
        }
        let token = self
            .config
            .bearer_token
            .as_ref()
            .ok_or_else(|| SourceError::MissingCredential(BEARER_TOKEN_ENV.to_string()))?;

        let url = format!("{}/2/tweets/search/recent", self.config.base_url);
        let query = self.config.search_query(params);
        let page_size = self.config.page_size().to_string();

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token.expose())
            .query(&[
                ("query", query.as_str()),
                ("max_results", page_size.as_str()),
                ("tweet.fields", "created_at,public_metrics"),
            ])
            .send()
            .await?;
        let body: SearchResponse = read_json(response).await?;

        debug!(tweets = body.data.len(), "Twitter search page received");

        let items: Vec<(String, f64)> = body
            .data
            .into_iter()
            .map(|tweet| {
                let weight = tweet.public_metrics.engagement().post_weight();
                (tweet.text, weight)
            })
            .collect();

        score_weighted(self.scorer.as_ref(), items).await
    }
}

#[async_trait]
impl SourceAdapter for TwitterAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::Twitter
    }

    async fn fetch(&self, params: &FetchParams) -> SourceScore {
        into_source_score(SourceId::Twitter, self.collect(params).await)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        info!("[SOURCE] Twitter adapter closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
