//! Reddit Adapter Implementation
//!
//! Listings are fetched concurrently; the round's score is cached per
//! `cache_ttl_secs` time bucket.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::adapters::errors::{SourceError, SourceResult};
use crate::adapters::http::{build_client, read_json};
use crate::adapters::traits::{into_source_score, SourceAdapter};
use crate::adapters::types::{FetchParams, SourceId, SourceScore};
use crate::core::scorer::{score_weighted, TextScorer};

use super::config::RedditConfig;
use super::types::{Listing, Post};

/// Reddit adapter implementing SourceAdapter
pub struct RedditAdapter {
    config: RedditConfig,
    scorer: Arc<dyn TextScorer>,
    http_client: reqwest::Client,
    /// (time bucket, score)
    cache: Mutex<Option<(i64, f64)>>,
    closed: AtomicBool,
}

impl RedditAdapter {
    pub fn new(config: RedditConfig, scorer: Arc<dyn TextScorer>) -> Self {
        let http_client = build_client(&config.user_agent);
        info!(
            subreddits = ?config.subreddits,
            listings = ?config.listings,
            "[SOURCE] Reddit adapter configured"
        );
        Self {
            config,
            scorer,
            http_client,
            cache: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    fn cache_bucket(&self) -> i64 {
        let ttl = self.config.cache_ttl_secs.max(1) as i64;
        Utc::now().timestamp() / ttl
    }

    async fn fetch_listing(&self, subreddit: &str, listing: &str) -> SourceResult<Vec<Post>> {
        let url = format!("{}/r/{}/{}.json", self.config.base_url, subreddit, listing);
        let response = self
            .http_client
            .get(&url)
            .query(&[("limit", self.config.limit.to_string())])
            .send()
            .await?;
        let listing: Listing = read_json(response).await?;

        Ok(listing
            .data
            .children
            .into_iter()
            .map(|child| {
                let mut post = child.data;
                post.fetched_from = subreddit.to_string();
                post
            })
            .collect())
    }

    async fn collect(&self, params: &FetchParams) -> SourceResult<f64> {
        if self.is_closed() {
            return Err(SourceError::Closed);
        }

        let bucket = self.cache_bucket();
        if let Some((cached_bucket, value)) = *self.cache.lock().await {
            if cached_bucket == bucket {
                debug!(score = value, "Reddit score served from cache");
                return Ok(value);
            }
        }

        let mut requests = Vec::new();
        for sub in &self.config.subreddits {
            for listing in &self.config.listings {
                requests.push(self.fetch_listing(sub, listing));
            }
        }
        let results = join_all(requests).await;

        let mut posts = Vec::new();
        let mut first_error = None;
        let mut successes = 0usize;
        for result in results {
            match result {
                Ok(batch) => {
                    successes += 1;
                    posts.extend(batch);
                }
                Err(e) => {
                    warn!(error = %e, "Reddit listing request failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        if successes == 0 {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        let now = Utc::now();
        let mut seen = HashSet::new();
        let items: Vec<(String, f64)> = posts
            .into_iter()
            .filter(|post| post.id.is_empty() || seen.insert(post.id.clone()))
            .filter(|post| params.is_relevant(&post.text()))
            .map(|post| {
                let weight = post.weight(&self.config.home_subreddit, now);
                (post.text(), weight)
            })
            .collect();

        debug!(relevant_posts = items.len(), "Reddit posts collected");
        let value = score_weighted(self.scorer.as_ref(), items).await?;

        *self.cache.lock().await = Some((bucket, value));
        Ok(value)
    }
}

#[async_trait]
impl SourceAdapter for RedditAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::Reddit
    }

    async fn fetch(&self, params: &FetchParams) -> SourceScore {
        into_source_score(SourceId::Reddit, self.collect(params).await)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        info!("[SOURCE] Reddit adapter closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scorer::LexiconScorer;
    use mockito::Matcher;

    fn config_for(server: &mockito::ServerGuard) -> RedditConfig {
        RedditConfig {
            base_url: server.url(),
            subreddits: vec!["NEAR".to_string()],
            listings: vec!["hot".to_string(), "new".to_string()],
            ..RedditConfig::default()
        }
    }

    fn listing_body(posts: &[(&str, &str)]) -> String {
        let children: Vec<serde_json::Value> = posts
            .iter()
            .map(|(id, title)| {
                serde_json::json!({"kind": "t3", "data": {
                    "id": id, "title": title, "selftext": "",
                    "score": 0, "num_comments": 0, "created_utc": 0.0
                }})
            })
            .collect();
        serde_json::json!({"kind": "Listing", "data": {"children": children}}).to_string()
    }

    #[tokio::test]
    async fn test_fetch_filters_dedupes_and_caches() {
        let mut server = mockito::Server::new_async().await;
        let hot = server
            .mock("GET", "/r/NEAR/hot.json")
            .match_query(Matcher::UrlEncoded("limit".into(), "25".into()))
            .with_status(200)
            .with_body(listing_body(&[
                ("a", "NEAR mainnet upgrade"),
                ("b", "Bitcoin dominance chart"),
            ]))
            .expect(1)
            .create_async()
            .await;
        let new = server
            .mock("GET", "/r/NEAR/new.json")
            .match_query(Matcher::UrlEncoded("limit".into(), "25".into()))
            .with_status(200)
            .with_body(listing_body(&[("a", "NEAR mainnet upgrade")]))
            .expect(1)
            .create_async()
            .await;

        let adapter = RedditAdapter::new(config_for(&server), Arc::new(LexiconScorer::new()));
        let params = FetchParams::default();

        // Only post "a" survives relevance filtering and dedupe
        let first = adapter.fetch(&params).await.value().unwrap();
        assert!((first - 0.8).abs() < 1e-9);

        let second = adapter.fetch(&params).await.value().unwrap();
        assert_eq!(first, second);

        hot.assert_async().await;
        new.assert_async().await;
    }

    #[tokio::test]
    async fn test_partial_failure_still_scores() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/r/NEAR/hot.json")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;
        server
            .mock("GET", "/r/NEAR/new.json")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(listing_body(&[("c", "NEAR validator set rotated")]))
            .create_async()
            .await;

        let adapter = RedditAdapter::new(config_for(&server), Arc::new(LexiconScorer::new()));
        let score = adapter.fetch(&FetchParams::default()).await;
        assert!((score.value().unwrap() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_all_requests_failing_is_absent() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", Matcher::Regex(r"^/r/NEAR/.*\.json$".to_string()))
            .match_query(Matcher::Any)
            .with_status(429)
            .create_async()
            .await;

        let adapter = RedditAdapter::new(config_for(&server), Arc::new(LexiconScorer::new()));
        assert!(!adapter.fetch(&FetchParams::default()).await.is_present());
    }

    #[tokio::test]
    async fn test_no_relevant_posts_is_absent() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", Matcher::Regex(r"^/r/NEAR/.*\.json$".to_string()))
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(listing_body(&[("z", "ETH gas fees today")]))
            .create_async()
            .await;

        let adapter = RedditAdapter::new(config_for(&server), Arc::new(LexiconScorer::new()));
        assert!(!adapter.fetch(&FetchParams::default()).await.is_present());
    }
}
