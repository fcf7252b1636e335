//! Twitter Configuration

use serde::{Deserialize, Serialize};

use crate::adapters::types::{Credential, FetchParams};

// =============================================================================
// Constants
// =============================================================================

/// REST API base URL
const DEFAULT_BASE_URL: &str = "https://api.twitter.com";
/// Filtered stream endpoint
const DEFAULT_STREAM_URL: &str = "wss://api.twitter.com/2/tweets/search/stream";
/// Environment variable holding the bearer token
pub(crate) const BEARER_TOKEN_ENV: &str = "TWITTER_BEARER_TOKEN";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the Twitter recent-search adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwitterConfig {
    pub base_url: String,
    pub stream_url: String,
    /// Explicit search query; built from the fetch keywords when unset
    pub query: Option<String>,
    /// Page size, clamped to the API range 10..=100
    pub max_results: u32,
    #[serde(skip)]
    pub bearer_token: Option<Credential>,
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            stream_url: DEFAULT_STREAM_URL.to_string(),
            query: None,
            max_results: 100,
            bearer_token: None,
        }
    }
}

impl TwitterConfig {
    /// Fill the bearer token from `TWITTER_BEARER_TOKEN` if not already set
    pub fn with_env(mut self) -> Self {
        if self.bearer_token.is_none() {
            self.bearer_token = Credential::from_env(BEARER_TOKEN_ENV);
        }
        self
    }

    pub fn page_size(&self) -> u32 {
        self.max_results.clamp(10, 100)
    }

    /// Query string sent to the search endpoint
    pub fn search_query(&self, params: &FetchParams) -> String {
        if let Some(query) = &self.query {
            return query.clone();
        }
        let terms: Vec<String> = params
            .keywords
            .iter()
            .map(|k| {
                if k.contains(' ') {
                    format!("\"{}\"", k)
                } else {
                    k.clone()
                }
            })
            .collect();
        format!("({}) -is:retweet lang:en", terms.join(" OR "))
    }
}
