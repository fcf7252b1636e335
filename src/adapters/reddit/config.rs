//! Reddit Configuration

use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://www.reddit.com";
const DEFAULT_USER_AGENT: &str = "sentiment_engine/0.1";
const USER_AGENT_ENV: &str = "REDDIT_USER_AGENT";

/// Configuration for the Reddit listing adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub base_url: String,
    pub subreddits: Vec<String>,
    /// Posts from this subreddit get a 1.3x weight boost
    pub home_subreddit: String,
    /// Listing kinds fetched per subreddit (`hot`, `new`)
    pub listings: Vec<String>,
    pub limit: u32,
    /// Scores are reused within the same `cache_ttl_secs` time bucket
    pub cache_ttl_secs: u64,
    pub user_agent: String,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            subreddits: vec![
                "NEAR".to_string(),
                "cryptocurrency".to_string(),
                "ethfinance".to_string(),
            ],
            home_subreddit: "NEAR".to_string(),
            listings: vec!["hot".to_string(), "new".to_string()],
            limit: 25,
            cache_ttl_secs: 3600,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl RedditConfig {
    /// Override the user agent from `REDDIT_USER_AGENT` when set
    pub fn with_env(mut self) -> Self {
        if let Ok(agent) = std::env::var(USER_AGENT_ENV) {
            if !agent.trim().is_empty() {
                self.user_agent = agent;
            }
        }
        self
    }
}
