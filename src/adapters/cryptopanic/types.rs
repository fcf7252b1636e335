//! CryptoPanic payloads and vote scoring

use serde::Deserialize;

use crate::adapters::types::weighted_mean;

/// Response of `GET /posts/`
#[derive(Debug, Clone, Deserialize)]
pub struct PostsResponse {
    #[serde(default)]
    pub results: Vec<NewsItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewsItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub votes: Votes,
    #[serde(default)]
    pub source: Option<NewsSource>,
    #[serde(default)]
    pub is_breaking: bool,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Votes {
    #[serde(default)]
    pub positive: u64,
    #[serde(default)]
    pub negative: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewsSource {
    #[serde(default)]
    pub verified: bool,
}

impl NewsItem {
    /// Vote polarity in [-1,1]; 0 without votes
    pub fn vote_score(&self) -> f64 {
        let total = self.votes.positive + self.votes.negative;
        if total == 0 {
            return 0.0;
        }
        (self.votes.positive as f64 - self.votes.negative as f64) / total as f64
    }

    /// 1 base, +1 verified source, +1 breaking
    pub fn importance(&self) -> f64 {
        let mut importance = 1.0;
        if self.source.as_ref().map(|s| s.verified).unwrap_or(false) {
            importance += 1.0;
        }
        if self.is_breaking {
            importance += 1.0;
        }
        importance
    }
}

/// Importance-weighted vote polarity mapped to [0,1]
pub fn score_news(items: &[NewsItem]) -> Option<f64> {
    weighted_mean(items.iter().map(|item| (item.vote_score(), item.importance())))
        .map(|polarity| (polarity + 1.0) / 2.0)
}
