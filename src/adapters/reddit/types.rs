//! Reddit listing payloads

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Response of `GET /r/{sub}/{listing}.json`
#[derive(Debug, Clone, Deserialize)]
pub struct Listing {
    pub data: ListingData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingData {
    #[serde(default)]
    pub children: Vec<Child>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Child {
    pub data: Post,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Post {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: u64,
    #[serde(default)]
    pub created_utc: f64,
    /// Subreddit the post was fetched from
    #[serde(skip)]
    pub fetched_from: String,
}

impl Post {
    /// Title and body joined, as scored
    pub fn text(&self) -> String {
        format!("{} {}", self.title, self.selftext).trim().to_string()
    }

    /// Engagement, recency and subreddit weighting
    pub fn weight(&self, home_subreddit: &str, now: DateTime<Utc>) -> f64 {
        let mut weight = 1.0
            + (self.score.max(0) as f64 / 100.0).min(2.0)
            + (self.num_comments as f64 / 50.0).min(1.5);

        let hours_old = (now.timestamp() as f64 - self.created_utc) / 3600.0;
        if hours_old <= 6.0 {
            weight *= 1.5;
        } else if hours_old <= 12.0 {
            weight *= 1.25;
        }

        if self.fetched_from.eq_ignore_ascii_case(home_subreddit) {
            weight *= 1.3;
        }
        weight
    }
}
