//! Twitter API v2 payloads

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::adapters::types::{EngagementMetrics, SentimentSample, SourceId};

/// Response of `GET /2/tweets/search/recent`
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub data: Vec<Tweet>,
    #[serde(default)]
    pub meta: Option<SearchMeta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchMeta {
    #[serde(default)]
    pub result_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tweet {
    #[serde(default)]
    pub id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub public_metrics: PublicMetrics,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PublicMetrics {
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub retweet_count: u64,
    #[serde(default)]
    pub reply_count: u64,
    #[serde(default)]
    pub quote_count: u64,
}

impl PublicMetrics {
    /// Quotes count as shares
    pub fn engagement(&self) -> EngagementMetrics {
        EngagementMetrics {
            likes: self.like_count,
            shares: self.retweet_count + self.quote_count,
            replies: self.reply_count,
        }
    }
}

impl Tweet {
    /// Convert to a window sample; `received_at` is used when the tweet has no timestamp
    pub fn into_sample(self, received_at: DateTime<Utc>) -> SentimentSample {
        let engagement = self.public_metrics.engagement();
        SentimentSample::new(
            SourceId::Twitter,
            self.text,
            self.created_at.unwrap_or(received_at),
        )
        .with_engagement(engagement)
    }
}

/// One frame of the filtered stream
#[derive(Debug, Clone, Deserialize)]
pub struct StreamMessage {
    pub data: Tweet,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_message_decodes() {
        let frame = r#"{"data": {"id": "1", "text": "NEAR mainnet", "created_at": "2024-03-01T12:00:00.000Z",
            "public_metrics": {"like_count": 10, "retweet_count": 2, "reply_count": 1, "quote_count": 3}}}"#;
        let msg: StreamMessage = serde_json::from_str(frame).unwrap();
        let sample = msg.data.into_sample(Utc::now());
        assert_eq!(sample.source_id, SourceId::Twitter);
        assert_eq!(sample.engagement_metrics.shares, 5);
        assert_eq!(sample.timestamp.to_rfc3339(), "2024-03-01T12:00:00+00:00");
    }

    #[test]
    fn test_frame_without_text_is_rejected() {
        let frame = r#"{"data": {"id": "1"}}"#;
        assert!(serde_json::from_str::<StreamMessage>(frame).is_err());
    }

    #[test]
    fn test_empty_search_response() {
        let resp: SearchResponse = serde_json::from_str(r#"{"meta": {"result_count": 0}}"#).unwrap();
        assert!(resp.data.is_empty());
        assert_eq!(resp.meta.map(|m| m.result_count), Some(0));
    }
}
