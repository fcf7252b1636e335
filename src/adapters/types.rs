//! Shared types for source adapters
//!
//! `SourceScore` carries an explicit `Reading::Absent` instead of a sentinel
//! value, so every consumer has to handle the unavailable case.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Source identifiers
// =============================================================================

/// Supported sentiment providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    Twitter,
    Santiment,
    Reddit,
    CryptoPanic,
}

impl SourceId {
    /// All providers, in a stable order
    pub const ALL: [SourceId; 4] = [
        SourceId::Twitter,
        SourceId::Santiment,
        SourceId::Reddit,
        SourceId::CryptoPanic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Twitter => "twitter",
            SourceId::Santiment => "santiment",
            SourceId::Reddit => "reddit",
            SourceId::CryptoPanic => "cryptopanic",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "twitter" => Ok(SourceId::Twitter),
            "santiment" => Ok(SourceId::Santiment),
            "reddit" => Ok(SourceId::Reddit),
            "cryptopanic" => Ok(SourceId::CryptoPanic),
            other => Err(format!("unknown source '{}'", other)),
        }
    }
}

// =============================================================================
// Scores
// =============================================================================

/// A provider reading: either a normalized score in [0,1] or nothing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "lowercase")]
pub enum Reading {
    Present(f64),
    Absent,
}

/// Score reported by one source for one round
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceScore {
    pub source: SourceId,
    pub reading: Reading,
}

impl SourceScore {
    /// Build a present score, clamped to [0,1].
    ///
    /// Non-finite values are treated as absence.
    pub fn present(source: SourceId, value: f64) -> Self {
        let reading = if value.is_finite() {
            Reading::Present(value.clamp(0.0, 1.0))
        } else {
            Reading::Absent
        };
        Self { source, reading }
    }

    pub fn absent(source: SourceId) -> Self {
        Self {
            source,
            reading: Reading::Absent,
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self.reading {
            Reading::Present(v) => Some(v),
            Reading::Absent => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self.reading, Reading::Present(_))
    }
}

// =============================================================================
// Raw samples
// =============================================================================

/// Engagement counters attached to a raw item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementMetrics {
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub shares: u64,
    #[serde(default)]
    pub replies: u64,
}

impl EngagementMetrics {
    /// Engagement weight for short posts: base 1.0 plus capped boosts
    pub fn post_weight(&self) -> f64 {
        1.0 + (self.likes as f64 / 100.0).min(2.0)
            + (self.shares as f64 / 25.0).min(1.5)
            + (self.replies as f64 / 50.0).min(0.5)
    }
}

/// One raw text item captured from a stream.
///
/// Immutable once created; owned by the window bucket that holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentSample {
    pub source_id: SourceId,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub engagement_metrics: EngagementMetrics,
}

impl SentimentSample {
    pub fn new(source_id: SourceId, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            source_id,
            text: text.into(),
            timestamp,
            engagement_metrics: EngagementMetrics::default(),
        }
    }

    pub fn with_engagement(mut self, engagement_metrics: EngagementMetrics) -> Self {
        self.engagement_metrics = engagement_metrics;
        self
    }
}

// =============================================================================
// Fetch parameters
// =============================================================================

/// What the adapters are asked about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchParams {
    /// Provider-neutral asset slug (e.g. "near-protocol")
    pub asset: String,
    /// Relevance keywords, lowercase
    pub keywords: Vec<String>,
}

impl FetchParams {
    pub fn new(asset: impl Into<String>, keywords: Vec<String>) -> Self {
        Self {
            asset: asset.into(),
            keywords: keywords.into_iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    /// True if `text` mentions any keyword (case-insensitive)
    pub fn is_relevant(&self, text: &str) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        let lower = text.to_lowercase();
        self.keywords.iter().any(|k| lower.contains(k.as_str()))
    }
}

impl Default for FetchParams {
    fn default() -> Self {
        Self::new(
            "near-protocol",
            vec![
                "near".to_string(),
                "near protocol".to_string(),
                "$near".to_string(),
                "nearprotocol".to_string(),
                "aurora".to_string(),
                "near defi".to_string(),
                "near ecosystem".to_string(),
            ],
        )
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// API secret that never prints in clear (Debug/Display are redacted)
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Read a credential from the environment; empty values count as unset
    pub fn from_env(var: &str) -> Option<Self> {
        std::env::var(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(Self)
    }

    /// The raw secret, for request signing only
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", crate::core::logging::sanitize(&self.0))
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", crate::core::logging::sanitize(&self.0))
    }
}

/// Weighted mean of `(value, weight)` pairs.
///
/// Returns `None` when the total weight is not positive.
pub fn weighted_mean<I>(pairs: I) -> Option<f64>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let (sum, total) = pairs
        .into_iter()
        .fold((0.0, 0.0), |(s, t), (v, w)| (s + v * w, t + w));
    if total > 0.0 {
        Some(sum / total)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_id_serde_lowercase() {
        let id: SourceId = serde_yaml::from_str("cryptopanic").unwrap();
        assert_eq!(id, SourceId::CryptoPanic);
        assert_eq!(serde_json::to_string(&SourceId::Twitter).unwrap(), "\"twitter\"");
    }

    #[test]
    fn test_source_id_from_str() {
        assert_eq!("Reddit".parse::<SourceId>().unwrap(), SourceId::Reddit);
        assert!("mastodon".parse::<SourceId>().is_err());
    }

    #[test]
    fn test_present_clamps() {
        assert_eq!(SourceScore::present(SourceId::Twitter, 1.4).value(), Some(1.0));
        assert_eq!(SourceScore::present(SourceId::Twitter, -0.1).value(), Some(0.0));
    }

    #[test]
    fn test_nan_is_absent() {
        let score = SourceScore::present(SourceId::Reddit, f64::NAN);
        assert!(!score.is_present());
        assert_eq!(score.value(), None);
    }

    #[test]
    fn test_reading_serde_shape() {
        let json = serde_json::to_value(Reading::Present(0.5)).unwrap();
        assert_eq!(json["status"], "present");
        assert_eq!(json["value"], 0.5);
        let absent = serde_json::to_value(Reading::Absent).unwrap();
        assert_eq!(absent["status"], "absent");
    }

    #[test]
    fn test_post_weight_caps() {
        let quiet = EngagementMetrics::default();
        assert_eq!(quiet.post_weight(), 1.0);

        let viral = EngagementMetrics {
            likes: 10_000,
            shares: 10_000,
            replies: 10_000,
        };
        assert!((viral.post_weight() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_is_relevant() {
        let params = FetchParams::default();
        assert!(params.is_relevant("Big NEAR Protocol upgrade"));
        assert!(!params.is_relevant("Bitcoin breaks out"));
    }

    #[test]
    fn test_credential_is_redacted() {
        let key = Credential::new("sk-1234567890abcdef");
        assert_eq!(format!("{:?}", key), "Credential(sk-1...REDACTED)");
        assert_eq!(key.expose(), "sk-1234567890abcdef");
    }

    #[test]
    fn test_weighted_mean() {
        assert_eq!(weighted_mean(vec![(1.0, 1.0), (0.0, 3.0)]), Some(0.25));
        assert_eq!(weighted_mean(Vec::<(f64, f64)>::new()), None);
    }
}
