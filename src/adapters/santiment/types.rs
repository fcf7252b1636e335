//! Santiment GraphQL payloads

use serde::{Deserialize, Serialize};

/// GraphQL request body
#[derive(Debug, Serialize)]
pub struct GraphQlRequest {
    pub query: String,
}

/// Positive/negative sentiment volume query for one slug
pub fn sentiment_volume_query(slug: &str, from: &str, interval: &str) -> String {
    format!(
        r#"{{
  positive: getMetric(metric: "sentiment_positive_total") {{
    timeseriesData(slug: "{slug}", from: "{from}", to: "utc_now", interval: "{interval}") {{ value }}
  }}
  negative: getMetric(metric: "sentiment_negative_total") {{
    timeseriesData(slug: "{slug}", from: "{from}", to: "utc_now", interval: "{interval}") {{ value }}
  }}
}}"#
    )
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlResponse {
    #[serde(default)]
    pub data: Option<SentimentVolume>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlError {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SentimentVolume {
    pub positive: Option<Metric>,
    pub negative: Option<Metric>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    #[serde(default)]
    pub timeseries_data: Vec<Point>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Point {
    #[serde(default)]
    pub value: Option<f64>,
}

impl Metric {
    pub fn total(&self) -> f64 {
        self.timeseries_data
            .iter()
            .filter_map(|p| p.value)
            .filter(|v| v.is_finite() && *v > 0.0)
            .sum()
    }
}

impl SentimentVolume {
    /// `pos / (pos + neg)`; `None` when there is no volume at all
    pub fn score(&self) -> Option<f64> {
        let positive = self.positive.as_ref().map(Metric::total).unwrap_or(0.0);
        let negative = self.negative.as_ref().map(Metric::total).unwrap_or(0.0);
        let total = positive + negative;
        if total > 0.0 {
            Some(positive / total)
        } else {
            None
        }
    }
}
