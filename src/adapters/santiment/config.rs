//! Santiment Configuration

use serde::{Deserialize, Serialize};

use crate::adapters::types::Credential;

const DEFAULT_BASE_URL: &str = "https://api.santiment.net";
pub(crate) const API_KEY_ENV: &str = "SANTIMENT_API_KEY";

/// Configuration for the Santiment GraphQL adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SantimentConfig {
    pub base_url: String,
    /// Project slug; falls back to the fetch asset when unset
    pub slug: Option<String>,
    /// Santiment relative time expression for the window start
    pub lookback: String,
    pub interval: String,
    #[serde(skip)]
    pub api_key: Option<Credential>,
}

impl Default for SantimentConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            slug: None,
            lookback: "utc_now-1d".to_string(),
            interval: "1d".to_string(),
            api_key: None,
        }
    }
}

impl SantimentConfig {
    /// Fill the API key from `SANTIMENT_API_KEY` if not already set
    pub fn with_env(mut self) -> Self {
        if self.api_key.is_none() {
            self.api_key = Credential::from_env(API_KEY_ENV);
        }
        self
    }
}
