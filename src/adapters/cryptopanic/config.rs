//! CryptoPanic Configuration

use serde::{Deserialize, Serialize};

use crate::adapters::types::Credential;

const DEFAULT_BASE_URL: &str = "https://cryptopanic.com/api/v1";
pub(crate) const API_KEY_ENV: &str = "CRYPTOPANIC_API_KEY";

/// Configuration for the CryptoPanic news adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoPanicConfig {
    pub base_url: String,
    /// Currency codes passed to `currencies=`
    pub currencies: String,
    pub kind: String,
    /// Optional `filter=` value (`important`, `hot`, `rising`, ...)
    pub filter: Option<String>,
    #[serde(skip)]
    pub api_key: Option<Credential>,
}

impl Default for CryptoPanicConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            currencies: "NEAR".to_string(),
            kind: "news".to_string(),
            filter: Some("important".to_string()),
            api_key: None,
        }
    }
}

impl CryptoPanicConfig {
    /// Fill the API key from `CRYPTOPANIC_API_KEY` if not already set
    pub fn with_env(mut self) -> Self {
        if self.api_key.is_none() {
            self.api_key = Credential::from_env(API_KEY_ENV);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_yaml_filter_can_be_disabled() {
        let config: CryptoPanicConfig = serde_yaml::from_str("filter: ~\n").unwrap();
        assert!(config.filter.is_none());
        assert_eq!(config.kind, "news");
    }

    #[test]
    #[serial(env)]
    fn test_with_env_ignores_empty_key() {
        std::env::set_var(API_KEY_ENV, "   ");
        assert!(CryptoPanicConfig::default().with_env().api_key.is_none());
        std::env::remove_var(API_KEY_ENV);
    }
}
