//! Supabase configuration
//!
//! Composite history goes to Supabase when `SUPABASE_URL` and
//! `SUPABASE_ANON_KEY` are set; otherwise the pipeline records nothing.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::adapters::types::Credential;

#[derive(Debug, Error)]
pub enum SupabaseConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid Supabase URL format: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    /// Project URL (e.g., <https://xxx.supabase.co>)
    pub url: String,
    pub anon_key: Credential,
}

impl SupabaseConfig {
    /// Load from the environment.
    ///
    /// - `Ok(None)` when `SUPABASE_ENABLED=false`, or the URL is unset or a placeholder
    /// - `Err` when a URL is set but malformed, or the anon key is missing
    pub fn from_env() -> Result<Option<Self>, SupabaseConfigError> {
        let enabled = std::env::var("SUPABASE_ENABLED")
            .map(|v| !v.eq_ignore_ascii_case("false"))
            .unwrap_or(true);
        if !enabled {
            info!("Supabase persistence disabled via SUPABASE_ENABLED=false");
            return Ok(None);
        }

        let url = match std::env::var("SUPABASE_URL") {
            Ok(u) if u.contains("your-project") => {
                warn!("SUPABASE_URL contains placeholder value, persistence disabled");
                return Ok(None);
            }
            Ok(u) if !u.trim().is_empty() => u.trim_end_matches('/').to_string(),
            _ => {
                debug!("SUPABASE_URL not set, persistence disabled");
                return Ok(None);
            }
        };

        if !url.starts_with("https://") || !url.contains("supabase") {
            return Err(SupabaseConfigError::InvalidUrl(url));
        }

        let anon_key = Credential::from_env("SUPABASE_ANON_KEY")
            .filter(|k| !k.expose().contains("your-anon-key"))
            .ok_or_else(|| SupabaseConfigError::MissingEnvVar("SUPABASE_ANON_KEY".to_string()))?;

        info!(url = %url, anon_key = %anon_key, "Supabase configuration loaded");
        Ok(Some(Self { url, anon_key }))
    }
}
