//! Structured logging setup for sentiment_engine
//!
//! JSON lines by default (for log shipping), human-readable output with
//! `LOG_FORMAT=pretty`. Filtering follows `RUST_LOG`.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RUST_LOG` | `sentiment_engine=info` | Level filter (tracing syntax) |
//! | `LOG_FORMAT` | `json` | `json` or `pretty` |
//!
//! Provider credentials go through [`sanitize`] before they reach a log line:
//!
//! ```rust,ignore
//! tracing::info!(api_key = %sanitize(&key), "[SOURCE] CryptoPanic configured");
//! // api_key = "cp-1...REDACTED"
//! ```

use std::env;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::{fmt as ts_fmt, fmt::format::FmtSpan, prelude::*, EnvFilter};

static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Filter used when `RUST_LOG` is unset or unparsable
pub const DEFAULT_LOG_LEVEL: &str = "sentiment_engine=info";

/// Redacting wrapper for secrets (API keys, bearer tokens).
///
/// Values longer than 8 characters keep a 4-character prefix, anything
/// shorter is fully hidden.
#[derive(Clone)]
pub struct SanitizedValue<'a>(&'a str);

impl<'a> SanitizedValue<'a> {
    pub fn new(value: &'a str) -> Self {
        Self(value)
    }
}

impl fmt::Display for SanitizedValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.char_indices().nth(4) {
            Some((prefix_end, _)) if self.0.chars().count() > 8 => {
                write!(f, "{}...REDACTED", &self.0[..prefix_end])
            }
            _ => write!(f, "REDACTED"),
        }
    }
}

impl fmt::Debug for SanitizedValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SanitizedValue(***)")
    }
}

/// Shorthand for `SanitizedValue::new(value)`
pub fn sanitize(value: &str) -> SanitizedValue<'_> {
    SanitizedValue::new(value)
}

/// Logging settings resolved from the environment
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level_filter: String,
    pub use_pretty_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level_filter: DEFAULT_LOG_LEVEL.to_string(),
            use_pretty_format: false,
        }
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        let level_filter = env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());
        let use_pretty_format = env::var("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("pretty"))
            .unwrap_or(false);

        Self {
            level_filter,
            use_pretty_format,
        }
    }
}

/// Install the global subscriber from `RUST_LOG` / `LOG_FORMAT`.
///
/// Safe to call more than once; only the first call has an effect.
pub fn init_logging() {
    init_logging_with_config(LoggingConfig::from_env());
}

pub fn init_logging_with_config(config: LoggingConfig) {
    if LOGGING_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    let env_filter =
        EnvFilter::try_new(&config.level_filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    if config.use_pretty_format {
        tracing_subscriber::registry()
            .with(
                ts_fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                ts_fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::CLOSE)
                    .with_target(true)
                    .with_current_span(true),
            )
            .with(env_filter)
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_long_secret_keeps_prefix() {
        assert_eq!(sanitize("sk-1234567890abcdef").to_string(), "sk-1...REDACTED");
    }

    #[test]
    fn test_short_secret_fully_redacted() {
        assert_eq!(sanitize("abc").to_string(), "REDACTED");
        assert_eq!(sanitize("12345678").to_string(), "REDACTED");
        assert_eq!(sanitize("").to_string(), "REDACTED");
    }

    #[test]
    fn test_multibyte_secret_does_not_panic() {
        assert_eq!(sanitize("ééééééééé").to_string(), "éééé...REDACTED");
    }

    #[test]
    fn test_debug_hides_everything() {
        assert_eq!(format!("{:?}", sanitize("sk-1234567890abcdef")), "SanitizedValue(***)");
    }

    #[test]
    #[serial(env)]
    fn test_config_from_env() {
        std::env::set_var("LOG_FORMAT", "Pretty");
        std::env::set_var("RUST_LOG", "sentiment_engine=debug");
        let config = LoggingConfig::from_env();
        assert!(config.use_pretty_format);
        assert_eq!(config.level_filter, "sentiment_engine=debug");
        std::env::remove_var("LOG_FORMAT");
        std::env::remove_var("RUST_LOG");

        let config = LoggingConfig::from_env();
        assert!(!config.use_pretty_format);
        assert_eq!(config.level_filter, DEFAULT_LOG_LEVEL);
    }
}
