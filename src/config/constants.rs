//! Operational defaults overridable from the environment
//!
//! These are process-level knobs (timeouts, channel sizes) rather than
//! pipeline semantics, which live in the YAML config.

use std::time::Duration;

fn env_or<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

// =============================================================================
// Network
// =============================================================================

/// Whole-request timeout for provider HTTP calls (default: 10 seconds)
///
/// Environment variable: `HTTP_TIMEOUT_SECS`
pub fn http_timeout() -> Duration {
    Duration::from_secs(env_or("HTTP_TIMEOUT_SECS", 10))
}

/// Base delay before reconnecting a dropped stream (default: 5 seconds)
///
/// Environment variable: `STREAM_RECONNECT_DELAY_SECS`
pub fn stream_reconnect_delay() -> Duration {
    Duration::from_secs(env_or("STREAM_RECONNECT_DELAY_SECS", 5))
}

// =============================================================================
// Channels & Memory
// =============================================================================

/// Capacity of the stream → window sample channel (default: 1024)
///
/// Environment variable: `SAMPLE_CHANNEL_CAPACITY`
pub fn sample_channel_capacity() -> usize {
    env_or("SAMPLE_CHANNEL_CAPACITY", 1024)
}

/// Capacity of the trigger → actuator intent channel (default: 16)
///
/// Environment variable: `INTENT_CHANNEL_CAPACITY`
pub fn intent_channel_capacity() -> usize {
    env_or("INTENT_CHANNEL_CAPACITY", 16)
}

/// Hard cap on samples held by one window bucket (default: 10000)
///
/// Environment variable: `MAX_SAMPLES_PER_BUCKET`
pub fn max_samples_per_bucket() -> usize {
    env_or("MAX_SAMPLES_PER_BUCKET", 10_000)
}

/// Log the effective values at startup
pub fn log_configuration() {
    tracing::info!(
        http_timeout = ?http_timeout(),
        stream_reconnect_delay = ?stream_reconnect_delay(),
        sample_channel_capacity = sample_channel_capacity(),
        intent_channel_capacity = intent_channel_capacity(),
        max_samples_per_bucket = max_samples_per_bucket(),
        "[CONFIG] Operational defaults"
    );
}
