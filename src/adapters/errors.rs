//! Source adapter error types
//!
//! These never escape `SourceAdapter::fetch`: adapters map every variant
//! to `SourceScore::Absent` and log it. They exist so collection code can
//! use `?` internally.

use thiserror::Error;

/// Errors raised while collecting or normalizing data from one provider
#[derive(Error, Debug)]
pub enum SourceError {
    /// Transport-level failure (DNS, TLS, connection reset, body decode)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with a non-success status
    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// Provider did not answer within the adapter timeout
    #[error("Source timeout after {0}ms")]
    Timeout(u64),

    /// Payload could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Provider answered but nothing relevant was found
    #[error("No relevant data")]
    NoData,

    /// Adapter was closed via `close()`
    #[error("Adapter closed")]
    Closed,

    /// Required credential is not configured
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    /// Text scoring collaborator failed for this batch
    #[error("Scoring failed: {0}")]
    Scoring(String),
}

/// Result type alias for source operations
pub type SourceResult<T> = std::result::Result<T, SourceError>;
