//! Application-wide error types using thiserror
//!
//! Layer-specific errors (adapters, scorer, aggregation) convert into
//! `AppError` so binaries can propagate them with `?`.

use thiserror::Error;

use crate::adapters::errors::SourceError;
use crate::core::aggregator::AggregateError;
use crate::core::scorer::ScorerError;
use crate::core::store::StoreError;
use crate::core::stream::StreamError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source weights missing, negative, or not summing to 1.0
    #[error("Weight configuration error: {0}")]
    WeightConfig(String),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Aggregation error: {0}")]
    Aggregate(#[from] AggregateError),

    #[error("Scorer error: {0}")]
    Scorer(#[from] ScorerError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
