//! Sentiment Engine
//!
//! Multi-source market-sentiment pipeline:
//! - Source adapters (Twitter, Reddit, CryptoPanic, Santiment)
//! - Weighted composite scoring with confidence and market signals
//! - Time-windowed ingestion buffer with threshold gating and fallback
//! - Two-source confirmation before emitting action intents

pub mod adapters;
pub mod config;
pub mod core;
pub mod error;

pub use error::AppError;
