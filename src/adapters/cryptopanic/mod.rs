//! CryptoPanic Source Adapter
//!
//! News items scored by community votes, weighted by source verification
//! and breaking-news status.

mod adapter;
mod config;
mod types;

// Re-export public items
pub use adapter::CryptoPanicAdapter;
pub use config::CryptoPanicConfig;
