//! Santiment Source Adapter
//!
//! Social sentiment volume (positive vs negative) from the Santiment
//! GraphQL API.

mod adapter;
mod config;
mod types;

// Re-export public items
pub use adapter::SantimentAdapter;
pub use config::SantimentConfig;
