//! Twitter Source Adapter
//!
//! Recent-search REST collection plus the wire types shared with the
//! filtered-stream ingestion task.
//!
//! This module is organized into submodules:
//! - `config` - Endpoints, query settings and bearer token loading
//! - `types` - API response types and stream messages
//! - `adapter` - Main TwitterAdapter implementation

mod adapter;
mod config;
pub mod types;

// Re-export public items
pub use adapter::TwitterAdapter;
pub use config::TwitterConfig;
pub use types::{StreamMessage, Tweet};
