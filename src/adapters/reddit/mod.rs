//! Reddit Source Adapter
//!
//! Public listing JSON from a set of subreddits, filtered for relevance and
//! weighted by engagement, recency and subreddit.
//!
//! This module is organized into submodules:
//! - `config` - Subreddits, listings and cache settings
//! - `types` - Listing payloads and post weighting
//! - `adapter` - Main RedditAdapter implementation

mod adapter;
mod config;
mod types;

// Re-export public items
pub use adapter::RedditAdapter;
pub use config::RedditConfig;
