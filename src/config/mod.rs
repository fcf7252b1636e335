//! Configuration module
//!
//! - YAML configuration types (`AppConfig` and its sections) and loading
//! - Supabase settings from the environment
//! - Operational constants with environment variable overrides

pub mod constants;
mod loader;
mod supabase;
mod types;

pub use types::{
    ActuatorConfig, AppConfig, FallbackConfig, PipelineConfig, ProvidersConfig, SourcesConfig,
    StoreConfig, ThresholdsConfig, WindowConfig,
};

pub use loader::{load_config, load_config_from_str};

pub use supabase::{SupabaseConfig, SupabaseConfigError};
