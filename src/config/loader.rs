//! YAML configuration loading
//!
//! Both entry points validate before returning, so a loaded `AppConfig`
//! is always usable.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tracing::info;

use crate::error::AppError;

use super::types::AppConfig;

/// Load and validate configuration from a YAML file
///
/// # Errors
/// Missing file, YAML parse failure, or any rule in `AppConfig::validate`.
pub fn load_config(path: &Path) -> Result<AppConfig, AppError> {
    if !path.exists() {
        return Err(AppError::Config(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let reader = BufReader::new(File::open(path)?);
    let config: AppConfig = serde_yaml::from_reader(reader).map_err(|e| {
        AppError::Config(format!("YAML parse error in '{}': {}", path.display(), e))
    })?;

    config.validate()?;
    info!(path = %path.display(), "[CONFIG] Configuration loaded");
    Ok(config)
}

/// Load configuration from a YAML string (useful for testing)
pub fn load_config_from_str(yaml_content: &str) -> Result<AppConfig, AppError> {
    let config: AppConfig = serde_yaml::from_str(yaml_content)
        .map_err(|e| AppError::Config(format!("YAML parse error: {}", e)))?;

    config.validate()?;
    Ok(config)
}

// ============================================================================
// Tests
// ============================================================================
