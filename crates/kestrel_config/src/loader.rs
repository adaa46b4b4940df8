//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::KestrelConfig;
use std::path::Path;

/// Name of the configuration file looked up by [`load_config`].
pub const CONFIG_FILE_NAME: &str = "kestrel.toml";

/// Loads and validates a `kestrel.toml` configuration from a directory.
///
/// Reads `<dir>/kestrel.toml`, parses it, and validates its values.
pub fn load_config(dir: &Path) -> Result<KestrelConfig, ConfigError> {
    let path = dir.join(CONFIG_FILE_NAME);
    let content =
        std::fs::read_to_string(&path).map_err(|source| ConfigError::Read { path, source })?;
    load_config_from_str(&content)
}

/// Parses and validates a `kestrel.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<KestrelConfig, ConfigError> {
    let config: KestrelConfig = toml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that iteration bounds and cost weights are usable.
fn validate_config(config: &KestrelConfig) -> Result<(), ConfigError> {
    let router = &config.router;
    if router.iterations == 0 {
        return Err(ConfigError::Invalid {
            key: "router.iterations",
            reason: "must be at least 1".to_string(),
        });
    }
    if router.conditional_iterations == 0 {
        return Err(ConfigError::Invalid {
            key: "router.conditional_iterations",
            reason: "must be at least 1".to_string(),
        });
    }
    if router.cost.invalidated <= router.cost.base {
        return Err(ConfigError::Invalid {
            key: "router.cost.invalidated",
            reason: format!(
                "({}) must exceed router.cost.base ({})",
                router.cost.invalidated, router.cost.base
            ),
        });
    }
    Ok(())
}
