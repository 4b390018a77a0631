//! Configuration file loading utilities.
//!
//! Settings can be loaded from TOML or JSON; the format is picked from the
//! file extension.

use super::errors::ConfigValidator;
use super::settings::SegConfig;
use crate::core::errors::{SegError, SegResult};
use std::path::Path;

/// Configuration file format
#[derive(Debug, Clone, Copy)]
pub enum ConfigFormat {
    /// TOML format
    Toml,
    /// JSON format
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_extension(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Configuration loader for the segmentation service
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file, auto-detecting the format from the extension.
    ///
    /// Environment overrides are applied after parsing and the result is validated.
    pub fn load_from_file(path: &Path) -> SegResult<SegConfig> {
        let format = ConfigFormat::from_extension(path).ok_or_else(|| {
            SegError::validation(format!(
                "Unsupported config file extension: {:?}",
                path.extension()
            ))
        })?;

        let content = std::fs::read_to_string(path).map_err(|e| {
            SegError::validation(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut config = Self::load_from_string(&content, format)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load defaults with environment overrides, validated.
    pub fn load_from_env() -> SegResult<SegConfig> {
        let mut config = SegConfig::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a string with specified format
    pub fn load_from_string(content: &str, format: ConfigFormat) -> SegResult<SegConfig> {
        match format {
            ConfigFormat::Toml => Self::load_from_toml(content),
            ConfigFormat::Json => Self::load_from_json(content),
        }
    }

    /// Load configuration from TOML string
    pub fn load_from_toml(content: &str) -> SegResult<SegConfig> {
        toml::from_str(content)
            .map_err(|e| SegError::validation(format!("Failed to parse TOML config: {e}")))
    }

    /// Load configuration from JSON string
    pub fn load_from_json(content: &str) -> SegResult<SegConfig> {
        serde_json::from_str(content)
            .map_err(|e| SegError::validation(format!("Failed to parse JSON config: {e}")))
    }

    /// Save configuration to TOML string
    pub fn save_to_toml(config: &SegConfig) -> SegResult<String> {
        toml::to_string_pretty(config)
            .map_err(|e| SegError::validation(format!("Failed to serialize config to TOML: {e}")))
    }

    /// Save configuration to JSON string
    pub fn save_to_json(config: &SegConfig) -> SegResult<String> {
        serde_json::to_string_pretty(config)
            .map_err(|e| SegError::validation(format!("Failed to serialize config to JSON: {e}")))
    }
}
