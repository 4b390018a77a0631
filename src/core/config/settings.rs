//! Top-level settings for the segmentation service.

use super::errors::{ConfigError, ConfigValidator};
use super::onnx::OrtSessionConfig;
use crate::core::constants::*;
use crate::domain::classes::{ClassInfo, ClassRegistry};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Settings for model geometry, batching, storage, and retention.
///
/// Every field has a default, so partial TOML/JSON files are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegConfig {
    /// Path to the ONNX segmentation model.
    pub model_path: Option<PathBuf>,
    /// Number of classes the model predicts.
    pub num_classes: usize,
    /// Square input resolution expected by the model.
    pub input_size: usize,
    /// Square display resolution; `None` keeps the model's native output size.
    pub display_size: Option<usize>,
    /// Slices per forward pass.
    pub batch_size: usize,
    /// Root directory holding one sub-directory per session.
    pub storage_dir: PathBuf,
    /// Maximum accepted upload size in megabytes.
    pub max_upload_mb: u64,
    /// Sessions untouched for longer than this are swept.
    pub retention_secs: u64,
    /// Interval between background sweeps.
    pub sweep_interval_secs: u64,
    /// Default overlay blend factor.
    pub overlay_alpha: f32,
    /// ONNX Runtime session settings.
    pub ort: OrtSessionConfig,
    /// Optional replacement for the built-in class table.
    pub classes: Option<Vec<ClassInfo>>,
}

impl Default for SegConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            num_classes: DEFAULT_NUM_CLASSES,
            input_size: DEFAULT_INPUT_SIZE,
            display_size: Some(DEFAULT_DISPLAY_SIZE),
            batch_size: DEFAULT_BATCH_SIZE,
            storage_dir: std::env::temp_dir().join("oar-seg"),
            max_upload_mb: DEFAULT_MAX_UPLOAD_MB,
            retention_secs: DEFAULT_RETENTION_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            overlay_alpha: DEFAULT_OVERLAY_ALPHA,
            ort: OrtSessionConfig::default(),
            classes: None,
        }
    }
}

impl SegConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the model path.
    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    /// Sets the storage directory.
    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = dir.into();
        self
    }

    /// Sets the model input size.
    pub fn with_input_size(mut self, size: usize) -> Self {
        self.input_size = size;
        self
    }

    /// Sets the display size.
    pub fn with_display_size(mut self, size: Option<usize>) -> Self {
        self.display_size = size;
        self
    }

    /// Sets the inference batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the number of classes.
    pub fn with_num_classes(mut self, num_classes: usize) -> Self {
        self.num_classes = num_classes;
        self
    }

    /// Model input resolution as (height, width).
    pub fn input_shape(&self) -> (usize, usize) {
        (self.input_size, self.input_size)
    }

    /// Display resolution as (height, width), if upscaling is enabled.
    pub fn display_shape(&self) -> Option<(usize, usize)> {
        self.display_size.map(|s| (s, s))
    }

    /// Session retention window.
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    /// Interval between background sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Upload size limit in bytes.
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    /// Builds the class registry, using the override table when present.
    pub fn class_registry(&self) -> Result<ClassRegistry, ConfigError> {
        match &self.classes {
            Some(classes) => ClassRegistry::new(classes.clone()),
            None => Ok(ClassRegistry::default()),
        }
    }

    /// Applies `OAR_SEG_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(std::env::vars())
    }

    /// Applies `OAR_SEG_*` overrides from the given key/value pairs.
    ///
    /// Unknown keys are ignored; malformed values are rejected.
    pub fn apply_overrides_from<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "MODEL_PATH" => self.model_path = Some(PathBuf::from(value)),
                "STORAGE_DIR" => self.storage_dir = PathBuf::from(value),
                "NUM_CLASSES" => self.num_classes = parse_env(&key, &value)?,
                "INPUT_SIZE" => self.input_size = parse_env(&key, &value)?,
                "DISPLAY_SIZE" => {
                    self.display_size = match value.trim() {
                        "" | "none" | "off" => None,
                        v => Some(parse_env(&key, v)?),
                    }
                }
                "BATCH_SIZE" => self.batch_size = parse_env(&key, &value)?,
                "MAX_UPLOAD_MB" => self.max_upload_mb = parse_env(&key, &value)?,
                "RETENTION_SECS" => self.retention_secs = parse_env(&key, &value)?,
                "SWEEP_INTERVAL_SECS" => self.sweep_interval_secs = parse_env(&key, &value)?,
                "OVERLAY_ALPHA" => self.overlay_alpha = parse_env(&key, &value)?,
                "INTRA_THREADS" => self.ort.intra_threads = Some(parse_env(&key, &value)?),
                _ => {}
            }
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidConfig {
            message: format!("environment variable {} has malformed value '{}'", key, value),
        })
}

impl ConfigValidator for SegConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.validate_positive("input_size", self.input_size)?;
        if let Some(display) = self.display_size {
            self.validate_positive("display_size", display)?;
        }
        self.validate_batch_size_with_limits(self.batch_size, MAX_BATCH_SIZE)?;
        if self.num_classes == 0 || self.num_classes > usize::from(u8::MAX) + 1 {
            return Err(ConfigError::InvalidConfig {
                message: format!(
                    "num_classes must be between 1 and 256, got {}",
                    self.num_classes
                ),
            });
        }
        if self.max_upload_mb == 0 {
            return Err(ConfigError::InvalidConfig {
                message: "max_upload_mb must be greater than 0".to_string(),
            });
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidConfig {
                message: "sweep_interval_secs must be greater than 0".to_string(),
            });
        }
        self.validate_unit_interval("overlay_alpha", self.overlay_alpha)?;
        if let Some(path) = &self.model_path {
            self.validate_model_path(path)?;
        }
        self.class_registry()?;
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}
