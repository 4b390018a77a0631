//! Configuration management for the segmentation service.
//!
//! This module provides configuration types, validation traits, and file
//! loading utilities.

pub mod errors;
pub mod loader;
pub mod onnx;
pub mod settings;

pub use errors::{ConfigError, ConfigValidator};
pub use loader::{ConfigFormat, ConfigLoader};
pub use onnx::{OrtExecutionProvider, OrtGraphOptimizationLevel, OrtSessionConfig};
pub use settings::SegConfig;
