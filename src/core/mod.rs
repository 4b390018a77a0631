//! The core module of the segmentation pipeline.
//!
//! This module contains the fundamental components of the pipeline, including:
//! - Batch tensor aliases and slice batching
//! - Configuration management
//! - Constants used throughout the pipeline
//! - Error handling
//! - Lazy predictor loading and batched inference
//!
//! It also provides re-exports of commonly used types and functions for convenience.

pub mod batch;
pub mod config;
pub mod constants;
pub mod errors;
pub mod inference;

pub use crate::utils::init_tracing;
pub use batch::{BatchSampler, LabelMap2D, LabelMap3D, Tensor2D, Tensor3D, Tensor4D};
pub use config::{ConfigError, ConfigLoader, ConfigValidator, OrtSessionConfig, SegConfig};
pub use constants::*;
pub use errors::{ProcessingStage, SegError, SegResult};
pub use inference::{
    InferenceEngine, OrtPredictor, PredictorHandle, SegmentationPredictor, argmax_classes,
};
