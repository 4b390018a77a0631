//! Error types for the segmentation pipeline.
//!
//! This module defines the errors that can occur while ingesting uploads,
//! running inference, persisting session artifacts, and rendering results.
//! It also provides constructor helpers that attach the context a caller needs
//! to log and respond meaningfully (session id, rejected extension, failing
//! batch index).

use thiserror::Error;

/// Enum representing different stages of processing in the segmentation pipeline.
///
/// This enum is used to identify which stage a processing error occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Error occurred while decoding an uploaded file.
    Decode,
    /// Error occurred during resizing.
    Resize,
    /// Error occurred during normalization.
    Normalization,
    /// Error occurred during post-processing.
    PostProcessing,
    /// Error occurred while rendering or encoding a visualization.
    Rendering,
    /// Error occurred while exporting results.
    Export,
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStage::Decode => write!(f, "decode"),
            ProcessingStage::Resize => write!(f, "resize"),
            ProcessingStage::Normalization => write!(f, "normalization"),
            ProcessingStage::PostProcessing => write!(f, "post-processing"),
            ProcessingStage::Rendering => write!(f, "rendering"),
            ProcessingStage::Export => write!(f, "export"),
        }
    }
}

/// Enum representing the errors surfaced by the segmentation core.
///
/// The first four variants form the public taxonomy that callers map to
/// responses (`NotFound`, `UnsupportedFormat`, `Inference`, `Validation`).
/// The remaining variants wrap lower-level failures with their source chain.
#[derive(Error, Debug)]
pub enum SegError {
    /// A session, its upload, or its results are absent.
    #[error("not found: {resource} for session '{session_id}'")]
    NotFound {
        /// The session that was looked up.
        session_id: String,
        /// What was missing (e.g. "session", "upload", "results").
        resource: String,
    },

    /// The upload has an unrecognized extension or unreadable contents.
    #[error("unsupported format '{extension}': {message}")]
    UnsupportedFormat {
        /// The rejected extension (lowercase, including the leading dot).
        extension: String,
        /// Why the file was rejected.
        message: String,
    },

    /// The predictor failed or returned malformed output.
    #[error("inference failed at batch {batch_index}: {context}")]
    Inference {
        /// Index of the batch that failed (0-based).
        batch_index: usize,
        /// Additional context about the failure.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An argument or configuration value is out of range or malformed.
    #[error("validation: {message}")]
    Validation {
        /// A message describing the invalid value.
        message: String,
    },

    /// A processing stage failed.
    #[error("{kind} failed: {context}")]
    Processing {
        /// The stage of processing where the error occurred.
        kind: ProcessingStage,
        /// Additional context about the error.
        context: String,
        /// The underlying error that caused this error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Persisted session artifacts could not be (de)serialized.
    #[error("serialization: {context}")]
    Serialization {
        /// What was being (de)serialized.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The model file could not be loaded.
    #[error("model load failed for '{path}': {reason}")]
    ModelLoad {
        /// Path to the model file.
        path: std::path::PathBuf,
        /// Reason for the failure.
        reason: String,
        /// The underlying error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Error from the ONNX Runtime session.
    #[error(transparent)]
    Session(#[from] ort::Error),

    /// Error from image encoding.
    #[error("image")]
    Image(#[from] image::ImageError),

    /// Error from tensor operations.
    #[error("tensor operation")]
    Tensor(#[from] ndarray::ShapeError),

    /// IO error.
    #[error("io")]
    Io(#[from] std::io::Error),
}

/// Convenient result alias for segmentation operations.
pub type SegResult<T> = Result<T, SegError>;

/// Lightweight error used as a `source` when no richer error exists.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SimpleError(String);

impl SimpleError {
    /// Creates a new simple error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl SegError {
    /// Creates a `NotFound` error for the given session and resource.
    pub fn not_found(session_id: impl Into<String>, resource: impl Into<String>) -> Self {
        Self::NotFound {
            session_id: session_id.into(),
            resource: resource.into(),
        }
    }

    /// Creates an `UnsupportedFormat` error carrying the rejected extension.
    pub fn unsupported_format(extension: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            extension: extension.into(),
            message: message.into(),
        }
    }

    /// Creates an `Inference` error for the batch that failed.
    ///
    /// # Arguments
    ///
    /// * `batch_index` - Index of the failing batch.
    /// * `context` - Additional context about the error.
    /// * `error` - The underlying error that caused this error.
    pub fn inference(
        batch_index: usize,
        context: impl Into<String>,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Inference {
            batch_index,
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates a `Validation` error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a `Validation` error for a field with an unexpected value.
    pub fn validation_error(component: &str, field: &str, expected: &str, actual: &str) -> Self {
        Self::Validation {
            message: format!(
                "{} field '{}' expected {}, but got '{}'",
                component, field, expected, actual
            ),
        }
    }

    /// Creates a `Processing` error for the given stage.
    pub fn processing(
        kind: ProcessingStage,
        context: impl Into<String>,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Processing {
            kind,
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates a `Serialization` error.
    pub fn serialization(
        context: impl Into<String>,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates a `ModelLoad` error.
    pub fn model_load(
        path: impl AsRef<std::path::Path>,
        reason: impl Into<String>,
        error: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::ModelLoad {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
            source: error,
        }
    }

    /// Returns `true` for errors caused by missing sessions or results.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<crate::core::config::ConfigError> for SegError {
    fn from(error: crate::core::config::ConfigError) -> Self {
        Self::Validation {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inference_error_carries_batch_index() {
        let err = SegError::inference(3, "forward pass", SimpleError::new("out of memory"));
        assert!(err.to_string().contains("batch 3"));
        match err {
            SegError::Inference { batch_index, .. } => assert_eq!(batch_index, 3),
            other => panic!("Expected Inference error, got {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_format_mentions_extension() {
        let err = SegError::unsupported_format(".bmp", "extension not recognized");
        assert!(err.to_string().contains(".bmp"));
    }

    #[test]
    fn test_not_found_predicate() {
        assert!(SegError::not_found("abc", "results").is_not_found());
        assert!(!SegError::validation("bad").is_not_found());
    }
}
