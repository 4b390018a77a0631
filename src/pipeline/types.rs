//! Result types returned by the segmentation service.

use crate::core::errors::SegError;
use crate::domain::source::SourceKind;
use crate::processors::statistics::ClassStatistic;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Description of an accepted upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileInfo {
    pub filename: String,
    pub kind: SourceKind,
    pub dimensions: Vec<usize>,
    pub num_slices: usize,
}

/// Result of [`upload`](super::SegmentationService::upload).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadSummary {
    pub session_id: String,
    pub file_info: FileInfo,
}

/// Result of [`segment`](super::SegmentationService::segment).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentationSummary {
    pub session_id: String,
    pub kind: SourceKind,
    pub num_slices_processed: usize,
    /// Statistics over the whole prediction.
    pub statistics: Vec<ClassStatistic>,
    /// Wall time of preprocessing, inference and postprocessing.
    pub processing_time_ms: f64,
}

/// Rendered view of one slice of a segmentation result.
///
/// Images are `data:image/png;base64,...` URIs. The original and overlay
/// images are absent when no overlay base was stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SliceView {
    pub session_id: String,
    pub slice_index: usize,
    pub total_slices: usize,
    pub kind: SourceKind,
    pub original_image: Option<String>,
    pub segmentation_mask: String,
    pub overlay_image: Option<String>,
    pub statistics: Vec<ClassStatistic>,
}

/// Export encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Gzip-compressed NIfTI-1 label volume.
    Nifti,
    /// Colorized PNG of one slice.
    Png,
}

impl FromStr for ExportFormat {
    type Err = SegError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nifti" | "nii" => Ok(ExportFormat::Nifti),
            "png" => Ok(ExportFormat::Png),
            other => Err(SegError::validation_error(
                "export",
                "format",
                "one of nifti, png",
                other,
            )),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Nifti => write!(f, "nifti"),
            ExportFormat::Png => write!(f, "png"),
        }
    }
}

/// An exported file.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    pub bytes: Vec<u8>,
    pub media_type: &'static str,
    pub file_name: String,
}

/// Service liveness summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub model_loaded: bool,
    pub session_count: usize,
}
