//! The segmentation service.
//!
//! [`SegmentationService`] ties the session store, preprocessing, batched
//! inference and rendering together:
//!
//! 1. `upload` validates and parses a file into a new session
//! 2. `segment` predicts every slice and persists the label map
//! 3. `slice_view` renders one slice as mask, original and overlay
//! 4. `export` writes the label map as NIfTI or a colorized PNG

pub mod service;
pub mod types;

pub use service::SegmentationService;
pub use types::{
    ExportArtifact, ExportFormat, FileInfo, HealthStatus, SegmentationSummary, SliceView,
    UploadSummary,
};
