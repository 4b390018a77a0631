//! # OAR Seg
//!
//! A Rust library that segments 2D images and NIfTI volumes with ONNX models and
//! keeps per-session artifacts on disk.
//!
//! ## Features
//!
//! - Upload validation for `.nii`, `.nii.gz`, `.png`, `.jpg` and `.jpeg`
//! - Per-slice resize and min-max normalization with parallel volume processing
//! - Batched inference with a lazily loaded, shared ONNX Runtime session
//! - Per-class pixel statistics
//! - Colorized masks, overlays and data-URI rendering
//! - NIfTI-1 and PNG export
//! - Session store with atomic result writes and time-based expiry
//!
//! ## Modules
//!
//! * [`core`] - Configuration, errors, batching and inference
//! * [`domain`] - Class registry and source records
//! * [`processors`] - Resampling, normalization, layout and statistics
//! * [`utils`] - File codecs, rendering and logging setup
//! * [`session`] - Session persistence and cleanup
//! * [`pipeline`] - The segmentation service
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use oar_seg::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SegConfig::default()
//!     .with_model_path("models/orbital.onnx")
//!     .with_storage_dir("/var/lib/oar-seg");
//! let service = SegmentationService::from_config(config)?;
//!
//! let upload = service.upload_path(std::path::Path::new("scan.nii.gz"))?;
//! let summary = service.segment(&upload.session_id)?;
//! for stat in &summary.statistics {
//!     println!("{}: {:.2}%", stat.class_name, stat.percentage);
//! }
//!
//! let nifti = service.export(&upload.session_id, ExportFormat::Nifti, None)?;
//! std::fs::write(&nifti.file_name, &nifti.bytes)?;
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod core;
pub mod domain;

pub mod pipeline;
pub mod processors;
pub mod session;
pub mod utils;

/// Prelude module for convenient imports.
///
/// ```rust
/// use oar_seg::prelude::*;
/// ```
///
/// For predictor implementations and lower-level processing, import directly
/// from `oar_seg::core::inference` or `oar_seg::processors`.
pub mod prelude {
    pub use crate::core::{ConfigLoader, SegConfig, SegError, SegResult, init_tracing};
    pub use crate::domain::{ClassInfo, ClassRegistry, SourceKind};
    pub use crate::pipeline::{
        ExportArtifact, ExportFormat, SegmentationService, SegmentationSummary, SliceView,
        UploadSummary,
    };
    pub use crate::session::{CleanupHandle, SessionStore};
}
