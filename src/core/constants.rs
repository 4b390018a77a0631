//! Constants used throughout the segmentation pipeline.
//!
//! Default values for model geometry, batching, upload limits, and session
//! retention. Every value here can be overridden through `SegConfig`.

/// The default number of segmentation classes (orbital MRI registry).
pub const DEFAULT_NUM_CLASSES: usize = 10;

/// Upper bound on class count; class maps are stored as `u8`.
pub const MAX_CLASSES: usize = 256;

/// The default square input resolution expected by the model.
pub const DEFAULT_INPUT_SIZE: usize = 256;

/// The default square resolution at which predictions are rendered and stored.
///
/// Logits are upscaled to this size before the per-pixel class decision.
pub const DEFAULT_DISPLAY_SIZE: usize = 512;

/// The default number of slices sent to the predictor per forward pass.
pub const DEFAULT_BATCH_SIZE: usize = 8;

/// The maximum batch size accepted by configuration validation.
pub const MAX_BATCH_SIZE: usize = 256;

/// The default upload size limit in megabytes.
pub const DEFAULT_MAX_UPLOAD_MB: u64 = 100;

/// The default session retention window in seconds.
pub const DEFAULT_RETENTION_SECS: u64 = 3600;

/// The default interval between expiry sweeps in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;

/// The default blend factor used when compositing overlays.
pub const DEFAULT_OVERLAY_ALPHA: f32 = 0.5;

/// Color used for class ids that have no registry entry.
pub const FALLBACK_CLASS_COLOR: [u8; 3] = [128, 128, 128];

/// Upload extensions accepted by the format loader.
pub const ALLOWED_EXTENSIONS: [&str; 5] = [".nii", ".nii.gz", ".png", ".jpg", ".jpeg"];

/// Prefix for environment variable overrides of `SegConfig`.
pub const ENV_PREFIX: &str = "OAR_SEG_";
