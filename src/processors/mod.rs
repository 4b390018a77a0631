//! Array processing stages of the segmentation pipeline.
//!
//! # Modules
//!
//! * `resize` - Bilinear and bicubic resampling of slices and logit planes
//! * `normalization` - Per-slice min-max normalization
//! * `preprocess` - Slice and volume preparation for the model input
//! * `postprocess` - Canonical depth-last storage layout
//! * `statistics` - Per-class pixel counts and percentages

pub mod normalization;
pub mod postprocess;
pub mod preprocess;
pub mod resize;
pub mod statistics;

pub use normalization::{finite_range, normalize_min_max, normalize_min_max_in_place, scale_to_u8};
pub use postprocess::{
    canonical_slice, display_base_image, display_base_volume, to_canonical_tensor,
    to_canonical_volume,
};
pub use preprocess::{Preprocessor, rotate_clockwise};
pub use resize::{BilinearLut, resize_bilinear, resize_planes_bilinear, upscale_bicubic};
pub use statistics::{ClassStatistic, class_statistics};
