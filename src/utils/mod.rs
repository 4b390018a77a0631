//! Utility functions for the segmentation pipeline.
//!
//! File format codecs, image conversion, rendering helpers and logging setup.

pub mod image;
pub mod loader;
pub mod nifti;
pub mod visualization;

pub use image::{array_to_gray_image, decode_grayscale, dynamic_to_gray_f32, gray_to_rgb};
pub use loader::{
    UploadFormat, classify_extension, extension_of, load_source, load_source_file,
};
pub use nifti::{NiftiVolume, is_gzip, read_nifti, write_nifti_labels};
pub use visualization::{
    EncodeFormat, colorize, encode_data_uri, encode_gray_data_uri, encode_image,
    encode_rgb_data_uri, normalize_for_display, overlay,
};

/// Initializes the tracing subscriber for logging.
///
/// The filter is read from `RUST_LOG` and defaults to `info` when the variable
/// is unset or invalid. Calling this more than once is harmless.
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init();
}
