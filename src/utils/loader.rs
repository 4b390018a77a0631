//! Upload classification and parsing.
//!
//! The file extension decides the parser: `.nii` and `.nii.gz` are read as
//! volumes, `.png`, `.jpg` and `.jpeg` as planar images. Any parse failure is
//! reported as [`SegError::UnsupportedFormat`] carrying the extension.

use crate::core::errors::{SegError, SegResult};
use crate::domain::source::{SourceKind, SourceRecord};
use crate::utils::image::decode_grayscale;
use crate::utils::nifti::read_nifti;
use ndarray::Axis;
use std::fmt;
use std::path::Path;

/// Recognized upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFormat {
    /// `.nii`
    Nifti,
    /// `.nii.gz`
    NiftiGz,
    /// `.png`
    Png,
    /// `.jpg` or `.jpeg`
    Jpeg,
}

impl UploadFormat {
    /// Canonical extension, including the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            UploadFormat::Nifti => ".nii",
            UploadFormat::NiftiGz => ".nii.gz",
            UploadFormat::Png => ".png",
            UploadFormat::Jpeg => ".jpg",
        }
    }

    /// Kind of record the format decodes into.
    pub fn source_kind(&self) -> SourceKind {
        match self {
            UploadFormat::Nifti | UploadFormat::NiftiGz => SourceKind::Volume,
            UploadFormat::Png | UploadFormat::Jpeg => SourceKind::Image,
        }
    }
}

impl fmt::Display for UploadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Lower-cased extension of a file name, treating `.nii.gz` as one extension.
///
/// Returns an empty string when the name has no dot.
pub fn extension_of(filename: &str) -> String {
    let lower = filename.to_lowercase();
    if lower.ends_with(".nii.gz") {
        return ".nii.gz".to_string();
    }
    match lower.rfind('.') {
        Some(pos) => lower[pos..].to_string(),
        None => String::new(),
    }
}

/// Classifies a file name by extension.
///
/// # Errors
///
/// Returns [`SegError::UnsupportedFormat`] for any other extension.
pub fn classify_extension(filename: &str) -> SegResult<UploadFormat> {
    let extension = extension_of(filename);
    match extension.as_str() {
        ".nii" => Ok(UploadFormat::Nifti),
        ".nii.gz" => Ok(UploadFormat::NiftiGz),
        ".png" => Ok(UploadFormat::Png),
        ".jpg" | ".jpeg" => Ok(UploadFormat::Jpeg),
        _ => Err(SegError::unsupported_format(
            extension,
            "allowed extensions are .nii, .nii.gz, .png, .jpg, .jpeg",
        )),
    }
}

/// Parses upload bytes into a source record.
pub fn load_source(bytes: &[u8], filename: &str) -> SegResult<SourceRecord> {
    let format = classify_extension(filename)?;
    let record = match format.source_kind() {
        SourceKind::Volume => {
            let volume = read_nifti(bytes).map_err(|e| reclassify(e, format))?;
            let data = volume.data;
            let num_slices = data.len_of(Axis(2));
            SourceRecord {
                kind: SourceKind::Volume,
                dimensions: data.shape().to_vec(),
                raw_data: data.into_dyn(),
                num_slices,
                spatial_transform: volume.transform,
                filename: filename.to_string(),
            }
        }
        SourceKind::Image => {
            let data = decode_grayscale(bytes).map_err(|e| reclassify(e, format))?;
            SourceRecord {
                kind: SourceKind::Image,
                dimensions: data.shape().to_vec(),
                raw_data: data.into_dyn(),
                num_slices: 1,
                spatial_transform: None,
                filename: filename.to_string(),
            }
        }
    };
    tracing::debug!(
        "loaded {} '{}' with dimensions {:?}",
        record.kind,
        filename,
        record.dimensions
    );
    Ok(record)
}

/// Reads and parses an upload stored on disk.
pub fn load_source_file(path: &Path) -> SegResult<SourceRecord> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| SegError::validation(format!("invalid file name: {}", path.display())))?;
    let bytes = std::fs::read(path)?;
    load_source(&bytes, filename)
}

fn reclassify(error: SegError, format: UploadFormat) -> SegError {
    match error {
        SegError::UnsupportedFormat { message, .. } => {
            SegError::unsupported_format(format.extension(), message)
        }
        other => SegError::unsupported_format(
            format.extension(),
            format!("failed to parse file: {}", other),
        ),
    }
}
