//! Source records and session metadata.

use crate::core::errors::{SegError, SegResult};
use ndarray::{ArrayD, ArrayView2, ArrayView3, Ix2, Ix3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of an uploaded source, persisted as an explicit tag with results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Rank-3 volumetric scan (H, W, D).
    Volume,
    /// Rank-2 planar image (H, W).
    Image,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Volume => write!(f, "volume"),
            SourceKind::Image => write!(f, "image"),
        }
    }
}

/// Row-major 4×4 voxel-to-world transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialTransform(pub [[f64; 4]; 4]);

impl SpatialTransform {
    /// The identity transform.
    pub fn identity() -> Self {
        let mut m = [[0.0; 4]; 4];
        for (i, row) in m.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        Self(m)
    }

    /// Row `r` of the matrix.
    pub fn row(&self, r: usize) -> [f64; 4] {
        self.0[r]
    }

    /// Euclidean length of column `c` of the 3×3 linear part.
    pub fn column_norm(&self, c: usize) -> f64 {
        (0..3).map(|r| self.0[r][c] * self.0[r][c]).sum::<f64>().sqrt()
    }
}

impl Default for SpatialTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// A decoded upload.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    /// Source kind.
    pub kind: SourceKind,
    /// Voxel or pixel data, (H, W, D) for volumes and (H, W) for images.
    pub raw_data: ArrayD<f32>,
    /// Native shape of `raw_data`.
    pub dimensions: Vec<usize>,
    /// Number of depth slices (1 for images).
    pub num_slices: usize,
    /// Native spatial transform, volumes only.
    pub spatial_transform: Option<SpatialTransform>,
    /// Upload file name.
    pub filename: String,
}

impl SourceRecord {
    /// Views the data as a volume.
    pub fn as_volume(&self) -> SegResult<ArrayView3<'_, f32>> {
        self.raw_data
            .view()
            .into_dimensionality::<Ix3>()
            .map_err(SegError::Tensor)
    }

    /// Views the data as a planar image.
    pub fn as_image(&self) -> SegResult<ArrayView2<'_, f32>> {
        self.raw_data
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(SegError::Tensor)
    }

    /// Metadata persisted alongside results.
    pub fn metadata(&self) -> SessionMetadata {
        SessionMetadata {
            kind: self.kind,
            dimensions: self.dimensions.clone(),
            num_slices: self.num_slices,
            spatial_transform: self.spatial_transform,
            filename: self.filename.clone(),
        }
    }
}

/// Metadata stored with results so later reads never need the upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Explicit source kind; downstream dispatch uses this, never array rank.
    pub kind: SourceKind,
    /// Native source dimensions.
    pub dimensions: Vec<usize>,
    /// Number of slices in the source.
    pub num_slices: usize,
    /// Native spatial transform, if the source had one.
    pub spatial_transform: Option<SpatialTransform>,
    /// Upload file name.
    pub filename: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn test_identity_transform() {
        let t = SpatialTransform::identity();
        assert_eq!(t.row(0), [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(t.row(3), [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(t.column_norm(2), 1.0);
    }

    #[test]
    fn test_record_views_follow_rank() {
        let record = SourceRecord {
            kind: SourceKind::Volume,
            raw_data: ArrayD::zeros(IxDyn(&[4, 5, 3])),
            dimensions: vec![4, 5, 3],
            num_slices: 3,
            spatial_transform: Some(SpatialTransform::identity()),
            filename: "scan.nii".to_string(),
        };
        assert_eq!(record.as_volume().unwrap().dim(), (4, 5, 3));
        assert!(record.as_image().is_err());

        let metadata = record.metadata();
        assert_eq!(metadata.kind, SourceKind::Volume);
        assert_eq!(metadata.num_slices, 3);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(SourceKind::Volume.to_string(), "volume");
        assert_eq!(SourceKind::Image.to_string(), "image");
    }
}
