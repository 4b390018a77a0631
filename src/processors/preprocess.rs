//! Slice and volume preprocessing.
//!
//! Every slice is resized to the model input resolution and min-max normalized
//! on its own. Volumes are first rotated a quarter turn clockwise in the plane
//! of their first two axes, then sliced along depth and stacked as (D, H, W).

use crate::core::batch::{Tensor2D, Tensor3D};
use crate::core::errors::{SegError, SegResult};
use crate::processors::normalization::normalize_min_max_in_place;
use crate::processors::resize::resize_bilinear;
use ndarray::{ArrayView2, ArrayView3, Axis, s};
use rayon::prelude::*;

/// Rotates an (H, W, D) volume a quarter turn clockwise in the H/W plane.
///
/// The result is a view with shape (W, H, D); no data is copied.
pub fn rotate_clockwise(volume: ArrayView3<'_, f32>) -> ArrayView3<'_, f32> {
    volume.slice_move(s![..;-1, .., ..]).permuted_axes([1, 0, 2])
}

/// Resizes and normalizes slices to the model's input resolution.
#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
    target: (usize, usize),
}

impl Preprocessor {
    /// Creates a preprocessor producing `(height, width)` slices.
    pub fn new(target: (usize, usize)) -> Self {
        Self { target }
    }

    /// Target slice shape as (height, width).
    pub fn target(&self) -> (usize, usize) {
        self.target
    }

    /// Resizes a slice when needed, then rescales it into `[0, 1]`.
    pub fn preprocess_slice(&self, slice: ArrayView2<'_, f32>) -> Tensor2D {
        let mut out = resize_bilinear(slice, self.target);
        normalize_min_max_in_place(out.view_mut());
        out
    }

    /// Preprocesses a planar image into a single-slice (1, H, W) stack.
    pub fn preprocess_image(&self, image: ArrayView2<'_, f32>) -> SegResult<Tensor3D> {
        check_non_empty(image.dim().0 * image.dim().1, "image")?;
        Ok(self.preprocess_slice(image).insert_axis(Axis(0)))
    }

    /// Preprocesses an (H, W, D) volume into a (D, H, W) stack.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the volume has no voxels.
    pub fn preprocess_volume(&self, volume: ArrayView3<'_, f32>) -> SegResult<Tensor3D> {
        check_non_empty(volume.len(), "volume")?;
        let rotated = rotate_clockwise(volume);
        let depth = rotated.len_of(Axis(2));

        let slices: Vec<Tensor2D> = (0..depth)
            .into_par_iter()
            .map(|k| self.preprocess_slice(rotated.index_axis(Axis(2), k)))
            .collect();
        let views: Vec<ArrayView2<'_, f32>> = slices.iter().map(|s| s.view()).collect();

        tracing::debug!(
            "preprocessed {} slices from {:?} to {:?}",
            depth,
            volume.dim(),
            self.target
        );
        Ok(ndarray::stack(Axis(0), &views)?)
    }
}

fn check_non_empty(len: usize, what: &str) -> SegResult<()> {
    if len == 0 {
        return Err(SegError::validation(format!("{} has no samples", what)));
    }
    Ok(())
}
