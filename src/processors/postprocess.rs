//! Conversion of inference output into the canonical storage layout.
//!
//! Volumes are stored depth-last, (H, W, D), so every consumer can take slice
//! `k` as `[.., .., k]`. Planar images keep their (H, W) shape.

use crate::core::batch::{LabelMap3D, Tensor2D, Tensor3D};
use crate::core::errors::{SegError, SegResult};
use crate::processors::resize::upscale_bicubic;
use ndarray::{Array3, ArrayBase, ArrayView2, ArrayView3, Axis, Data, Ix3};

/// Reorders a (D, H, W) prediction stack into (H, W, D).
pub fn to_canonical_volume(stack: LabelMap3D) -> LabelMap3D {
    stack
        .permuted_axes([1, 2, 0])
        .as_standard_layout()
        .into_owned()
}

/// Reorders a (D, H, W) float stack into (H, W, D).
pub fn to_canonical_tensor(stack: Tensor3D) -> Tensor3D {
    stack
        .permuted_axes([1, 2, 0])
        .as_standard_layout()
        .into_owned()
}

/// Takes depth slice `index` of a canonical (H, W, D) array.
///
/// # Errors
///
/// Returns a validation error when `index` is outside `[0, D)`.
pub fn canonical_slice<S, A>(volume: &ArrayBase<S, Ix3>, index: usize) -> SegResult<ArrayView2<'_, A>>
where
    S: Data<Elem = A>,
{
    let depth = volume.len_of(Axis(2));
    if index >= depth {
        return Err(SegError::validation(format!(
            "slice index {} out of range [0, {})",
            index, depth
        )));
    }
    Ok(volume.index_axis(Axis(2), index))
}

/// Upscales each normalized (D, h, w) slice to the display shape for use as an
/// overlay base, returning the canonical (H, W, D) layout.
///
/// With no display shape the slices are only reordered.
pub fn display_base_volume(
    stack: ArrayView3<'_, f32>,
    display: Option<(usize, usize)>,
) -> SegResult<Tensor3D> {
    let Some(shape) = display else {
        return Ok(to_canonical_tensor(stack.to_owned()));
    };
    let mut out = Array3::zeros((stack.len_of(Axis(0)), shape.0, shape.1));
    for (slice, mut dst) in stack.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
        dst.assign(&upscale_bicubic(slice, shape)?);
    }
    Ok(to_canonical_tensor(out))
}

/// Upscales a single normalized slice to the display shape.
pub fn display_base_image(
    slice: ArrayView2<'_, f32>,
    display: Option<(usize, usize)>,
) -> SegResult<Tensor2D> {
    match display {
        Some(shape) => upscale_bicubic(slice, shape),
        None => Ok(slice.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_layout_moves_depth_last() {
        let stack = LabelMap3D::from_shape_fn((3, 2, 4), |(d, _, _)| d as u8);
        let canonical = to_canonical_volume(stack);
        assert_eq!(canonical.dim(), (2, 4, 3));
        for k in 0..3 {
            let slice = canonical_slice(&canonical, k).unwrap();
            assert!(slice.iter().all(|&v| v == k as u8));
        }
        assert!(canonical.is_standard_layout());
    }

    #[test]
    fn test_canonical_slice_out_of_range() {
        let volume = LabelMap3D::zeros((2, 2, 3));
        assert!(canonical_slice(&volume, 3).is_err());
        assert!(canonical_slice(&volume, 2).is_ok());
    }

    #[test]
    fn test_display_base_volume_shape() {
        let stack = Tensor3D::from_elem((2, 4, 4), 0.5);
        let out = display_base_volume(stack.view(), Some((8, 8))).unwrap();
        assert_eq!(out.dim(), (8, 8, 2));
        let out = display_base_volume(stack.view(), None).unwrap();
        assert_eq!(out.dim(), (4, 4, 2));
    }
}
