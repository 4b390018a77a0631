//! Min-max intensity normalization.
//!
//! Slices are rescaled independently into `[0, 1]`. A slice whose finite values
//! are all equal (or that has no finite values) normalizes to all zeros, and
//! non-finite samples are mapped to zero.

use crate::core::batch::Tensor2D;
use ndarray::{Array2, ArrayView2, ArrayViewMut2};

/// Minimum and maximum over the finite values of a slice.
///
/// Returns `None` when the slice contains no finite value.
pub fn finite_range(slice: ArrayView2<'_, f32>) -> Option<(f32, f32)> {
    slice
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Rescales a slice into `[0, 1]` and returns a new array.
pub fn normalize_min_max(slice: ArrayView2<'_, f32>) -> Tensor2D {
    let mut out = slice.to_owned();
    normalize_min_max_in_place(out.view_mut());
    out
}

/// Rescales a slice into `[0, 1]` in place.
pub fn normalize_min_max_in_place(mut slice: ArrayViewMut2<'_, f32>) {
    match finite_range(slice.view()) {
        Some((lo, hi)) if hi > lo => {
            let inv = 1.0 / (hi - lo);
            slice.mapv_inplace(|v| {
                if v.is_finite() {
                    ((v - lo) * inv).clamp(0.0, 1.0)
                } else {
                    0.0
                }
            });
        }
        _ => slice.fill(0.0),
    }
}

/// Stretches a slice to the full `u8` range for display.
///
/// Fractions are truncated toward zero. Constant slices map to zero.
pub fn scale_to_u8(slice: ArrayView2<'_, f32>) -> Array2<u8> {
    match finite_range(slice) {
        Some((lo, hi)) if hi > lo => {
            let scale = 255.0 / (hi - lo);
            slice.mapv(|v| {
                if v.is_finite() {
                    ((v - lo) * scale).clamp(0.0, 255.0) as u8
                } else {
                    0
                }
            })
        }
        _ => Array2::zeros(slice.dim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_normalize_spans_unit_interval() {
        let slice = array![[10.0f32, 20.0], [30.0, 50.0]];
        let out = normalize_min_max(slice.view());
        assert_eq!(out[[0, 0]], 0.0);
        assert_eq!(out[[1, 1]], 1.0);
        assert!((out[[0, 1]] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_constant_slice_becomes_zeros() {
        let slice = Array2::from_elem((10, 10), 128.0f32);
        let out = normalize_min_max(slice.view());
        assert!(out.iter().all(|&v| v == 0.0));
        assert!(scale_to_u8(slice.view()).iter().all(|&v| v == 0));
    }

    #[test]
    fn test_non_finite_values_are_ignored() {
        let slice = array![[f32::NAN, 0.0], [2.0, f32::INFINITY]];
        assert_eq!(finite_range(slice.view()), Some((0.0, 2.0)));
        let out = normalize_min_max(slice.view());
        assert_eq!(out[[0, 0]], 0.0);
        assert_eq!(out[[1, 0]], 1.0);
        assert_eq!(out[[1, 1]], 0.0);

        let all_nan = Array2::from_elem((2, 2), f32::NAN);
        assert_eq!(finite_range(all_nan.view()), None);
        assert!(normalize_min_max(all_nan.view()).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_scale_to_u8_truncates() {
        let slice = array![[0.0f32, 1.0, 3.0]];
        let out = scale_to_u8(slice.view());
        assert_eq!(out, array![[0u8, 85, 255]]);
    }
}
