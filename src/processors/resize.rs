//! Resampling kernels for slices and logit planes.
//!
//! Bilinear resampling uses half-pixel centers (`align_corners = false`), the
//! convention shared by the model's training pipeline for both input slices and
//! logit upscaling. Display upscaling of normalized slices uses a bicubic
//! (Catmull-Rom) filter from the `image` crate.

use crate::core::batch::{Tensor2D, Tensor3D};
use crate::core::errors::{ProcessingStage, SegError, SegResult, SimpleError};
use image::{ImageBuffer, Luma, imageops};
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};
use rayon::prelude::*;

/// Precomputed source coordinates and weights for one resize geometry.
///
/// Building the table once lets every plane of a logit stack share it.
#[derive(Debug, Clone)]
pub struct BilinearLut {
    in_shape: (usize, usize),
    out_shape: (usize, usize),
    y: Vec<(usize, usize, f32, f32)>,
    x: Vec<(usize, usize, f32, f32)>,
}

impl BilinearLut {
    /// Builds the lookup table for resizing `in_shape` to `out_shape` (height, width).
    pub fn new(in_shape: (usize, usize), out_shape: (usize, usize)) -> Self {
        Self {
            in_shape,
            out_shape,
            y: axis_lut(in_shape.0, out_shape.0),
            x: axis_lut(in_shape.1, out_shape.1),
        }
    }

    /// Output shape as (height, width).
    pub fn out_shape(&self) -> (usize, usize) {
        self.out_shape
    }

    /// Resamples one plane into a freshly allocated array.
    pub fn apply(&self, src: ArrayView2<'_, f32>) -> Tensor2D {
        let (out_h, out_w) = self.out_shape;
        if src.dim() != self.in_shape || out_h == 0 || out_w == 0 {
            return Array2::zeros((out_h, out_w));
        }

        let mut out = vec![0f32; out_h * out_w];
        out.par_chunks_mut(out_w).enumerate().for_each(|(oy, row)| {
            let (y0, y1, wy0, wy1) = self.y[oy];
            for (ox, value) in row.iter_mut().enumerate() {
                let (x0, x1, wx0, wx1) = self.x[ox];
                *value = src[[y0, x0]] * wy0 * wx0
                    + src[[y0, x1]] * wy0 * wx1
                    + src[[y1, x0]] * wy1 * wx0
                    + src[[y1, x1]] * wy1 * wx1;
            }
        });

        // Length is out_h * out_w by construction.
        Array2::from_shape_vec((out_h, out_w), out).unwrap_or_else(|_| Array2::zeros((out_h, out_w)))
    }
}

fn axis_lut(in_len: usize, out_len: usize) -> Vec<(usize, usize, f32, f32)> {
    if in_len == 0 {
        return vec![(0, 0, 0.0, 0.0); out_len];
    }
    let scale = in_len as f32 / out_len.max(1) as f32;
    (0..out_len)
        .map(|o| {
            let pos = ((o as f32) + 0.5) * scale - 0.5;
            let pos = pos.clamp(0.0, (in_len - 1) as f32);
            let i0 = pos.floor() as usize;
            let i1 = (i0 + 1).min(in_len - 1);
            let w1 = pos - (i0 as f32);
            (i0, i1, 1.0 - w1, w1)
        })
        .collect()
}

/// Resizes a single plane with bilinear interpolation.
///
/// Returns a copy when the shape already matches.
pub fn resize_bilinear(src: ArrayView2<'_, f32>, out_shape: (usize, usize)) -> Tensor2D {
    if src.dim() == out_shape {
        return src.to_owned();
    }
    BilinearLut::new(src.dim(), out_shape).apply(src)
}

/// Resizes every plane of a (C, H, W) stack with bilinear interpolation.
pub fn resize_planes_bilinear(src: ArrayView3<'_, f32>, out_shape: (usize, usize)) -> Tensor3D {
    let (channels, in_h, in_w) = src.dim();
    if (in_h, in_w) == out_shape {
        return src.to_owned();
    }
    let lut = BilinearLut::new((in_h, in_w), out_shape);
    let mut out = Array3::zeros((channels, out_shape.0, out_shape.1));
    for (plane, mut dst) in src.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
        dst.assign(&lut.apply(plane));
    }
    out
}

/// Upscales a normalized slice for display with a bicubic filter.
///
/// Values are expected in `[0, 1]`; the filter output is clamped to that range.
pub fn upscale_bicubic(src: ArrayView2<'_, f32>, out_shape: (usize, usize)) -> SegResult<Tensor2D> {
    let (in_h, in_w) = src.dim();
    if (in_h, in_w) == out_shape {
        return Ok(src.to_owned());
    }
    let buffer: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_raw(in_w as u32, in_h as u32, src.iter().copied().collect())
            .ok_or_else(|| {
                SegError::processing(
                    ProcessingStage::Resize,
                    format!("cannot wrap {}x{} slice as an image buffer", in_h, in_w),
                    SimpleError::new("buffer length mismatch"),
                )
            })?;

    let resized = imageops::resize(
        &buffer,
        out_shape.1 as u32,
        out_shape.0 as u32,
        imageops::FilterType::CatmullRom,
    );
    Ok(Array2::from_shape_vec(out_shape, resized.into_raw())?)
}
