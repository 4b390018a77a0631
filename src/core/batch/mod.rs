//! Batch processing utilities.
//!
//! Tensor aliases shared by the preprocessing and inference stages, and a
//! sampler that splits a slice stack into bounded, ordered batches.

use std::ops::Range;

/// A 2-dimensional tensor represented as a 2D array of f32 values.
pub type Tensor2D = ndarray::Array2<f32>;

/// A 3-dimensional tensor represented as a 3D array of f32 values.
pub type Tensor3D = ndarray::Array3<f32>;

/// A 4-dimensional tensor represented as a 4D array of f32 values.
pub type Tensor4D = ndarray::Array4<f32>;

/// A 2D class-index map.
pub type LabelMap2D = ndarray::Array2<u8>;

/// A 3D class-index volume.
pub type LabelMap3D = ndarray::Array3<u8>;

/// A sampler that divides a slice stack into batches of a fixed size.
///
/// Batches are contiguous, cover every index exactly once, and are yielded in
/// ascending order, so concatenating per-batch outputs preserves slice order.
#[derive(Debug, Clone, Copy)]
pub struct BatchSampler {
    /// The size of each batch.
    batch_size: usize,
}

impl BatchSampler {
    /// Creates a new BatchSampler with the specified batch size.
    ///
    /// A batch size of zero is treated as one.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    /// Returns the batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches needed for `total` items.
    pub fn num_batches(&self, total: usize) -> usize {
        total.div_ceil(self.batch_size)
    }

    /// Index ranges for each batch over `total` items.
    pub fn ranges(&self, total: usize) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..total)
            .step_by(self.batch_size)
            .map(move |start| start..(start + self.batch_size).min(total))
    }
}
