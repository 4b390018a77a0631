//! Batched segmentation inference.
//!
//! The predictor is an external collaborator reached through
//! [`SegmentationPredictor`]. [`PredictorHandle`] loads it at most once and
//! serializes forward passes; [`InferenceEngine`] drives it over a slice stack
//! in bounded batches, upscales the logits and takes the per-pixel argmax.

pub mod ort_predictor;

pub use ort_predictor::OrtPredictor;

use crate::core::batch::{BatchSampler, LabelMap2D, LabelMap3D, Tensor4D};
use crate::core::constants::MAX_CLASSES;
use crate::core::errors::{SegError, SegResult, SimpleError};
use crate::processors::resize::resize_planes_bilinear;
use ndarray::{Array2, ArrayView3, Axis, s};
use once_cell::sync::OnceCell;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// A model that maps normalized slices to per-class score maps.
///
/// Implementations need not be reentrant; callers go through
/// [`PredictorHandle`], which holds an exclusive lock for each call.
pub trait SegmentationPredictor: Send {
    /// Runs a forward pass.
    ///
    /// `batch` has shape (B, 1, H, W). The result must have shape
    /// (B, C, h, w) where C is [`num_classes`](Self::num_classes).
    fn forward(&mut self, batch: &Tensor4D) -> SegResult<Tensor4D>;

    /// Number of score channels produced per pixel.
    fn num_classes(&self) -> usize;

    /// Name used in log messages.
    fn name(&self) -> &str {
        "predictor"
    }
}

/// Builds a predictor on first use.
pub type PredictorFactory =
    Box<dyn Fn() -> SegResult<Box<dyn SegmentationPredictor>> + Send + Sync>;

/// Shared, lazily initialized predictor.
///
/// Initialization runs at most once even when several threads race to trigger
/// it. A failed initialization is not cached, so a later call retries.
pub struct PredictorHandle {
    factory: Option<PredictorFactory>,
    cell: OnceCell<Mutex<Box<dyn SegmentationPredictor>>>,
}

impl PredictorHandle {
    /// Creates a handle that calls `factory` on first use.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> SegResult<Box<dyn SegmentationPredictor>> + Send + Sync + 'static,
    {
        Self {
            factory: Some(Box::new(factory)),
            cell: OnceCell::new(),
        }
    }

    /// Wraps an already constructed predictor.
    pub fn from_predictor(predictor: impl SegmentationPredictor + 'static) -> Self {
        Self {
            factory: None,
            cell: OnceCell::with_value(Mutex::new(Box::new(predictor))),
        }
    }

    /// Returns `true` once the predictor has been constructed.
    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Forces initialization.
    pub fn warm_up(&self) -> SegResult<()> {
        self.get().map(|_| ())
    }

    fn get(&self) -> SegResult<&Mutex<Box<dyn SegmentationPredictor>>> {
        self.cell.get_or_try_init(|| {
            let factory = self.factory.as_ref().ok_or_else(|| {
                SegError::validation("predictor handle has neither a predictor nor a factory")
            })?;
            let predictor = factory()?;
            info!(
                "loaded predictor '{}' with {} classes",
                predictor.name(),
                predictor.num_classes()
            );
            Ok(Mutex::new(predictor))
        })
    }

    /// Runs `f` with exclusive access to the predictor.
    pub fn with_predictor<R>(
        &self,
        f: impl FnOnce(&mut dyn SegmentationPredictor) -> SegResult<R>,
    ) -> SegResult<R> {
        let mut guard = self.get()?.lock().map_err(|_| {
            SegError::inference(
                0,
                "failed to acquire predictor lock",
                SimpleError::new("predictor lock poisoned"),
            )
        })?;
        f(&mut **guard)
    }
}

impl std::fmt::Debug for PredictorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictorHandle")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

/// Drives a predictor over a (D, H, W) stack of normalized slices.
#[derive(Debug, Clone)]
pub struct InferenceEngine {
    predictor: Arc<PredictorHandle>,
    sampler: BatchSampler,
    display: Option<(usize, usize)>,
}

impl InferenceEngine {
    /// Creates an engine.
    ///
    /// `display` is the resolution logits are resampled to before the class
    /// decision; `None` keeps the model's native output resolution.
    pub fn new(
        predictor: Arc<PredictorHandle>,
        batch_size: usize,
        display: Option<(usize, usize)>,
    ) -> Self {
        Self {
            predictor,
            sampler: BatchSampler::new(batch_size),
            display,
        }
    }

    /// The shared predictor handle.
    pub fn predictor(&self) -> &Arc<PredictorHandle> {
        &self.predictor
    }

    /// Predicts class indices using the configured batch size.
    pub fn predict(&self, stack: ArrayView3<'_, f32>) -> SegResult<LabelMap3D> {
        self.predict_batched(stack, self.sampler.batch_size())
    }

    /// Predicts class indices for every slice of a (D, H, W) stack.
    ///
    /// Returns a (D, H', W') array where (H', W') is the display resolution,
    /// or the model's output resolution when no display resolution is set.
    /// Slice order is preserved and the result does not depend on `batch_size`.
    ///
    /// # Errors
    ///
    /// Any predictor failure, or an output of unexpected shape, is returned as
    /// [`SegError::Inference`] carrying the index of the failing batch.
    pub fn predict_batched(
        &self,
        stack: ArrayView3<'_, f32>,
        batch_size: usize,
    ) -> SegResult<LabelMap3D> {
        let depth = stack.len_of(Axis(0));
        if depth == 0 {
            return Err(SegError::validation("cannot run inference on an empty stack"));
        }
        let sampler = BatchSampler::new(batch_size);
        let mut slices: Vec<LabelMap2D> = Vec::with_capacity(depth);

        self.predictor.with_predictor(|predictor| {
            let num_classes = predictor.num_classes();
            if num_classes == 0 || num_classes > MAX_CLASSES {
                return Err(SegError::validation(format!(
                    "predictor reports {} classes, supported range is 1..={}",
                    num_classes, MAX_CLASSES
                )));
            }

            for (batch_index, range) in sampler.ranges(depth).enumerate() {
                let batch: Tensor4D = stack
                    .slice(s![range.clone(), .., ..])
                    .insert_axis(Axis(1))
                    .as_standard_layout()
                    .into_owned();

                let logits = predictor.forward(&batch).map_err(|e| {
                    SegError::inference(
                        batch_index,
                        format!("forward pass failed for slices {:?}", range),
                        e,
                    )
                })?;
                check_logits_shape(&logits, range.len(), num_classes, batch_index)?;
                debug!(
                    "batch {} ({} slices) produced logits {:?}",
                    batch_index,
                    range.len(),
                    logits.shape()
                );

                let (_, _, out_h, out_w) = logits.dim();
                let display = self.display.filter(|shape| *shape != (out_h, out_w));
                for sample in logits.axis_iter(Axis(0)) {
                    let labels = match display {
                        Some(shape) => argmax_classes(resize_planes_bilinear(sample, shape).view()),
                        None => argmax_classes(sample),
                    };
                    slices.push(labels);
                }
            }
            Ok(())
        })?;

        let views: Vec<_> = slices.iter().map(|s| s.view()).collect();
        let volume = ndarray::stack(Axis(0), &views)?;
        info!(
            "segmented {} slices in {} batches, output {:?}",
            depth,
            sampler.num_batches(depth),
            volume.dim()
        );
        Ok(volume)
    }
}

fn check_logits_shape(
    logits: &Tensor4D,
    batch_len: usize,
    num_classes: usize,
    batch_index: usize,
) -> SegResult<()> {
    let (b, c, h, w) = logits.dim();
    if b != batch_len || c != num_classes || h == 0 || w == 0 {
        return Err(SegError::inference(
            batch_index,
            format!(
                "expected logits of shape ({}, {}, h, w), got {:?}",
                batch_len,
                num_classes,
                logits.shape()
            ),
            SimpleError::new("malformed predictor output"),
        ));
    }
    Ok(())
}

/// Per-pixel argmax over the leading class axis of a (C, H, W) score stack.
///
/// Ties resolve to the lowest class id.
pub fn argmax_classes(logits: ArrayView3<'_, f32>) -> LabelMap2D {
    let (classes, h, w) = logits.dim();
    if classes == 0 {
        return Array2::zeros((h, w));
    }
    let mut best = Array2::<u8>::zeros((h, w));
    let mut best_score = logits.index_axis(Axis(0), 0).to_owned();
    for (class, plane) in logits.axis_iter(Axis(0)).enumerate().skip(1) {
        ndarray::Zip::from(&mut best)
            .and(&mut best_score)
            .and(&plane)
            .for_each(|label, score, &v| {
                if v > *score {
                    *score = v;
                    *label = class as u8;
                }
            });
    }
    best
}
