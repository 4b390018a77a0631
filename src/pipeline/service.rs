//! Session-scoped segmentation workflow.

use super::types::{
    ExportArtifact, ExportFormat, FileInfo, HealthStatus, SegmentationSummary, SliceView,
    UploadSummary,
};
use crate::core::config::{ConfigValidator, SegConfig};
use crate::core::errors::{SegError, SegResult};
use crate::core::inference::{InferenceEngine, OrtPredictor, PredictorHandle, SegmentationPredictor};
use crate::domain::classes::{ClassInfo, ClassRegistry};
use crate::domain::source::{SourceKind, SpatialTransform};
use crate::processors::postprocess::{
    canonical_slice, display_base_image, display_base_volume, to_canonical_volume,
};
use crate::processors::preprocess::Preprocessor;
use crate::processors::statistics::class_statistics;
use crate::session::cleanup::{CleanupHandle, CleanupScheduler};
use crate::session::store::SessionStore;
use crate::utils::image::array_to_gray_image;
use crate::utils::loader::classify_extension;
use crate::utils::nifti::write_nifti_labels;
use crate::utils::visualization::{
    EncodeFormat, colorize, encode_gray_data_uri, encode_image, encode_rgb_data_uri,
    normalize_for_display, overlay,
};
use image::DynamicImage;
use ndarray::{ArrayD, ArrayView2, ArrayView3, Axis, Ix2, Ix3};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Upload, segmentation, viewing and export over a [`SessionStore`].
pub struct SegmentationService {
    config: SegConfig,
    store: Arc<SessionStore>,
    engine: InferenceEngine,
    preprocessor: Preprocessor,
    registry: ClassRegistry,
}

impl SegmentationService {
    /// Creates a service from explicit collaborators.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `config` is invalid.
    pub fn new(
        config: SegConfig,
        store: Arc<SessionStore>,
        predictor: Arc<PredictorHandle>,
    ) -> SegResult<Self> {
        config.validate()?;
        let registry = config.class_registry()?;
        let engine = InferenceEngine::new(predictor, config.batch_size, config.display_shape());
        let preprocessor = Preprocessor::new(config.input_shape());
        Ok(Self {
            config,
            store,
            engine,
            preprocessor,
            registry,
        })
    }

    /// Creates a service that opens the configured store and loads the ONNX
    /// model on first use.
    pub fn from_config(config: SegConfig) -> SegResult<Self> {
        let store = Arc::new(SessionStore::open(&config.storage_dir)?);
        let model_path = config.model_path.clone();
        let num_classes = config.num_classes;
        let ort = config.ort.clone();
        let predictor = PredictorHandle::new(move || {
            let path = model_path.as_deref().ok_or_else(|| {
                SegError::model_load("", "no model path configured", None)
            })?;
            let predictor = OrtPredictor::from_file(path, num_classes, &ort)?;
            Ok(Box::new(predictor) as Box<dyn SegmentationPredictor>)
        });
        Self::new(config, store, Arc::new(predictor))
    }

    /// The underlying session store.
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// The class table used for colors and statistics.
    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    /// The active configuration.
    pub fn config(&self) -> &SegConfig {
        &self.config
    }

    /// Validates and stores an upload in a new session.
    ///
    /// The file is parsed immediately; if parsing fails the new session is
    /// removed before the error is returned.
    pub fn upload(&self, bytes: &[u8], filename: &str) -> SegResult<UploadSummary> {
        classify_extension(filename)?;
        if bytes.is_empty() {
            return Err(SegError::validation("upload is empty"));
        }
        if bytes.len() as u64 > self.config.max_upload_bytes() {
            return Err(SegError::validation(format!(
                "upload of {} bytes exceeds the {} MB limit",
                bytes.len(),
                self.config.max_upload_mb
            )));
        }

        let id = self.store.create_session()?;
        let parsed = self
            .store
            .save_upload(id.as_str(), bytes, filename)
            .and_then(|_| self.store.load_source(id.as_str()));
        let source = match parsed {
            Ok(source) => source,
            Err(e) => {
                warn!("rejecting upload '{}': {}", filename, e);
                if let Err(cleanup) = self.store.delete_session(id.as_str()) {
                    warn!("could not remove session {}: {}", id, cleanup);
                }
                return Err(e);
            }
        };

        info!(
            "session {} accepted {} '{}' {:?}",
            id, source.kind, source.filename, source.dimensions
        );
        Ok(UploadSummary {
            session_id: id.to_string(),
            file_info: FileInfo {
                filename: source.filename,
                kind: source.kind,
                dimensions: source.dimensions,
                num_slices: source.num_slices,
            },
        })
    }

    /// Reads a local file and uploads it.
    pub fn upload_path(&self, path: &Path) -> SegResult<UploadSummary> {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| SegError::validation(format!("invalid file name: {}", path.display())))?;
        let bytes = std::fs::read(path)?;
        self.upload(&bytes, filename)
    }

    /// Runs the full pipeline on a session's upload and stores the results.
    ///
    /// Predictions are stored at display resolution together with the
    /// normalized input resampled to the same shape for use as overlay base.
    pub fn segment(&self, session_id: &str) -> SegResult<SegmentationSummary> {
        if !self.store.exists(session_id) {
            return Err(SegError::not_found(session_id, "session"));
        }
        let source = self.store.load_source(session_id)?;
        let started = Instant::now();

        let (predictions, base): (ArrayD<u8>, ArrayD<f32>) = match source.kind {
            SourceKind::Volume => {
                let processed = self.preprocessor.preprocess_volume(source.as_volume()?)?;
                let labels = self.engine.predict(processed.view())?;
                let (_, h, w) = labels.dim();
                let base = display_base_volume(processed.view(), Some((h, w)))?;
                (to_canonical_volume(labels).into_dyn(), base.into_dyn())
            }
            SourceKind::Image => {
                let processed = self.preprocessor.preprocess_image(source.as_image()?)?;
                let labels = self.engine.predict(processed.view())?;
                let labels = labels.index_axis_move(Axis(0), 0);
                let base = display_base_image(processed.index_axis(Axis(0), 0), Some(labels.dim()))?;
                (labels.into_dyn(), base.into_dyn())
            }
        };
        let elapsed = started.elapsed().as_secs_f64() * 1000.0;

        let num_slices = match source.kind {
            SourceKind::Volume => predictions.shape()[2],
            SourceKind::Image => 1,
        };
        let statistics = class_statistics(&predictions, &self.registry);
        self.store
            .save_results(session_id, &predictions, Some(&base), &source.metadata())?;

        info!(
            "segmented session {} ({} slices) in {:.2} ms",
            session_id, num_slices, elapsed
        );
        Ok(SegmentationSummary {
            session_id: session_id.to_string(),
            kind: source.kind,
            num_slices_processed: num_slices,
            statistics,
            processing_time_ms: (elapsed * 100.0).round() / 100.0,
        })
    }

    /// Renders one slice of the stored results.
    ///
    /// `alpha` defaults to the configured overlay blend factor.
    ///
    /// # Errors
    ///
    /// [`SegError::NotFound`] without results, [`SegError::Validation`] for an
    /// out-of-range slice or blend factor.
    pub fn slice_view(
        &self,
        session_id: &str,
        slice_index: usize,
        alpha: Option<f32>,
    ) -> SegResult<SliceView> {
        let alpha = alpha.unwrap_or(self.config.overlay_alpha);
        if !(0.0..=1.0).contains(&alpha) {
            return Err(SegError::validation(format!(
                "overlay alpha must be within [0, 1], got {}",
                alpha
            )));
        }
        let record = self.store.load_results(session_id)?;
        let kind = record.metadata.kind;
        let total_slices = slice_count(&record.predictions, kind)?;

        let labels = slice_of(&record.predictions, kind, slice_index)?;
        let mask = encode_rgb_data_uri(colorize(labels, &self.registry))?;
        let statistics = class_statistics(&labels, &self.registry);

        let (original_image, overlay_image) = match &record.original {
            Some(original) => {
                let base = normalize_for_display(slice_of(original, kind, slice_index)?);
                let blended = overlay(base.view(), labels, &self.registry, alpha)?;
                (
                    Some(encode_gray_data_uri(base.view())?),
                    Some(encode_rgb_data_uri(blended)?),
                )
            }
            None => (None, None),
        };

        Ok(SliceView {
            session_id: session_id.to_string(),
            slice_index,
            total_slices,
            kind,
            original_image,
            segmentation_mask: mask,
            overlay_image,
            statistics,
        })
    }

    /// Exports stored results.
    ///
    /// NIfTI exports carry the source transform, or identity when the source
    /// had none. PNG exports render `slice`, defaulting to the middle slice.
    pub fn export(
        &self,
        session_id: &str,
        format: ExportFormat,
        slice: Option<usize>,
    ) -> SegResult<ExportArtifact> {
        let record = self.store.load_results(session_id)?;
        let kind = record.metadata.kind;
        match format {
            ExportFormat::Nifti => {
                let volume: ArrayView3<'_, u8> = match kind {
                    SourceKind::Volume => record.predictions.view().into_dimensionality::<Ix3>()?,
                    SourceKind::Image => record
                        .predictions
                        .view()
                        .into_dimensionality::<Ix2>()?
                        .insert_axis(Axis(2)),
                };
                let transform = record
                    .metadata
                    .spatial_transform
                    .unwrap_or_else(SpatialTransform::identity);
                Ok(ExportArtifact {
                    bytes: write_nifti_labels(volume, &transform)?,
                    media_type: "application/gzip",
                    file_name: format!("segmentation_{}.nii.gz", session_id),
                })
            }
            ExportFormat::Png => {
                let total = slice_count(&record.predictions, kind)?;
                let index = slice.unwrap_or(total / 2);
                let labels = slice_of(&record.predictions, kind, index)?;
                let image = DynamicImage::ImageRgb8(colorize(labels, &self.registry));
                Ok(ExportArtifact {
                    bytes: encode_image(&image, EncodeFormat::Png)?,
                    media_type: "image/png",
                    file_name: format!("segmentation_{}.png", session_id),
                })
            }
        }
    }

    /// Renders the stored overlay base of one slice as a grayscale PNG.
    pub fn export_original_png(&self, session_id: &str, slice_index: usize) -> SegResult<Vec<u8>> {
        let record = self.store.load_results(session_id)?;
        let original = record
            .original
            .as_ref()
            .ok_or_else(|| SegError::not_found(session_id, "original"))?;
        let base = normalize_for_display(slice_of(original, record.metadata.kind, slice_index)?);
        encode_image(
            &DynamicImage::ImageLuma8(array_to_gray_image(base.view())),
            EncodeFormat::Png,
        )
    }

    /// Deletes a session.
    ///
    /// # Errors
    ///
    /// [`SegError::NotFound`] if the session does not exist.
    pub fn delete_session(&self, session_id: &str) -> SegResult<()> {
        if self.store.delete_session(session_id)? {
            Ok(())
        } else {
            Err(SegError::not_found(session_id, "session"))
        }
    }

    /// The class table.
    pub fn class_info(&self) -> &[ClassInfo] {
        self.registry.classes()
    }

    /// Model and store status.
    pub fn health(&self) -> HealthStatus {
        let session_count = match self.store.list_sessions() {
            Ok(ids) => ids.len(),
            Err(e) => {
                warn!("could not list sessions: {}", e);
                0
            }
        };
        HealthStatus {
            model_loaded: self.engine.predictor().is_loaded(),
            session_count,
        }
    }

    /// Loads the predictor now instead of on the first segmentation.
    pub fn warm_up(&self) -> SegResult<()> {
        self.engine.predictor().warm_up()
    }

    /// Starts the background expiry sweep with the configured interval and
    /// retention.
    pub fn start_cleanup(&self) -> SegResult<CleanupHandle> {
        CleanupScheduler::spawn(
            Arc::clone(&self.store),
            self.config.sweep_interval(),
            self.config.retention(),
        )
    }
}

fn slice_count<A>(array: &ArrayD<A>, kind: SourceKind) -> SegResult<usize> {
    match kind {
        SourceKind::Volume if array.ndim() == 3 => Ok(array.shape()[2]),
        SourceKind::Image if array.ndim() == 2 => Ok(1),
        _ => Err(SegError::validation(format!(
            "stored {} result has unexpected rank {}",
            kind,
            array.ndim()
        ))),
    }
}

fn slice_of<A>(array: &ArrayD<A>, kind: SourceKind, index: usize) -> SegResult<ArrayView2<'_, A>> {
    match kind {
        SourceKind::Volume => {
            let volume = array.view().into_dimensionality::<Ix3>()?;
            canonical_slice(&volume, index)?;
            Ok(volume.index_axis_move(Axis(2), index))
        }
        SourceKind::Image => {
            if index != 0 {
                return Err(SegError::validation(format!(
                    "slice index {} out of range [0, 1)",
                    index
                )));
            }
            Ok(array.view().into_dimensionality::<Ix2>()?)
        }
    }
}
