//! End-to-end workflow through the public API with an in-memory predictor.

use image::{DynamicImage, GrayImage, Luma};
use ndarray::{Array3, Array4};
use oar_seg::core::batch::Tensor4D;
use oar_seg::core::inference::{PredictorHandle, SegmentationPredictor};
use oar_seg::domain::SpatialTransform;
use oar_seg::prelude::*;
use oar_seg::utils::{EncodeFormat, encode_image, read_nifti, write_nifti_labels};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

/// Scores class `k` highest where the normalized input is closest to `k / 3`.
struct Bands;

impl SegmentationPredictor for Bands {
    fn forward(&mut self, batch: &Tensor4D) -> SegResult<Tensor4D> {
        let (b, _, h, w) = batch.dim();
        Ok(Array4::from_shape_fn((b, 4, h, w), |(n, c, y, x)| {
            -(batch[[n, 0, y, x]] * 3.0 - c as f32).abs()
        }))
    }

    fn num_classes(&self) -> usize {
        4
    }
}

/// Labels every pixel of the n-th slice it sees with class n + 1.
struct Sequential {
    seen: usize,
}

impl SegmentationPredictor for Sequential {
    fn forward(&mut self, batch: &Tensor4D) -> SegResult<Tensor4D> {
        let (b, _, h, w) = batch.dim();
        let first = self.seen;
        self.seen += b;
        Ok(Array4::from_shape_fn((b, 10, h, w), |(n, c, _, _)| {
            if c == first + n + 1 { 1.0 } else { 0.0 }
        }))
    }

    fn num_classes(&self) -> usize {
        10
    }
}

fn service(dir: &TempDir, display: Option<usize>) -> SegmentationService {
    let config = SegConfig::default()
        .with_storage_dir(dir.path())
        .with_input_size(8)
        .with_display_size(display)
        .with_batch_size(2)
        .with_num_classes(4);
    let store = Arc::new(SessionStore::open(dir.path()).unwrap());
    SegmentationService::new(
        config,
        store,
        Arc::new(PredictorHandle::from_predictor(Bands)),
    )
    .unwrap()
}

#[test]
fn test_volume_round_trip() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir, Some(16));

    let voxels = Array3::from_shape_fn((8, 8, 4), |(y, _, z)| (y * 30 + z) as u8);
    let mut affine = SpatialTransform::identity();
    affine.0[0][0] = 2.0;
    affine.0[0][3] = -10.0;
    let bytes = write_nifti_labels(voxels.view(), &affine).unwrap();

    let upload = svc.upload(&bytes, "orbit.nii.gz").unwrap();
    assert_eq!(upload.file_info.kind, SourceKind::Volume);
    assert_eq!(upload.file_info.dimensions, vec![8, 8, 4]);

    let summary = svc.segment(&upload.session_id).unwrap();
    assert_eq!(summary.num_slices_processed, 4);
    let total: u64 = summary.statistics.iter().map(|s| s.pixel_count).sum();
    assert_eq!(total, 16 * 16 * 4);
    let share: f64 = summary.statistics.iter().map(|s| s.percentage).sum();
    assert!((share - 100.0).abs() < 0.05);

    let export = svc
        .export(&upload.session_id, ExportFormat::Nifti, None)
        .unwrap();
    let decoded = read_nifti(&export.bytes).unwrap();
    assert_eq!(decoded.data.dim(), (16, 16, 4));
    let transform = decoded.transform.unwrap();
    assert_eq!(transform.0[0][0], 2.0);
    assert_eq!(transform.0[0][3], -10.0);
    assert!(decoded.data.iter().all(|&v| v < 4.0));
}

#[test]
fn test_image_without_display_upscaling() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir, None);

    let img = GrayImage::from_fn(12, 6, |x, _| Luma([(x * 20) as u8]));
    let bytes = encode_image(&DynamicImage::ImageLuma8(img), EncodeFormat::Png).unwrap();
    let upload = svc.upload(&bytes, "photo.PNG").unwrap();
    assert_eq!(upload.file_info.dimensions, vec![6, 12]);

    svc.segment(&upload.session_id).unwrap();
    let view = svc.slice_view(&upload.session_id, 0, Some(0.0)).unwrap();
    assert_eq!(view.total_slices, 1);
    assert!(view.original_image.is_some());
    assert!(svc.slice_view(&upload.session_id, 1, None).is_err());

    let png = svc
        .export(&upload.session_id, ExportFormat::Png, None)
        .unwrap();
    let decoded = image::load_from_memory(&png.bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (8, 8));
}

#[test]
fn test_expired_sessions_are_swept() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir, None);
    let img = GrayImage::from_pixel(4, 4, Luma([50]));
    let bytes = encode_image(&DynamicImage::ImageLuma8(img), EncodeFormat::Png).unwrap();
    let upload = svc.upload(&bytes, "a.png").unwrap();

    let store = svc.store();
    let retention = Duration::from_secs(60);
    let kept = store.sweep_expired_at(SystemTime::now(), retention);
    assert_eq!(kept.removed, 0);

    let later = SystemTime::now() + Duration::from_secs(3600);
    let report = store.sweep_expired_at(later, retention);
    assert_eq!(report.removed, 1);
    assert!(svc.segment(&upload.session_id).unwrap_err().is_not_found());
}

#[test]
fn test_distinct_class_per_slice() {
    let dir = TempDir::new().unwrap();
    let config = SegConfig::default()
        .with_storage_dir(dir.path())
        .with_input_size(8)
        .with_display_size(Some(16))
        .with_batch_size(3);
    let store = Arc::new(SessionStore::open(dir.path()).unwrap());
    let predictor = Arc::new(PredictorHandle::from_predictor(Sequential { seen: 0 }));
    let svc = SegmentationService::new(config, store, predictor).unwrap();

    let voxels = Array3::<u8>::from_elem((8, 8, 4), 7);
    let bytes = write_nifti_labels(voxels.view(), &SpatialTransform::identity()).unwrap();
    let upload = svc.upload(&bytes, "four.nii").unwrap();
    let summary = svc.segment(&upload.session_id).unwrap();

    let ids: Vec<u8> = summary.statistics.iter().map(|s| s.class_id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert!(summary.statistics.iter().all(|s| s.pixel_count == 16 * 16));
    let total: u64 = summary.statistics.iter().map(|s| s.pixel_count).sum();
    assert_eq!(total, 16 * 16 * 4);

    for k in 0..4 {
        let view = svc.slice_view(&upload.session_id, k, None).unwrap();
        assert_eq!(view.statistics.len(), 1);
        assert_eq!(usize::from(view.statistics[0].class_id), k + 1);
    }
}
