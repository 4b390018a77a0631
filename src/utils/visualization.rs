//! Rendering of masks and overlays, and their transport encodings.

use crate::core::errors::{ProcessingStage, SegError, SegResult};
use crate::domain::classes::{BACKGROUND_CLASS_ID, ClassRegistry};
use crate::processors::normalization::scale_to_u8;
use crate::utils::image::{array_to_gray_image, gray_to_rgb};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ndarray::{Array2, ArrayView2};
use std::io::Cursor;

/// Image container used by [`encode_image`] and [`encode_data_uri`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EncodeFormat {
    /// Lossless PNG.
    #[default]
    Png,
    /// Baseline JPEG.
    Jpeg,
}

impl EncodeFormat {
    /// MIME type of the encoding.
    pub fn mime_type(&self) -> &'static str {
        match self {
            EncodeFormat::Png => "image/png",
            EncodeFormat::Jpeg => "image/jpeg",
        }
    }

    fn image_format(&self) -> ImageFormat {
        match self {
            EncodeFormat::Png => ImageFormat::Png,
            EncodeFormat::Jpeg => ImageFormat::Jpeg,
        }
    }
}

/// Paints each class id with its registry color.
pub fn colorize(labels: ArrayView2<'_, u8>, registry: &ClassRegistry) -> RgbImage {
    let lut = registry.color_lut();
    let (height, width) = labels.dim();
    RgbImage::from_fn(width as u32, height as u32, |x, y| {
        Rgb(lut[usize::from(labels[[y as usize, x as usize]])])
    })
}

/// Stretches a float slice to `0..=255` using its own range.
///
/// A constant slice maps to all zeros.
pub fn normalize_for_display(slice: ArrayView2<'_, f32>) -> Array2<u8> {
    scale_to_u8(slice)
}

/// Blends class colors over a grayscale base.
///
/// Background pixels keep the base value in all three channels. Other pixels
/// become `(1 - alpha) * gray + alpha * color`, truncated to `u8`.
///
/// # Errors
///
/// Returns a validation error when the shapes differ or `alpha` is outside
/// `[0, 1]`.
pub fn overlay(
    base: ArrayView2<'_, u8>,
    labels: ArrayView2<'_, u8>,
    registry: &ClassRegistry,
    alpha: f32,
) -> SegResult<RgbImage> {
    if !(0.0..=1.0).contains(&alpha) {
        return Err(SegError::validation(format!(
            "overlay alpha must be within [0, 1], got {}",
            alpha
        )));
    }
    if base.dim() != labels.dim() {
        return Err(SegError::validation(format!(
            "overlay base {:?} and label map {:?} differ in shape",
            base.dim(),
            labels.dim()
        )));
    }

    let lut = registry.color_lut();
    let keep = 1.0 - alpha;
    let mut image = gray_to_rgb(base);
    for (pixel, &class) in image.pixels_mut().zip(labels.iter()) {
        if class == BACKGROUND_CLASS_ID {
            continue;
        }
        let color = lut[usize::from(class)];
        let g = f32::from(pixel[0]) * keep;
        *pixel = Rgb([
            (g + alpha * f32::from(color[0])) as u8,
            (g + alpha * f32::from(color[1])) as u8,
            (g + alpha * f32::from(color[2])) as u8,
        ]);
    }
    Ok(image)
}

/// Encodes an image into PNG or JPEG bytes.
pub fn encode_image(image: &DynamicImage, format: EncodeFormat) -> SegResult<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), format.image_format())
        .map_err(|e| {
            SegError::processing(
                ProcessingStage::Rendering,
                format!("failed to encode {}", format.mime_type()),
                e,
            )
        })?;
    Ok(bytes)
}

/// Encodes an image as a `data:<mime>;base64,...` URI.
pub fn encode_data_uri(image: &DynamicImage, format: EncodeFormat) -> SegResult<String> {
    let bytes = encode_image(image, format)?;
    Ok(format!(
        "data:{};base64,{}",
        format.mime_type(),
        STANDARD.encode(bytes)
    ))
}

/// Encodes a single-channel slice as a PNG data URI.
pub fn encode_gray_data_uri(pixels: ArrayView2<'_, u8>) -> SegResult<String> {
    encode_data_uri(
        &DynamicImage::ImageLuma8(array_to_gray_image(pixels)),
        EncodeFormat::Png,
    )
}

/// Encodes an RGB image as a PNG data URI.
pub fn encode_rgb_data_uri(image: RgbImage) -> SegResult<String> {
    encode_data_uri(&DynamicImage::ImageRgb8(image), EncodeFormat::Png)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_colorize_uses_registry_and_fallback() {
        let registry = ClassRegistry::default();
        let labels = array![[0u8, 1], [7, 99]];
        let rgb = colorize(labels.view(), &registry);
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(rgb.get_pixel(1, 0), &Rgb([255, 0, 0]));
        assert_eq!(rgb.get_pixel(0, 1), &Rgb([255, 128, 0]));
        assert_eq!(rgb.get_pixel(1, 1), &Rgb([128, 128, 128]));
    }

    #[test]
    fn test_overlay_keeps_background_for_any_alpha() {
        let registry = ClassRegistry::default();
        let base = array![[10u8, 200], [37, 90]];
        let labels = array![[0u8, 0], [0, 2]];
        for alpha in [0.0f32, 0.3, 1.0] {
            let out = overlay(base.view(), labels.view(), &registry, alpha).unwrap();
            assert_eq!(out.get_pixel(0, 0), &Rgb([10, 10, 10]));
            assert_eq!(out.get_pixel(1, 0), &Rgb([200, 200, 200]));
            assert_eq!(out.get_pixel(0, 1), &Rgb([37, 37, 37]));
        }
    }

    #[test]
    fn test_overlay_blends_foreground() {
        let registry = ClassRegistry::default();
        let base = array![[100u8]];
        let labels = array![[1u8]];
        let out = overlay(base.view(), labels.view(), &registry, 0.5).unwrap();
        // 0.5 * 100 + 0.5 * 255 = 177.5, truncated.
        assert_eq!(out.get_pixel(0, 0), &Rgb([177, 50, 50]));
        let out = overlay(base.view(), labels.view(), &registry, 0.0).unwrap();
        assert_eq!(out.get_pixel(0, 0), &Rgb([100, 100, 100]));
    }

    #[test]
    fn test_overlay_rejects_bad_input() {
        let registry = ClassRegistry::default();
        let base = array![[1u8, 2]];
        assert!(overlay(base.view(), array![[1u8]].view(), &registry, 0.5).is_err());
        assert!(overlay(base.view(), array![[1u8, 0]].view(), &registry, 1.5).is_err());
        assert!(overlay(base.view(), array![[1u8, 0]].view(), &registry, f32::NAN).is_err());
    }

    #[test]
    fn test_data_uri_is_decodable() {
        let uri = encode_gray_data_uri(array![[0u8, 255], [128, 64]].view()).unwrap();
        let payload = uri.strip_prefix("data:image/png;base64,").unwrap();
        let bytes = STANDARD.decode(payload).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_luma8();
        assert_eq!(decoded.dimensions(), (2, 2));
        assert_eq!(decoded.get_pixel(0, 1).0, [128]);
    }

    #[test]
    fn test_jpeg_encoding() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([10, 20, 30])));
        let uri = encode_data_uri(&image, EncodeFormat::Jpeg).unwrap();
        assert!(uri.starts_with("data:image/jpeg;base64,"));
    }
}
