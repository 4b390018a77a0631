//! Planar image decoding and conversion helpers.

use crate::core::errors::SegResult;
use image::{ColorType, DynamicImage, GrayImage, ImageBuffer, Pixel, RgbImage};
use ndarray::{Array2, ArrayView2};

/// Decodes PNG or JPEG bytes into a single-channel float array of shape (H, W).
///
/// Color images are converted to luminance. Values keep the native range of
/// the source depth (0..=255 for 8-bit, 0..=65535 for 16-bit, and unchanged for
/// float images).
pub fn decode_grayscale(bytes: &[u8]) -> SegResult<Array2<f32>> {
    let img = image::load_from_memory(bytes)?;
    dynamic_to_gray_f32(&img)
}

/// Converts a decoded image into a single-channel float array.
pub fn dynamic_to_gray_f32(img: &DynamicImage) -> SegResult<Array2<f32>> {
    match img.color() {
        ColorType::L16 | ColorType::La16 | ColorType::Rgb16 | ColorType::Rgba16 => {
            buffer_to_array(&img.to_luma16(), f32::from)
        }
        ColorType::Rgb32F | ColorType::Rgba32F => buffer_to_array(&img.to_luma32f(), |v| v),
        _ => buffer_to_array(&img.to_luma8(), f32::from),
    }
}

fn buffer_to_array<P, F>(buffer: &ImageBuffer<P, Vec<P::Subpixel>>, convert: F) -> SegResult<Array2<f32>>
where
    P: Pixel,
    F: Fn(P::Subpixel) -> f32,
{
    let (width, height) = buffer.dimensions();
    let values = buffer.as_raw().iter().map(|&v| convert(v)).collect();
    Ok(Array2::from_shape_vec((height as usize, width as usize), values)?)
}

/// Wraps a (H, W) `u8` array as a grayscale image.
pub fn array_to_gray_image(pixels: ArrayView2<'_, u8>) -> GrayImage {
    let (height, width) = pixels.dim();
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        image::Luma([pixels[[y as usize, x as usize]]])
    })
}

/// Replicates a (H, W) `u8` array into the three channels of an RGB image.
pub fn gray_to_rgb(pixels: ArrayView2<'_, u8>) -> RgbImage {
    let (height, width) = pixels.dim();
    RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let v = pixels[[y as usize, x as usize]];
        image::Rgb([v, v, v])
    })
}
