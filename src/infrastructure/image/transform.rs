//! Round-corner transform applied after decoding.

use image::{DynamicImage, GenericImageView, RgbaImage};
use tracing::trace;

use crate::domain::entities::Transform;
use crate::domain::errors::{LoadError, LoadResult};

/// Applies `transform` to `image`. The source buffer is consumed and dropped
/// as soon as the output exists.
///
/// # Errors
/// Returns `OutOfMemory` if the output buffer would exceed `max_alloc`.
pub fn apply(image: DynamicImage, transform: Transform, max_alloc: u64) -> LoadResult<DynamicImage> {
    match transform {
        Transform::None => Ok(image),
        Transform::RoundCorner { ratio } => round_corner(image, ratio, max_alloc),
    }
}

/// Crops the centred square of side `min(width, height)` and masks it with a
/// rounded rectangle of radius `side / ratio`. A ratio of 2 yields a circle.
///
/// # Errors
/// Returns `OutOfMemory` if the output buffer would exceed `max_alloc`, and
/// `Decode` if the image has no pixels.
#[allow(clippy::cast_precision_loss)]
pub fn round_corner(image: DynamicImage, ratio: u32, max_alloc: u64) -> LoadResult<DynamicImage> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(LoadError::decode("cannot round an empty image"));
    }

    let diameter = width.min(height);
    let required = u64::from(diameter) * u64::from(diameter) * 4;
    if required > max_alloc {
        return Err(LoadError::out_of_memory(format!(
            "rounding corners ({required} bytes)"
        )));
    }

    let x = (width - diameter) / 2;
    let y = (height - diameter) / 2;
    let mut output = image.crop_imm(x, y, diameter, diameter).into_rgba8();
    drop(image);

    let side = diameter as f32;
    let radius = (side / ratio.max(1) as f32).min(side / 2.0);
    trace!(diameter, radius, "Rounding corners");
    mask_rounded_rect(&mut output, radius);

    Ok(DynamicImage::ImageRgba8(output))
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn mask_rounded_rect(buffer: &mut RgbaImage, radius: f32) {
    if radius <= 0.0 {
        return;
    }
    let side = buffer.width() as f32;
    let (lo, hi) = (radius, side - radius);

    for (x, y, pixel) in buffer.enumerate_pixels_mut() {
        let px = x as f32 + 0.5;
        let py = y as f32 + 0.5;
        let cx = px.clamp(lo, hi);
        let cy = py.clamp(lo, hi);
        let distance = (px - cx).hypot(py - cy);
        let coverage = (radius - distance + 0.5).clamp(0.0, 1.0);
        if coverage < 1.0 {
            pixel[3] = (f32::from(pixel[3]) * coverage).round() as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::image::fixtures::gradient;

    const LIMIT: u64 = 64 * 1024 * 1024;

    #[test]
    fn test_crops_to_centred_square() {
        let out = round_corner(gradient(60, 40), 4, LIMIT).unwrap();
        assert_eq!((out.width(), out.height()), (40, 40));
        // Centre pixel comes from source column 10 + 20.
        assert_eq!(out.get_pixel(20, 20)[0], 30);
        assert_eq!(out.get_pixel(20, 20)[3], 255);
    }

    #[test]
    fn test_ratio_two_is_circle() {
        let out = round_corner(gradient(64, 64), 2, LIMIT).unwrap();
        assert_eq!(out.get_pixel(0, 0)[3], 0);
        assert_eq!(out.get_pixel(63, 63)[3], 0);
        assert_eq!(out.get_pixel(32, 2)[3], 255);
        assert_eq!(out.get_pixel(32, 32)[3], 255);
    }

    #[test]
    fn test_large_ratio_keeps_edges() {
        let out = round_corner(gradient(64, 64), 16, LIMIT).unwrap();
        assert_eq!(out.get_pixel(0, 0)[3], 0);
        assert_eq!(out.get_pixel(8, 0)[3], 255);
        assert_eq!(out.get_pixel(0, 32)[3], 255);
    }

    #[test]
    fn test_identity_transform_is_untouched() {
        let out = apply(gradient(30, 20), Transform::None, LIMIT).unwrap();
        assert_eq!((out.width(), out.height()), (30, 20));
    }

    #[test]
    fn test_allocation_limit() {
        let err = round_corner(gradient(64, 64), 2, 1024).unwrap_err();
        assert!(err.is_out_of_memory());
    }
}
