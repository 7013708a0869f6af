//! Bounds-first sampled decoding and re-encoding.

use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{
    DynamicImage, GrayImage, ImageEncoder, ImageFormat, ImageReader, Limits, Rgba, RgbImage,
    RgbaImage,
};
use jpeg_decoder::PixelFormat;
use tracing::trace;

use crate::domain::entities::TargetSize;
use crate::domain::errors::{CacheError, CacheResult, LoadError, LoadResult};
use crate::infrastructure::config::CompressFormat;

/// Allocation ceiling used when the caller does not configure one.
pub const DEFAULT_MAX_DECODE_BYTES: u64 = 512 * 1024 * 1024;

/// Reads the native dimensions of an encoded file without decoding pixels.
///
/// # Errors
/// Returns `Decode` if the header cannot be parsed, `Io` if the file cannot
/// be opened.
pub fn read_bounds(path: &Path) -> LoadResult<(u32, u32)> {
    inspect(path).map(|(_, bounds)| bounds)
}

fn inspect(path: &Path) -> LoadResult<(Option<ImageFormat>, (u32, u32))> {
    let reader = ImageReader::open(path)?
        .with_guessed_format()
        .map_err(LoadError::from)?;
    let format = reader.format();
    let bounds = reader
        .into_dimensions()
        .map_err(|e| LoadError::from_image(&e))?;
    Ok((format, bounds))
}

/// Largest power of two that keeps both sampled dimensions at or above the
/// target.
#[must_use]
pub fn sample_factor(width: u32, height: u32, target: TargetSize) -> u32 {
    let mut factor = 1u32;
    while let Some(next) = factor.checked_mul(2) {
        if width / next < target.width() || height / next < target.height() {
            break;
        }
        factor = next;
    }
    factor
}

/// Decodes `path`, downsampled by a power of two when `target` is smaller
/// than the source.
///
/// JPEG sources are decoded at a reduced DCT scale and non-interlaced PNG
/// sources are box-filtered row by row, so peak memory follows the sampled
/// size. Other formats are decoded in full and then resized.
///
/// # Errors
/// Returns `OutOfMemory` if the sampled image or the decoder would need more
/// than `max_alloc` bytes, `Decode` for corrupt or unsupported data.
pub fn decode_sampled(
    path: &Path,
    target: Option<TargetSize>,
    max_alloc: u64,
) -> LoadResult<DynamicImage> {
    let Some(target) = target else {
        return decode_full(path, max_alloc);
    };

    let (format, (width, height)) = inspect(path)?;
    let factor = sample_factor(width, height, target);
    let sampled = ((width / factor).max(1), (height / factor).max(1));

    let sampled_bytes = u64::from(sampled.0) * u64::from(sampled.1) * 4;
    if sampled_bytes > max_alloc {
        return Err(LoadError::out_of_memory(format!(
            "decoding ({}x{} sampled image needs {sampled_bytes} bytes)",
            sampled.0, sampled.1
        )));
    }

    if factor > 1 {
        let scaled = match format {
            Some(ImageFormat::Jpeg) => decode_jpeg_scaled(path, sampled)?,
            Some(ImageFormat::Png) => decode_png_boxed(path, factor, max_alloc)?,
            _ => None,
        };
        if let Some(image) = scaled {
            trace!(
                path = %path.display(),
                factor,
                width = image.width(),
                height = image.height(),
                "Decoded at sample size"
            );
            return Ok(image);
        }
    }

    let decoded = decode_full(path, max_alloc)?;
    if factor == 1 {
        return Ok(decoded);
    }
    trace!(
        path = %path.display(),
        factor,
        width = sampled.0,
        height = sampled.1,
        "Downsampling decoded image"
    );
    Ok(decoded.resize_exact(sampled.0, sampled.1, FilterType::Triangle))
}

fn decode_full(path: &Path, max_alloc: u64) -> LoadResult<DynamicImage> {
    let mut limits = Limits::default();
    limits.max_alloc = Some(max_alloc);

    let mut reader = ImageReader::open(path)?
        .with_guessed_format()
        .map_err(LoadError::from)?;
    reader.limits(limits);
    reader.decode().map_err(|e| LoadError::from_image(&e))
}

/// DCT-scaled JPEG decode. Returns `None` for pixel formats left to the
/// generic path.
fn decode_jpeg_scaled(path: &Path, sampled: (u32, u32)) -> LoadResult<Option<DynamicImage>> {
    let mut decoder = jpeg_decoder::Decoder::new(BufReader::new(File::open(path)?));
    decoder.read_info().map_err(jpeg_error)?;
    let Some(info) = decoder.info() else {
        return Ok(None);
    };
    if !matches!(info.pixel_format, PixelFormat::L8 | PixelFormat::RGB24) {
        return Ok(None);
    }

    let (width, height) = decoder
        .scale(
            u16::try_from(sampled.0).unwrap_or(u16::MAX),
            u16::try_from(sampled.1).unwrap_or(u16::MAX),
        )
        .map_err(jpeg_error)?;
    let pixels = decoder.decode().map_err(jpeg_error)?;
    let (width, height) = (u32::from(width), u32::from(height));

    let image = match info.pixel_format {
        PixelFormat::L8 => GrayImage::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8),
        _ => RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8),
    }
    .ok_or_else(|| LoadError::decode("JPEG pixel buffer does not match its size"))?;

    // DCT scaling stops at 1/8.
    if (image.width(), image.height()) == sampled {
        Ok(Some(image))
    } else {
        Ok(Some(image.resize_exact(sampled.0, sampled.1, FilterType::Triangle)))
    }
}

/// Streams a PNG row by row, averaging `factor`x`factor` blocks. Returns
/// `None` for interlaced files.
fn decode_png_boxed(
    path: &Path,
    factor: u32,
    max_alloc: u64,
) -> LoadResult<Option<DynamicImage>> {
    let mut decoder = png::Decoder::new_with_limits(
        BufReader::new(File::open(path)?),
        png::Limits {
            bytes: usize::try_from(max_alloc).unwrap_or(usize::MAX),
        },
    );
    decoder.set_transformations(png::Transformations::normalize_to_color8());
    let mut reader = decoder.read_info().map_err(png_error)?;
    if reader.info().interlaced {
        return Ok(None);
    }

    let (width, height) = (reader.info().width, reader.info().height);
    let (out_w, out_h) = ((width / factor).max(1), (height / factor).max(1));
    let channels = reader.output_color_type().0.samples();
    let step = factor as usize;
    let block = factor * factor;

    let mut out = RgbaImage::new(out_w, out_h);
    let mut sums = vec![0u32; out_w as usize * 4];
    let mut y = 0u32;
    while let Some(row) = reader.next_row().map_err(png_error)? {
        let oy = y / factor;
        if oy < out_h {
            for (ox, sum) in sums.chunks_exact_mut(4).enumerate() {
                for px in row.data().chunks_exact(channels).skip(ox * step).take(step) {
                    for (acc, value) in sum.iter_mut().zip(rgba(px)) {
                        *acc += u32::from(value);
                    }
                }
            }
            if y % factor == factor - 1 {
                for (ox, sum) in (0u32..).zip(sums.chunks_exact_mut(4)) {
                    let mut pixel = [0u8; 4];
                    for (dst, acc) in pixel.iter_mut().zip(sum.iter_mut()) {
                        *dst = u8::try_from(*acc / block).unwrap_or(u8::MAX);
                        *acc = 0;
                    }
                    out.put_pixel(ox, oy, Rgba(pixel));
                }
            }
        }
        y += 1;
    }

    Ok(Some(DynamicImage::ImageRgba8(out)))
}

fn rgba(px: &[u8]) -> [u8; 4] {
    match *px {
        [l] => [l, l, l, 255],
        [l, a] => [l, l, l, a],
        [r, g, b] => [r, g, b, 255],
        [r, g, b, a, ..] => [r, g, b, a],
        [] => [0, 0, 0, 0],
    }
}

fn jpeg_error(error: jpeg_decoder::Error) -> LoadError {
    match error {
        jpeg_decoder::Error::Io(e) => LoadError::from(e),
        other => LoadError::decode(other.to_string()),
    }
}

fn png_error(error: png::DecodingError) -> LoadError {
    match error {
        png::DecodingError::IoError(e) => LoadError::from(e),
        png::DecodingError::LimitsExceeded => LoadError::out_of_memory("decoding (PNG limits)"),
        other => LoadError::decode(other.to_string()),
    }
}

/// Re-encodes `image` for storage in the disk tier.
///
/// # Errors
/// Returns `EncodeError` if the codec rejects the pixel data.
pub fn encode(image: &DynamicImage, format: CompressFormat, quality: u8) -> CacheResult<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    let result = match format {
        CompressFormat::Jpeg => {
            let rgb = image.to_rgb8();
            JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).write_image(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                image::ExtendedColorType::Rgb8,
            )
        }
        CompressFormat::Png => {
            let rgba = image.to_rgba8();
            PngEncoder::new(&mut buf).write_image(
                rgba.as_raw(),
                rgba.width(),
                rgba.height(),
                image::ExtendedColorType::Rgba8,
            )
        }
        CompressFormat::Webp => {
            let rgba = image.to_rgba8();
            WebPEncoder::new_lossless(&mut buf).write_image(
                rgba.as_raw(),
                rgba.width(),
                rgba.height(),
                image::ExtendedColorType::Rgba8,
            )
        }
    };
    result.map_err(|e| CacheError::EncodeError(e.to_string()))?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::image::fixtures::write_png;
    use test_case::test_case;

    #[test_case(1000, 800, 100, 100, 8 ; "both sides far larger")]
    #[test_case(1000, 800, 300, 300, 2 ; "height limits the factor")]
    #[test_case(100, 100, 100, 100, 1 ; "exact fit")]
    #[test_case(50, 50, 100, 100, 1 ; "source smaller than target")]
    #[test_case(4096, 64, 16, 16, 4 ; "narrow source")]
    fn test_sample_factor(w: u32, h: u32, tw: u32, th: u32, expected: u32) {
        let target = TargetSize::new(tw, th).unwrap();
        let factor = sample_factor(w, h, target);
        assert_eq!(factor, expected);
        assert!(w / factor >= tw.min(w));
        assert!(h / factor >= th.min(h));
    }

    #[test]
    fn test_read_bounds() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_png(dir.path(), "bounds.png", 40, 30);
        assert_eq!(read_bounds(&path).unwrap(), (40, 30));
    }

    #[test]
    fn test_decode_sampled_keeps_size_at_or_above_target() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_png(dir.path(), "large.png", 400, 200);

        let target = TargetSize::new(90, 40).unwrap();
        let image = decode_sampled(&path, Some(target), DEFAULT_MAX_DECODE_BYTES).unwrap();

        assert_eq!((image.width(), image.height()), (100, 50));
    }

    #[test]
    fn test_sampled_png_fits_budget_of_sampled_size() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_png(dir.path(), "poster.png", 1024, 1024);

        // A full decode would need 4 MiB.
        let target = TargetSize::new(128, 128).unwrap();
        let image = decode_sampled(&path, Some(target), 1024 * 1024).unwrap();

        assert_eq!((image.width(), image.height()), (128, 128));
    }

    #[test]
    fn test_sampled_size_over_budget_is_out_of_memory() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_png(dir.path(), "poster.png", 1024, 1024);

        let target = TargetSize::new(128, 128).unwrap();
        let err = decode_sampled(&path, Some(target), 1000).unwrap_err();
        assert!(err.is_out_of_memory(), "unexpected error: {err}");
    }

    #[test]
    fn test_sampled_jpeg_uses_reduced_scale() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("photo.jpg");
        let source = DynamicImage::new_rgb8(512, 256);
        std::fs::write(&path, encode(&source, CompressFormat::Jpeg, 80).unwrap()).unwrap();

        // Full RGB decode would need 384 KiB.
        let target = TargetSize::new(64, 32).unwrap();
        let image = decode_sampled(&path, Some(target), 64 * 1024).unwrap();

        assert_eq!((image.width(), image.height()), (64, 32));
    }

    #[test]
    fn test_box_filter_averages_block() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("checker.png");
        let checker = image::RgbaImage::from_fn(4, 4, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([200, 100, 0, 255])
            } else {
                Rgba([0, 100, 200, 255])
            }
        });
        checker.save(&path).unwrap();

        let target = TargetSize::new(2, 2).unwrap();
        let image = decode_sampled(&path, Some(target), DEFAULT_MAX_DECODE_BYTES).unwrap();

        assert_eq!((image.width(), image.height()), (2, 2));
        assert_eq!(image.to_rgba8().get_pixel(1, 1), &Rgba([100, 100, 100, 255]));
    }

    #[test]
    fn test_decode_without_target_is_native() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_png(dir.path(), "native.png", 33, 17);
        let image = decode_sampled(&path, None, DEFAULT_MAX_DECODE_BYTES).unwrap();
        assert_eq!((image.width(), image.height()), (33, 17));
    }

    #[test]
    fn test_decode_over_allocation_limit_is_out_of_memory() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_png(dir.path(), "big.png", 64, 64);
        let err = decode_sampled(&path, None, 16).unwrap_err();
        assert!(err.is_out_of_memory(), "unexpected error: {err}");
    }

    #[test]
    fn test_decode_corrupt_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("corrupt.png");
        std::fs::write(&path, b"definitely not an image").unwrap();
        assert!(matches!(
            decode_sampled(&path, None, DEFAULT_MAX_DECODE_BYTES),
            Err(LoadError::Decode { .. })
        ));
    }

    #[test_case(CompressFormat::Jpeg ; "jpeg")]
    #[test_case(CompressFormat::Png ; "png")]
    #[test_case(CompressFormat::Webp ; "webp")]
    fn test_encode_preserves_dimensions(format: CompressFormat) {
        let image = DynamicImage::new_rgba8(21, 13);
        let bytes = encode(&image, format, 70).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (21, 13));
    }
}
