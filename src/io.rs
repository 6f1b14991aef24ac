use std::fs;
use std::io::Cursor;
use std::path::Path;

use image::error::{ImageError, ParameterError, ParameterErrorKind};
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, ImageFormat, Luma, RgbaImage};
use tracing::debug;

use crate::{HairshadeError, HairshadeResult};

/// Single-channel confidence plane in `[0, 1]`, before quantization.
pub type ConfidenceImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Decode an encoded image and resample it to `width` x `height`.
pub fn decode(
    bytes: &[u8],
    width: u32,
    height: u32,
    filter: FilterType,
) -> HairshadeResult<RgbaImage> {
    if width == 0 || height == 0 {
        return Err(HairshadeError::Decode(ImageError::Parameter(
            ParameterError::from_kind(ParameterErrorKind::DimensionMismatch),
        )));
    }
    let rgba = decode_native(bytes)?;
    if rgba.dimensions() == (width, height) {
        return Ok(rgba);
    }
    debug!(
        from = ?rgba.dimensions(),
        to = ?(width, height),
        "resampling decoded photo"
    );
    Ok(imageops::resize(&rgba, width, height, filter))
}

/// Decode an encoded image at its native resolution.
pub fn decode_native(bytes: &[u8]) -> HairshadeResult<RgbaImage> {
    let image = image::load_from_memory(bytes).map_err(HairshadeError::Decode)?;
    Ok(image.to_rgba8())
}

/// Read and decode an image file at its native resolution.
pub fn open(path: impl AsRef<Path>) -> HairshadeResult<RgbaImage> {
    let bytes = fs::read(path.as_ref())?;
    decode_native(&bytes)
}

/// Encode pixels into the given format.
pub fn encode(pixels: &RgbaImage, format: ImageFormat) -> HairshadeResult<Vec<u8>> {
    let mut bytes = Vec::new();
    pixels
        .write_to(&mut Cursor::new(&mut bytes), format)
        .map_err(HairshadeError::Encode)?;
    Ok(bytes)
}

/// Encode pixels as PNG, the lossless displayable form.
pub fn to_png(pixels: &RgbaImage) -> HairshadeResult<Vec<u8>> {
    encode(pixels, ImageFormat::Png)
}

/// Save pixels to `path`, picking the format from the extension.
pub fn save(pixels: &RgbaImage, path: impl AsRef<Path>) -> HairshadeResult<()> {
    pixels.save(path).map_err(HairshadeError::Encode)
}

/// Resample an 8-bit mask; returns a copy when the size already matches.
pub fn resize_mask(mask: &GrayImage, width: u32, height: u32, filter: FilterType) -> GrayImage {
    if mask.dimensions() == (width, height) {
        return mask.clone();
    }
    imageops::resize(mask, width, height, filter)
}

/// Resample a floating-point confidence plane.
pub fn resize_confidence(
    confidence: &ConfidenceImage,
    width: u32,
    height: u32,
    filter: FilterType,
) -> ConfidenceImage {
    if confidence.dimensions() == (width, height) {
        return confidence.clone();
    }
    imageops::resize(confidence, width, height, filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn checker(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([200, 100, 50, 255])
            } else {
                Rgba([10, 20, 30, 128])
            }
        })
    }

    mod unit {
        use super::*;

        #[test]
        fn png_round_trip_is_lossless() {
            let pixels = checker(5, 3);
            let png = to_png(&pixels).unwrap();
            let decoded = decode_native(&png).unwrap();
            assert_eq!(decoded.as_raw(), pixels.as_raw());
        }

        #[test]
        fn decode_resamples_to_requested_size() {
            let png = to_png(&checker(8, 8)).unwrap();
            let decoded = decode(&png, 4, 2, FilterType::Triangle).unwrap();
            assert_eq!(decoded.dimensions(), (4, 2));
        }

        #[test]
        fn decode_same_size_keeps_pixels() {
            let pixels = checker(3, 3);
            let png = to_png(&pixels).unwrap();
            let decoded = decode(&png, 3, 3, FilterType::Triangle).unwrap();
            assert_eq!(decoded.as_raw(), pixels.as_raw());
        }

        #[test]
        fn malformed_bytes_are_decode_errors() {
            let err = decode_native(b"definitely not an image").unwrap_err();
            assert!(matches!(err, HairshadeError::Decode(_)));
        }

        #[test]
        fn zero_target_size_is_rejected() {
            let png = to_png(&checker(2, 2)).unwrap();
            let err = decode(&png, 0, 2, FilterType::Triangle).unwrap_err();
            assert!(matches!(err, HairshadeError::Decode(_)));
        }

        #[test]
        fn open_missing_file_is_io_error() {
            let dir = tempfile::tempdir().expect("failed to create temp dir");
            let err = open(dir.path().join("missing.png")).unwrap_err();
            assert!(matches!(err, HairshadeError::Io(_)));
        }

        #[test]
        fn save_then_open() {
            let dir = tempfile::tempdir().expect("failed to create temp dir");
            let path = dir.path().join("photo.png");
            let pixels = checker(4, 4);
            save(&pixels, &path).unwrap();
            assert_eq!(open(&path).unwrap().as_raw(), pixels.as_raw());
        }

        #[test]
        fn bilinear_mask_resize_keeps_soft_edge() {
            let mut mask = GrayImage::new(2, 1);
            mask.put_pixel(1, 0, Luma([255]));
            let resized = resize_mask(&mask, 8, 1, FilterType::Triangle);
            assert_eq!(resized.dimensions(), (8, 1));
            assert!(resized.pixels().any(|p| p.0[0] > 0 && p.0[0] < 255));
        }

        #[test]
        fn resize_mask_same_size_is_copy() {
            let mask = GrayImage::from_pixel(3, 3, Luma([77]));
            assert_eq!(resize_mask(&mask, 3, 3, FilterType::Nearest), mask);
        }

        #[test]
        fn resize_confidence_changes_dimensions() {
            let plane = ConfidenceImage::from_pixel(4, 4, Luma([0.75]));
            let resized = resize_confidence(&plane, 2, 6, FilterType::Triangle);
            assert_eq!(resized.dimensions(), (2, 6));
            for px in resized.pixels() {
                assert!((px.0[0] - 0.75).abs() < 1e-4);
            }
        }
    }
}
