use image::{GrayImage, Rgba, RgbaImage};

use crate::{HairshadeError, HairshadeResult};

/// How mask values drive the alpha of a tint layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaskAlphaMode {
    /// Use the mask value directly as alpha.
    UseMask,
    /// Scale the mask value by a factor; results above 255 are clamped.
    Scale(f32),
}

/// A tint applied to mask-covered pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskFill {
    /// RGBA tint; A acts as a global opacity multiplier.
    pub color: [u8; 4],
    pub alpha_mode: MaskAlphaMode,
}

impl MaskFill {
    pub fn new(color: [u8; 4]) -> Self {
        Self {
            color,
            alpha_mode: MaskAlphaMode::UseMask,
        }
    }

    pub fn with_alpha_mode(mut self, alpha_mode: MaskAlphaMode) -> Self {
        self.alpha_mode = alpha_mode;
        self
    }
}

impl Default for MaskFill {
    /// Half-opaque magenta, which rarely occurs in hair.
    fn default() -> Self {
        Self::new([255, 0, 255, 128])
    }
}

fn resolve_mask_alpha(mask_value: u8, mode: MaskAlphaMode) -> u8 {
    match mode {
        MaskAlphaMode::UseMask => mask_value,
        MaskAlphaMode::Scale(scale) => {
            let scaled = f32::from(mask_value) * scale.max(0.0);
            scaled.round().clamp(0.0, 255.0) as u8
        }
    }
}

/// Turn a mask into a tinted RGBA layer.
/// Final alpha = mask-derived alpha × `color[3]` / 255.
pub fn tint_layer(mask: &GrayImage, fill: MaskFill) -> RgbaImage {
    let (w, h) = mask.dimensions();
    let [r, g, b, base_alpha] = fill.color;

    let mut out = RgbaImage::new(w, h);
    for (mask_px, out_px) in mask.pixels().zip(out.pixels_mut()) {
        let mask_alpha = resolve_mask_alpha(mask_px[0], fill.alpha_mode);
        let alpha = ((u16::from(mask_alpha) * u16::from(base_alpha)) / 255) as u8;
        *out_px = Rgba([r, g, b, alpha]);
    }
    out
}

/// Alpha composite `top` over `bottom` (Porter-Duff over).
pub fn alpha_composite(bottom: &RgbaImage, top: &RgbaImage) -> RgbaImage {
    let (w, h) = bottom.dimensions();
    let mut out = RgbaImage::new(w, h);

    for ((bg_px, fg_px), out_px) in bottom.pixels().zip(top.pixels()).zip(out.pixels_mut()) {
        let fg_a = f32::from(fg_px[3]) / 255.0;
        let bg_a = f32::from(bg_px[3]) / 255.0;
        let out_a = fg_a + bg_a * (1.0 - fg_a);

        let mut rgba = [0u8; 4];
        if out_a > 0.0 {
            let fg_weight = fg_a / out_a;
            let bg_weight = (bg_a * (1.0 - fg_a)) / out_a;
            for c in 0..3 {
                let blended = f32::from(fg_px[c]) * fg_weight + f32::from(bg_px[c]) * bg_weight;
                rgba[c] = blended.round().clamp(0.0, 255.0) as u8;
            }
        }
        rgba[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
        *out_px = Rgba(rgba);
    }
    out
}

/// Draw the mask as a tint over the photo.
pub fn mask_overlay(
    pixels: &RgbaImage,
    mask: &GrayImage,
    fill: MaskFill,
) -> HairshadeResult<RgbaImage> {
    let expected = pixels.dimensions();
    let found = mask.dimensions();
    if expected != found {
        return Err(HairshadeError::DimensionMismatch { expected, found });
    }
    Ok(alpha_composite(pixels, &tint_layer(mask, fill)))
}

/// Cut the hair out of the photo, using the mask as alpha.
pub fn hair_cutout(pixels: &RgbaImage, mask: &GrayImage) -> HairshadeResult<RgbaImage> {
    let expected = pixels.dimensions();
    let found = mask.dimensions();
    if expected != found {
        return Err(HairshadeError::DimensionMismatch { expected, found });
    }

    let mut out = RgbaImage::new(expected.0, expected.1);
    for ((src, m), dst) in pixels.pixels().zip(mask.pixels()).zip(out.pixels_mut()) {
        let alpha = (u16::from(src[3]) * u16::from(m[0]) / 255) as u8;
        *dst = Rgba([src[0], src[1], src[2], alpha]);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn gray_image(w: u32, h: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(w, h, Luma([value]))
    }

    fn rgba_image(w: u32, h: u32, color: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba(color))
    }

    mod resolve_mask_alpha {
        use super::*;

        #[test]
        fn use_mask_passes_through() {
            assert_eq!(resolve_mask_alpha(0, MaskAlphaMode::UseMask), 0);
            assert_eq!(resolve_mask_alpha(128, MaskAlphaMode::UseMask), 128);
        }

        #[test]
        fn scale_clamps_overflow() {
            assert_eq!(resolve_mask_alpha(200, MaskAlphaMode::Scale(0.5)), 100);
            assert_eq!(resolve_mask_alpha(200, MaskAlphaMode::Scale(2.0)), 255);
            assert_eq!(resolve_mask_alpha(200, MaskAlphaMode::Scale(-1.0)), 0);
        }
    }

    mod unit {
        use super::*;

        #[test]
        fn tint_layer_multiplies_base_alpha() {
            let layer = tint_layer(&gray_image(1, 1, 255), MaskFill::new([1, 2, 3, 128]));
            assert_eq!(layer.get_pixel(0, 0).0, [1, 2, 3, 128]);
        }

        #[test]
        fn opaque_over_anything_is_top() {
            let bottom = rgba_image(1, 1, [10, 20, 30, 255]);
            let top = rgba_image(1, 1, [200, 100, 50, 255]);
            assert_eq!(alpha_composite(&bottom, &top).get_pixel(0, 0).0, [200, 100, 50, 255]);
        }

        #[test]
        fn overlay_leaves_unmasked_pixels() {
            let photo = rgba_image(2, 1, [10, 20, 30, 255]);
            let mut hair = gray_image(2, 1, 0);
            hair.put_pixel(1, 0, Luma([255]));
            let out = mask_overlay(&photo, &hair, MaskFill::default()).unwrap();
            assert_eq!(out.get_pixel(0, 0).0, [10, 20, 30, 255]);
            assert_ne!(out.get_pixel(1, 0).0, [10, 20, 30, 255]);
        }

        #[test]
        fn overlay_size_mismatch() {
            let err = mask_overlay(&rgba_image(2, 2, [0; 4]), &gray_image(1, 1, 0), MaskFill::default())
                .unwrap_err();
            assert!(matches!(err, HairshadeError::DimensionMismatch { .. }));
        }

        #[test]
        fn cutout_uses_mask_as_alpha() {
            let photo = rgba_image(1, 1, [100, 150, 200, 255]);
            let out = hair_cutout(&photo, &gray_image(1, 1, 85)).unwrap();
            assert_eq!(out.get_pixel(0, 0).0, [100, 150, 200, 85]);
        }
    }
}
