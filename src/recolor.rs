use image::{GrayImage, Rgba, RgbaImage};
use tracing::{debug, error};

use crate::color::{ColorTarget, hsl_to_rgb, rgb_to_hsl};
use crate::config::RecolorOptions;
use crate::{HairshadeError, HairshadeResult};

/// How strongly the target color replaces the original, in percent.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Intensity(f32);

impl Intensity {
    pub const NONE: Intensity = Intensity(0.0);
    pub const FULL: Intensity = Intensity(100.0);

    /// Create an intensity, clamping to `[0, 100]`. NaN becomes zero.
    pub fn new(percent: f32) -> Self {
        if percent.is_nan() {
            return Self::NONE;
        }
        Self(percent.clamp(0.0, 100.0))
    }

    pub fn percent(self) -> f32 {
        self.0
    }

    /// The intensity as a fraction in `[0, 1]`.
    pub fn fraction(self) -> f32 {
        self.0 / 100.0
    }
}

impl Default for Intensity {
    fn default() -> Self {
        Self(85.0)
    }
}

impl From<f32> for Intensity {
    fn from(percent: f32) -> Self {
        Self::new(percent)
    }
}

impl From<u8> for Intensity {
    fn from(percent: u8) -> Self {
        Self::new(f32::from(percent))
    }
}

/// Recolor the masked hair pixels of `original` towards `target`.
///
/// Returns a new buffer; `original` is never modified. Pixels with a mask
/// weight of zero are copied byte for byte, and alpha is always passed through.
pub fn recolor(
    original: &RgbaImage,
    mask: &GrayImage,
    target: &ColorTarget,
    intensity: Intensity,
    options: &RecolorOptions,
) -> HairshadeResult<RgbaImage> {
    let expected = original.dimensions();
    let found = mask.dimensions();
    if expected != found {
        error!(?expected, ?found, "mask does not match pixel buffer");
        return Err(HairshadeError::DimensionMismatch { expected, found });
    }

    debug!(
        %target,
        intensity = intensity.percent(),
        lightness_bias = options.lightness_bias(),
        width = expected.0,
        height = expected.1,
        "recoloring hair"
    );

    let strength = intensity.fraction();
    let mut out = RgbaImage::new(expected.0, expected.1);
    for ((src, weight), dst) in original.pixels().zip(mask.pixels()).zip(out.pixels_mut()) {
        *dst = recolor_pixel(*src, weight[0], target, strength, options.lightness_bias());
    }
    Ok(out)
}

/// Parse `hex` and recolor with default options.
pub fn recolor_hex(
    original: &RgbaImage,
    mask: &GrayImage,
    hex: &str,
    intensity: impl Into<Intensity>,
) -> HairshadeResult<RgbaImage> {
    let target = ColorTarget::from_hex(hex)?;
    recolor(
        original,
        mask,
        &target,
        intensity.into(),
        &RecolorOptions::default(),
    )
}

/// Recolor one pixel. `strength` is the intensity fraction, `weight` the mask byte.
pub fn recolor_pixel(
    pixel: Rgba<u8>,
    weight: u8,
    target: &ColorTarget,
    strength: f32,
    lightness_bias: f32,
) -> Rgba<u8> {
    if weight == 0 {
        return pixel;
    }
    let blend = strength * f32::from(weight) / 255.0;
    if blend <= 0.0 {
        return pixel;
    }

    let [r, g, b, a] = pixel.0;
    let orig = rgb_to_hsl(r, g, b);
    let saturation = (target.saturation() * blend + orig.s * (1.0 - blend)).min(100.0);
    let lightness = orig.l + lightness_bias * blend * (target.lightness() - orig.l);
    let colored = hsl_to_rgb(target.hue(), saturation, lightness);

    let mix = |new: u8, old: u8| {
        (f32::from(new) * blend + f32::from(old) * (1.0 - blend))
            .round()
            .clamp(0.0, 255.0) as u8
    };
    Rgba([
        mix(colored[0], r),
        mix(colored[1], g),
        mix(colored[2], b),
        a,
    ])
}
