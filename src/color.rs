use std::fmt;
use std::str::FromStr;

use crate::{HairshadeError, HairshadeResult};

/// A color in hue/saturation/lightness form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsl {
    /// Hue in degrees, `[0, 360)`.
    pub h: f32,
    /// Saturation in percent, `[0, 100]`.
    pub s: f32,
    /// Lightness in percent, `[0, 100]`.
    pub l: f32,
}

impl Hsl {
    pub fn new(h: f32, s: f32, l: f32) -> Self {
        Self { h, s, l }
    }

    pub fn to_rgb(self) -> [u8; 3] {
        hsl_to_rgb(self.h, self.s, self.l)
    }

    /// Format as a `#rrggbb` hex string.
    pub fn to_hex(self) -> String {
        let [r, g, b] = self.to_rgb();
        format!("#{r:02x}{g:02x}{b:02x}")
    }
}

/// Convert 8-bit RGB to HSL.
pub fn rgb_to_hsl(r: u8, g: u8, b: u8) -> Hsl {
    let r = f32::from(r) / 255.0;
    let g = f32::from(g) / 255.0;
    let b = f32::from(b) / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;

    if max == min {
        return Hsl::new(0.0, 0.0, l * 100.0);
    }

    let d = max - min;
    let s = if l > 0.5 {
        d / (2.0 - max - min)
    } else {
        d / (max + min)
    };

    let sector = if max == r {
        (g - b) / d + if g < b { 6.0 } else { 0.0 }
    } else if max == g {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };

    let mut h = sector * 60.0;
    if h >= 360.0 {
        h -= 360.0;
    }
    Hsl::new(h, s * 100.0, l * 100.0)
}

/// Convert HSL back to 8-bit RGB, rounding each channel to the nearest integer.
pub fn hsl_to_rgb(h: f32, s: f32, l: f32) -> [u8; 3] {
    let h = h / 360.0;
    let s = (s / 100.0).clamp(0.0, 1.0);
    let l = (l / 100.0).clamp(0.0, 1.0);

    if s == 0.0 {
        let gray = unit_to_byte(l);
        return [gray, gray, gray];
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    [
        unit_to_byte(hue_to_channel(p, q, h + 1.0 / 3.0)),
        unit_to_byte(hue_to_channel(p, q, h)),
        unit_to_byte(hue_to_channel(p, q, h - 1.0 / 3.0)),
    ]
}

fn hue_to_channel(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 1.0 / 2.0 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

fn unit_to_byte(value: f32) -> u8 {
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Parse a `#RRGGBB` (or bare `RRGGBB`) string into an RGB triple.
pub fn parse_hex(input: &str) -> HairshadeResult<[u8; 3]> {
    let invalid = || HairshadeError::InvalidColorFormat {
        input: input.to_string(),
    };
    let digits = input.trim().strip_prefix('#').unwrap_or(input.trim());
    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&digits[range], 16).map_err(|_| invalid())
    };
    Ok([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

/// Parse a hex color and convert it to HSL.
pub fn hex_to_hsl(input: &str) -> HairshadeResult<Hsl> {
    let [r, g, b] = parse_hex(input)?;
    Ok(rgb_to_hsl(r, g, b))
}

/// The hair color a recolor call shifts towards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorTarget {
    rgb: [u8; 3],
    hsl: Hsl,
}

impl ColorTarget {
    pub fn from_rgb(rgb: [u8; 3]) -> Self {
        let [r, g, b] = rgb;
        Self {
            rgb,
            hsl: rgb_to_hsl(r, g, b),
        }
    }

    pub fn from_hex(input: &str) -> HairshadeResult<Self> {
        parse_hex(input).map(Self::from_rgb)
    }

    pub fn hue(&self) -> f32 {
        self.hsl.h
    }

    pub fn saturation(&self) -> f32 {
        self.hsl.s
    }

    pub fn lightness(&self) -> f32 {
        self.hsl.l
    }

    pub fn hsl(&self) -> Hsl {
        self.hsl
    }

    pub fn rgb(&self) -> [u8; 3] {
        self.rgb
    }
}

impl FromStr for ColorTarget {
    type Err = HairshadeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for ColorTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.rgb;
        write!(f, "#{r:02x}{g:02x}{b:02x}")
    }
}
