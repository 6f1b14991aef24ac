use std::path::PathBuf;

use image::imageops::FilterType;

/// Environment variable that overrides the default model path.
pub const ENV_MODEL_PATH: &str = "HAIRSHADE_MODEL";

/// Labels emitted by the CelebAMask-HQ face-parsing model, in output-channel order.
pub const FACE_PARSING_LABELS: [&str; 19] = [
    "background",
    "skin",
    "nose",
    "eye_g",
    "l_eye",
    "r_eye",
    "l_brow",
    "r_brow",
    "l_ear",
    "r_ear",
    "mouth",
    "u_lip",
    "l_lip",
    "hair",
    "hat",
    "ear_r",
    "neck_l",
    "neck",
    "cloth",
];

/// Options for the segmentation model and input image.
#[derive(Debug, Clone)]
pub struct InferenceSettings {
    /// Path to the ONNX model file.
    pub model_path: PathBuf,
    /// Filter to use when resizing the photo for the model.
    pub input_resize_filter: FilterType,
    /// Number of intra-op threads for the inference.
    pub intra_threads: Option<usize>,
    /// Labels for the model's output channels, in order.
    pub labels: Vec<String>,
}

impl InferenceSettings {
    /// Create new inference settings with default values.
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            input_resize_filter: FilterType::Triangle,
            intra_threads: None,
            labels: FACE_PARSING_LABELS.iter().map(|l| l.to_string()).collect(),
        }
    }

    /// Set the model resize filter.
    pub fn with_model_filter(mut self, filter: FilterType) -> Self {
        self.input_resize_filter = filter;
        self
    }

    /// Set the number of intra-op threads for the inference.
    pub fn with_intra_threads(mut self, intra_threads: Option<usize>) -> Self {
        self.intra_threads = intra_threads;
        self
    }

    /// Override the output channel labels.
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }
}

/// Which of the provider's channels holds the hair confidence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HairChannelSelector {
    /// The channel whose label matches, ignoring ASCII case.
    Label(String),
    /// The channel at this position.
    Index(usize),
    /// A `hair` label when labels exist; otherwise a lone channel, or the second of two.
    #[default]
    Auto,
}

/// How confidence values are turned into blend weights.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MaskMode {
    /// Pass confidence through, keeping antialiased hairline edges.
    #[default]
    Soft,
    /// Values above `threshold` become 255, everything else 0.
    Binary { threshold: u8 },
}

/// Options describing how the provider output becomes a confidence mask.
#[derive(Debug, Clone)]
pub struct MaskInterpretation {
    pub selector: HairChannelSelector,
    pub mode: MaskMode,
    /// A channel needs at least one pixel at or above this confidence to count as hair.
    pub detection_threshold: f32,
    /// Gaussian feathering applied after resampling, if any.
    pub feather_sigma: Option<f32>,
    /// Filter used when resampling the mask to the photo resolution.
    pub resize_filter: FilterType,
}

impl Default for MaskInterpretation {
    fn default() -> Self {
        Self {
            selector: HairChannelSelector::Auto,
            mode: MaskMode::Soft,
            detection_threshold: 0.5,
            feather_sigma: None,
            resize_filter: FilterType::Triangle,
        }
    }
}

impl MaskInterpretation {
    pub fn with_selector(mut self, selector: HairChannelSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_mode(mut self, mode: MaskMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the detection threshold, clamped to `[0, 1]`. NaN keeps the 0.5 default.
    pub fn with_detection_threshold(mut self, threshold: f32) -> Self {
        self.detection_threshold = unit_interval_or(threshold, 0.5);
        self
    }

    pub fn with_feather(mut self, sigma: Option<f32>) -> Self {
        self.feather_sigma = sigma;
        self
    }

    pub fn with_resize_filter(mut self, filter: FilterType) -> Self {
        self.resize_filter = filter;
        self
    }
}

/// Clamp `value` to `[0, 1]`, replacing NaN with `fallback`.
pub(crate) fn unit_interval_or(value: f32, fallback: f32) -> f32 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Upper bound for [`RecolorOptions::lightness_bias`].
pub const MAX_LIGHTNESS_BIAS: f32 = 0.2;

/// Tunables for the recolor blend.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RecolorOptions {
    /// Fraction of the gap to the target lightness applied at full blend.
    /// Zero keeps the original lightness, preserving shading and texture.
    lightness_bias: f32,
}

impl RecolorOptions {
    /// Set the lightness bias, clamped to `[0, MAX_LIGHTNESS_BIAS]`.
    pub fn with_lightness_bias(mut self, bias: f32) -> Self {
        self.lightness_bias = if bias.is_finite() {
            bias.clamp(0.0, MAX_LIGHTNESS_BIAS)
        } else {
            0.0
        };
        self
    }

    pub fn lightness_bias(&self) -> f32 {
        self.lightness_bias
    }
}
