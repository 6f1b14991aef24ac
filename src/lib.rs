pub mod color;
pub mod config;
pub mod error;
pub mod inference;
pub mod io;
pub mod mask;
pub mod overlay;
pub mod provider;
pub mod recolor;
pub mod session;

pub use color::{ColorTarget, Hsl, hex_to_hsl, hsl_to_rgb, rgb_to_hsl};
pub use config::{
    ENV_MODEL_PATH, FACE_PARSING_LABELS, HairChannelSelector, InferenceSettings,
    MaskInterpretation, MaskMode, RecolorOptions,
};
pub use error::{ErrorKind, HairshadeError, HairshadeResult};
pub use inference::{OnnxFaceParser, OnnxModelLoader};
pub use overlay::{MaskFill, hair_cutout, mask_overlay};
pub use provider::{
    LazyProvider, Preloaded, ProviderLoader, ProviderStatus, SegmentationChannel,
    SegmentationProvider,
};
pub use recolor::{Intensity, recolor, recolor_hex};
pub use session::{EditSession, HairMask, PreparedPhoto, PreviewTicket};

use std::path::PathBuf;
use std::sync::Arc;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, RgbaImage};

/// Row-major RGBA pixels of a decoded photo.
pub type PixelBuffer = RgbaImage;

/// 8-bit hair confidence, one byte per pixel.
pub type ConfidenceMask = GrayImage;

/// Entry point for configuring hair segmentation and recoloring.
#[derive(Debug, Clone)]
pub struct Hairshade {
    /// Model location and how images are fed to it.
    settings: InferenceSettings,
    /// How the model output becomes a hair mask.
    interpretation: MaskInterpretation,
    recolor_options: RecolorOptions,
}

impl Hairshade {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            settings: InferenceSettings::new(model_path),
            interpretation: MaskInterpretation::default(),
            recolor_options: RecolorOptions::default(),
        }
    }

    /// Set the filter used to resize the input image for the model.
    pub fn with_model_filter(mut self, filter: FilterType) -> Self {
        self.settings = self.settings.with_model_filter(filter);
        self
    }

    /// Set the filter used to resize the mask to the photo size.
    pub fn with_mask_filter(mut self, filter: FilterType) -> Self {
        self.interpretation = self.interpretation.with_resize_filter(filter);
        self
    }

    /// Set the number of intra-op threads for the inference.
    pub fn with_intra_threads(mut self, intra_threads: Option<usize>) -> Self {
        self.settings = self.settings.with_intra_threads(intra_threads);
        self
    }

    /// Replace the class labels attached to the model's output channels.
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings = self.settings.with_labels(labels);
        self
    }

    pub fn with_interpretation(mut self, interpretation: MaskInterpretation) -> Self {
        self.interpretation = interpretation;
        self
    }

    pub fn with_recolor_options(mut self, options: RecolorOptions) -> Self {
        self.recolor_options = options;
        self
    }

    pub fn settings(&self) -> &InferenceSettings {
        &self.settings
    }

    pub fn interpretation(&self) -> &MaskInterpretation {
        &self.interpretation
    }

    pub fn recolor_options(&self) -> &RecolorOptions {
        &self.recolor_options
    }

    /// A provider that loads the ONNX model on first use.
    pub fn provider(&self) -> LazyProvider<OnnxModelLoader> {
        LazyProvider::new(OnnxModelLoader::new(self.settings.clone()))
    }

    /// An editing session backed by `provider`, using this configuration.
    pub fn session<L: ProviderLoader>(&self, provider: Arc<LazyProvider<L>>) -> EditSession<L> {
        EditSession::new(provider)
            .with_interpretation(self.interpretation.clone())
            .with_recolor_options(self.recolor_options)
    }

    /// Decode `bytes` and extract its hair mask with this configuration.
    pub async fn prepare<L: ProviderLoader>(
        &self,
        provider: &LazyProvider<L>,
        bytes: &[u8],
    ) -> HairshadeResult<PreparedPhoto> {
        let photo = prepare(provider, bytes, &self.interpretation).await?;
        Ok(photo.with_recolor_options(self.recolor_options))
    }
}

/// Segment `photo` and return its hair mask at the photo's resolution.
pub async fn extract_mask<L: ProviderLoader>(
    provider: &LazyProvider<L>,
    photo: &RgbaImage,
    options: &MaskInterpretation,
) -> HairshadeResult<HairMask> {
    let (width, height) = photo.dimensions();
    let rgb = Arc::new(DynamicImage::ImageRgba8(photo.clone()).into_rgb8());
    let channels = provider.segment(rgb).await?;
    let mask = mask::interpret(&channels, options, width, height)?;
    Ok(HairMask::new(mask))
}

/// Decode an encoded photo and pair it with its hair mask.
pub async fn prepare<L: ProviderLoader>(
    provider: &LazyProvider<L>,
    bytes: &[u8],
    options: &MaskInterpretation,
) -> HairshadeResult<PreparedPhoto> {
    let pixels = io::decode_native(bytes)?;
    let mask = extract_mask(provider, &pixels, options).await?;
    PreparedPhoto::new(pixels, mask)
}
