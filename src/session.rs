use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use image::{GrayImage, RgbaImage};
use tracing::{debug, info};

use crate::color::ColorTarget;
use crate::config::{MaskInterpretation, RecolorOptions};
use crate::mask::mask_coverage;
use crate::provider::{LazyProvider, ProviderLoader};
use crate::recolor::{Intensity, recolor};
use crate::{HairshadeError, HairshadeResult, io, prepare};

/// A hair mask resampled to the size of its photo.
#[derive(Debug, Clone, PartialEq)]
pub struct HairMask {
    pub mask: GrayImage,
    pub width: u32,
    pub height: u32,
}

impl HairMask {
    pub fn new(mask: GrayImage) -> Self {
        let (width, height) = mask.dimensions();
        Self {
            mask,
            width,
            height,
        }
    }

    /// Fraction of pixels with any hair confidence.
    pub fn coverage(&self) -> f32 {
        mask_coverage(&self.mask)
    }

    pub fn into_inner(self) -> GrayImage {
        self.mask
    }
}

/// Decoded pixels and their hair mask, cached for repeated recolors.
///
/// The pristine pixels are never modified, so every recolor starts from the
/// original photo regardless of earlier calls.
#[derive(Debug, Clone)]
pub struct PreparedPhoto {
    pixels: RgbaImage,
    mask: HairMask,
    options: RecolorOptions,
}

impl PreparedPhoto {
    pub fn new(pixels: RgbaImage, mask: HairMask) -> HairshadeResult<Self> {
        let expected = pixels.dimensions();
        let found = mask.mask.dimensions();
        if expected != found {
            return Err(HairshadeError::DimensionMismatch { expected, found });
        }
        Ok(Self {
            pixels,
            mask,
            options: RecolorOptions::default(),
        })
    }

    pub fn with_recolor_options(mut self, options: RecolorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn mask(&self) -> &HairMask {
        &self.mask
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn recolor(
        &self,
        target: &ColorTarget,
        intensity: impl Into<Intensity>,
    ) -> HairshadeResult<RgbaImage> {
        recolor(
            &self.pixels,
            &self.mask.mask,
            target,
            intensity.into(),
            &self.options,
        )
    }

    pub fn recolor_hex(
        &self,
        hex: &str,
        intensity: impl Into<Intensity>,
    ) -> HairshadeResult<RgbaImage> {
        let target = ColorTarget::from_hex(hex)?;
        self.recolor(&target, intensity)
    }

    /// Encode the untouched photo as PNG.
    pub fn to_displayable(&self) -> HairshadeResult<Vec<u8>> {
        io::to_png(&self.pixels)
    }
}

/// Identifies a preview request; only the most recent one is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewTicket(u64);

/// Holds the current photo of an editing session.
///
/// Loading a new photo or clearing the session invalidates any extraction
/// still in flight; its result is discarded instead of replacing newer state.
pub struct EditSession<L: ProviderLoader> {
    provider: Arc<LazyProvider<L>>,
    interpretation: MaskInterpretation,
    recolor_options: RecolorOptions,
    current: RwLock<Option<Arc<PreparedPhoto>>>,
    generation: AtomicU64,
    latest_preview: AtomicU64,
}

impl<L: ProviderLoader> EditSession<L> {
    pub fn new(provider: Arc<LazyProvider<L>>) -> Self {
        Self {
            provider,
            interpretation: MaskInterpretation::default(),
            recolor_options: RecolorOptions::default(),
            current: RwLock::new(None),
            generation: AtomicU64::new(0),
            latest_preview: AtomicU64::new(0),
        }
    }

    pub fn with_interpretation(mut self, interpretation: MaskInterpretation) -> Self {
        self.interpretation = interpretation;
        self
    }

    pub fn with_recolor_options(mut self, options: RecolorOptions) -> Self {
        self.recolor_options = options;
        self
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Snapshot of the current photo, if any.
    pub fn current(&self) -> Option<Arc<PreparedPhoto>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Decode `bytes`, extract the hair mask and make the result current.
    ///
    /// The previous photo is dropped immediately. If another photo is loaded
    /// or the session is cleared before extraction finishes, this returns
    /// [`HairshadeError::Superseded`] and leaves the newer state in place.
    pub async fn load_photo(&self, bytes: &[u8]) -> HairshadeResult<Arc<PreparedPhoto>> {
        let generation = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            *current = None;
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        debug!(generation, "loading photo");

        let prepared = prepare(&self.provider, bytes, &self.interpretation).await;

        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if self.generation.load(Ordering::SeqCst) != generation {
            info!(generation, "discarding superseded mask extraction");
            return Err(HairshadeError::Superseded { generation });
        }
        let photo = Arc::new(prepared?.with_recolor_options(self.recolor_options));
        *current = Some(Arc::clone(&photo));
        Ok(photo)
    }

    /// Drop the current photo and abandon any extraction in flight.
    pub fn clear(&self) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = None;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(generation, "session cleared");
    }

    /// Recolor the current photo.
    pub fn recolor(
        &self,
        target: &ColorTarget,
        intensity: impl Into<Intensity>,
    ) -> HairshadeResult<RgbaImage> {
        let photo = self.current().ok_or(HairshadeError::NoPhotoLoaded)?;
        photo.recolor(target, intensity)
    }

    pub fn begin_preview(&self) -> PreviewTicket {
        PreviewTicket(self.latest_preview.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Hand back `result` only if `ticket` is the latest preview request.
    pub fn finish_preview<T>(&self, ticket: PreviewTicket, result: T) -> Option<T> {
        if self.latest_preview.load(Ordering::SeqCst) == ticket.0 {
            Some(result)
        } else {
            debug!(ticket = ticket.0, "dropping stale preview");
            None
        }
    }

    /// Recolor on the blocking pool; `Ok(None)` means a newer preview was requested meanwhile.
    pub async fn preview(
        &self,
        target: ColorTarget,
        intensity: Intensity,
    ) -> HairshadeResult<Option<RgbaImage>> {
        let ticket = self.begin_preview();
        let photo = self.current().ok_or(HairshadeError::NoPhotoLoaded)?;
        let image = tokio::task::spawn_blocking(move || photo.recolor(&target, intensity))
            .await
            .map_err(std::io::Error::other)??;
        Ok(self.finish_preview(ticket, image))
    }
}
