use std::sync::{Arc, Mutex, PoisonError};

use image::RgbImage;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::{HairshadeError, HairshadeResult};

/// One confidence plane returned by a segmentation model.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationChannel {
    /// Class label, when the model names its outputs.
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    /// Row-major confidences in `[0, 1]`, `width * height` values.
    pub data: Vec<f32>,
}

impl SegmentationChannel {
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Self {
        Self {
            label: None,
            width,
            height,
            data,
        }
    }

    pub fn labeled(label: impl Into<String>, width: u32, height: u32, data: Vec<f32>) -> Self {
        Self {
            label: Some(label.into()),
            width,
            height,
            data,
        }
    }

    /// Check that the data length agrees with the stated dimensions.
    pub fn validate(&self) -> HairshadeResult<()> {
        let expected = self.width as usize * self.height as usize;
        if self.data.len() != expected || expected == 0 {
            return Err(HairshadeError::InvalidChannel {
                width: self.width,
                height: self.height,
                len: self.data.len(),
            });
        }
        Ok(())
    }
}

/// A model that splits a photo into labeled confidence channels.
///
/// Implementations are blocking and CPU-bound; async callers go through
/// [`LazyProvider::segment`], which runs them on the blocking pool.
pub trait SegmentationProvider: Send + Sync + 'static {
    fn segment(&self, image: &RgbImage) -> HairshadeResult<Vec<SegmentationChannel>>;
}

/// Builds a provider, typically by loading model weights from disk.
pub trait ProviderLoader: Send + Sync + 'static {
    type Provider: SegmentationProvider;

    fn load(&self) -> HairshadeResult<Self::Provider>;
}

/// Where a [`LazyProvider`] is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderStatus {
    Uninitialized,
    Loading,
    Ready,
    /// The last load attempt failed; the next [`LazyProvider::get`] retries.
    Failed(String),
}

/// Loads a provider once and shares it.
pub struct LazyProvider<L: ProviderLoader> {
    loader: Arc<L>,
    cell: OnceCell<Arc<L::Provider>>,
    status: Mutex<ProviderStatus>,
}

impl<L: ProviderLoader> LazyProvider<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader: Arc::new(loader),
            cell: OnceCell::new(),
            status: Mutex::new(ProviderStatus::Uninitialized),
        }
    }

    pub fn status(&self) -> ProviderStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_status(&self, status: ProviderStatus) {
        debug!(?status, "segmentation provider status");
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    /// Return the loaded provider, loading it first if needed.
    ///
    /// Concurrent callers share a single load. A failed load leaves the provider
    /// unloaded and is reported as [`HairshadeError::ModelUnavailable`], except a
    /// missing model file, which stays [`HairshadeError::ModelNotFound`].
    pub async fn get(&self) -> HairshadeResult<Arc<L::Provider>> {
        let provider = self
            .cell
            .get_or_try_init(|| async {
                self.set_status(ProviderStatus::Loading);
                let loader = Arc::clone(&self.loader);
                let loaded = tokio::task::spawn_blocking(move || loader.load())
                    .await
                    .map_err(|err| HairshadeError::ModelUnavailable(err.to_string()))
                    .and_then(|result| result);

                match loaded {
                    Ok(provider) => {
                        info!("segmentation model loaded");
                        self.set_status(ProviderStatus::Ready);
                        Ok(Arc::new(provider))
                    }
                    Err(err) => {
                        warn!(error = %err, "segmentation model failed to load");
                        self.set_status(ProviderStatus::Failed(err.to_string()));
                        Err(match err {
                            passthrough @ (HairshadeError::ModelUnavailable(_)
                            | HairshadeError::ModelNotFound { .. }) => passthrough,
                            other => HairshadeError::ModelUnavailable(other.to_string()),
                        })
                    }
                }
            })
            .await?;
        Ok(Arc::clone(provider))
    }

    /// Load the provider if needed and segment `image` on the blocking pool.
    pub async fn segment(&self, image: Arc<RgbImage>) -> HairshadeResult<Vec<SegmentationChannel>> {
        let provider = self.get().await?;
        tokio::task::spawn_blocking(move || provider.segment(&image))
            .await
            .map_err(|err| HairshadeError::ModelUnavailable(err.to_string()))?
    }
}

/// A loader for providers that are already constructed, e.g. in tests.
pub struct Preloaded<P>(Mutex<Option<P>>);

impl<P> Preloaded<P> {
    pub fn new(provider: P) -> Self {
        Self(Mutex::new(Some(provider)))
    }
}

impl<P: SegmentationProvider> ProviderLoader for Preloaded<P> {
    type Provider = P;

    fn load(&self) -> HairshadeResult<P> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| HairshadeError::ModelUnavailable("provider already taken".into()))
    }
}
