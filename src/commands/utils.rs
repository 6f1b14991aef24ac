use std::path::{Path, PathBuf};

use hairshade::{Hairshade, HairshadeError, HairshadeResult, MaskInterpretation};
use image::GrayImage;

use crate::cli::{GlobalOptions, MaskArgs};

const LOCAL_MODEL: &str = "model.onnx";

/// The convenience function to build a Hairshade instance with the input global and mask options.
pub fn build_hairshade(global: &GlobalOptions, mask_args: &MaskArgs) -> Hairshade {
    let interpretation: MaskInterpretation = mask_args.into();
    Hairshade::new(resolve_model_path(global.model.clone()))
        .with_model_filter(global.model_filter.into())
        .with_intra_threads(global.intra_threads)
        .with_interpretation(interpretation)
        .with_mask_filter(global.mask_filter.into())
}

/// Pick the model: `--model` or the environment variable, then `./model.onnx`, then the cached model.
pub fn resolve_model_path(explicit: Option<PathBuf>) -> PathBuf {
    select_model_path(explicit, Path::new(LOCAL_MODEL), cached_model_path())
}

#[cfg(feature = "fetch-model")]
fn cached_model_path() -> Option<PathBuf> {
    Some(crate::model_fetch::default_model_cache_path())
}

#[cfg(not(feature = "fetch-model"))]
fn cached_model_path() -> Option<PathBuf> {
    None
}

fn select_model_path(explicit: Option<PathBuf>, local: &Path, cached: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    if local.exists() {
        return local.to_path_buf();
    }
    match cached {
        Some(path) if path.exists() => path,
        // Keep the local name so the not-found report points at it.
        _ => local.to_path_buf(),
    }
}

/// Derive a variant file path by appending a suffix before the extension.
pub fn derive_variant_path(input: &Path, suffix: &str, extension: &str) -> PathBuf {
    let mut derived = input.to_path_buf();
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| suffix.to_string());
    let filename = format!("{}-{}.{}", stem, suffix, extension);
    derived.set_file_name(filename);
    derived
}

/// Save a mask as a grayscale image.
pub fn save_mask(mask: &GrayImage, path: &Path) -> HairshadeResult<()> {
    mask.save(path).map_err(HairshadeError::Encode)
}
