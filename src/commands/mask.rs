use std::fs;

use hairshade::{HairshadeResult, MaskFill, io, mask_overlay};
use tracing::info;

use crate::cli::{GlobalOptions, MaskCommand};

use super::utils::{build_hairshade, derive_variant_path, save_mask};

/// The main function to run the mask command.
pub async fn run(global: &GlobalOptions, cmd: MaskCommand) -> HairshadeResult<()> {
    let hairshade = build_hairshade(global, &cmd.mask);
    let provider = hairshade.provider();
    let bytes = fs::read(&cmd.input)?;
    let photo = hairshade.prepare(&provider, &bytes).await?;
    info!(coverage = photo.mask().coverage(), "hair mask extracted");

    let output_path = cmd
        .output
        .clone()
        .unwrap_or_else(|| derive_variant_path(&cmd.input, "hair-mask", "png"));
    save_mask(&photo.mask().mask, &output_path)?;
    println!("Hair mask PNG saved to {}", output_path.display());

    let overlay_path = match &cmd.overlay {
        Some(Some(path)) => Some(path.clone()),
        Some(None) => Some(derive_variant_path(&cmd.input, "hair-overlay", "png")),
        None => None,
    };
    if let Some(path) = overlay_path {
        let overlay = mask_overlay(photo.pixels(), &photo.mask().mask, MaskFill::default())?;
        io::save(&overlay, &path)?;
        println!("Hair overlay PNG saved to {}", path.display());
    }

    Ok(())
}
