use std::fs;

use hairshade::{ColorTarget, HairshadeResult, Intensity, RecolorOptions, io};

use crate::cli::{GlobalOptions, RecolorCommand};

use super::utils::{build_hairshade, derive_variant_path, save_mask};

/// The main function to run the recolor command.
pub async fn run(global: &GlobalOptions, cmd: RecolorCommand) -> HairshadeResult<()> {
    // Parse every color up front so a typo fails before inference runs.
    let targets = cmd
        .colors
        .iter()
        .map(|hex| hex.parse::<ColorTarget>())
        .collect::<HairshadeResult<Vec<_>>>()?;
    if cmd.output.is_some() && targets.len() > 1 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "--output can only be used with a single --color",
        )
        .into());
    }

    let hairshade = build_hairshade(global, &cmd.mask).with_recolor_options(
        RecolorOptions::default().with_lightness_bias(cmd.lightness_bias),
    );
    let provider = hairshade.provider();
    let bytes = fs::read(&cmd.input)?;
    let photo = hairshade.prepare(&provider, &bytes).await?;
    let intensity = Intensity::new(cmd.intensity);

    for target in &targets {
        let recolored = photo.recolor(target, intensity)?;
        let output_path = match &cmd.output {
            Some(path) => path.clone(),
            None => {
                let suffix = target.to_string().trim_start_matches('#').to_string();
                derive_variant_path(&cmd.input, &suffix, "png")
            }
        };
        io::save(&recolored, &output_path)?;
        println!("Recolored ({target}) PNG saved to {}", output_path.display());
    }

    let mask_path = match &cmd.export_mask {
        Some(Some(path)) => Some(path.clone()),
        Some(None) => Some(derive_variant_path(&cmd.input, "hair-mask", "png")),
        None => None,
    };
    if let Some(path) = mask_path {
        save_mask(&photo.mask().mask, &path)?;
        println!("Hair mask PNG saved to {}", path.display());
    }

    Ok(())
}
