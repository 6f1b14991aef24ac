use hairshade::HairshadeResult;

use crate::cli::FetchModelCommand;
use crate::model_fetch::{Checksum, ModelSource, default_model_cache_path, install_model};

pub fn run(cmd: FetchModelCommand) -> HairshadeResult<()> {
    let source = source_for(&cmd)?;
    let output = cmd.output.unwrap_or_else(default_model_cache_path);
    install_model(&source, &output, cmd.force)?;
    Ok(())
}

/// Without `--sha256` the digest published next to the model is required.
fn source_for(cmd: &FetchModelCommand) -> HairshadeResult<ModelSource> {
    let checksum = match cmd.sha256.as_deref() {
        Some(hex) => Checksum::pinned(hex)?,
        None => Checksum::Published,
    };
    let mut source = ModelSource {
        checksum,
        ..ModelSource::default()
    };
    if let Some(url) = &cmd.url {
        source.url = url.clone();
    }
    Ok(source)
}
