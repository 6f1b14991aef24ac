#[cfg(feature = "fetch-model")]
mod fetch_model;
mod mask;
mod recolor;
mod utils;

use crate::cli::{Cli, Commands, GlobalOptions};
use hairshade::HairshadeResult;

/// The main function to run the command based on CLI input.
pub async fn run(cli: Cli) -> HairshadeResult<()> {
    let Cli { global, command } = cli;
    dispatch(&global, command).await
}

/// Dispatch the command to the appropriate handler.
async fn dispatch(global: &GlobalOptions, command: Commands) -> HairshadeResult<()> {
    match command {
        Commands::Mask(cmd) => mask::run(global, cmd).await,
        Commands::Recolor(cmd) => recolor::run(global, cmd).await,
        #[cfg(feature = "fetch-model")]
        Commands::FetchModel(cmd) => fetch_model::run(cmd),
    }
}
