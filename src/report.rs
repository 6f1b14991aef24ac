use hairshade::{ErrorKind, HairshadeError};

pub fn report_error(err: &HairshadeError) {
    match err {
        HairshadeError::ModelNotFound { path } => {
            eprintln!("Model file not found: {}", path.display());
            eprintln!();
            eprintln!("Please specify the face-parsing model path:");
            eprintln!("  - Use --model <path>");
            eprintln!(
                "  - Or set environment variable {} to your model path",
                hairshade::ENV_MODEL_PATH
            );
            #[cfg(feature = "fetch-model")]
            {
                eprintln!();
                eprintln!("Or run `hairshade fetch-model` to download automatically.");
            }
        }
        HairshadeError::InvalidColorFormat { input } => {
            eprintln!("`{input}` is not a color.");
            eprintln!("Pass colors as six hex digits, e.g. --color '#8b4513' or --color 8b4513.");
        }
        _ if err.kind() == ErrorKind::Retryable => {
            eprintln!("{err}");
            eprintln!("This may be temporary; try again.");
        }
        _ => {
            eprintln!("{err}");
        }
    }
}
