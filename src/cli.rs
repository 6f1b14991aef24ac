use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use hairshade::mask::HALF_CONFIDENCE;
use hairshade::{HairChannelSelector, MaskInterpretation, MaskMode};
use image::imageops::FilterType;

/// Command line interface definition.
#[derive(Parser, Debug)]
#[command(author, version, about, propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug)]
pub struct GlobalOptions {
    /// ONNX face-parsing model path (falls back to ./model.onnx, then the cached model)
    #[arg(short = 'm', long, env = hairshade::ENV_MODEL_PATH, global = true)]
    pub model: Option<PathBuf>,
    /// Intra-op thread count for ORT (None to let ORT decide)
    #[arg(long, global = true)]
    pub intra_threads: Option<usize>,
    /// Filter used when resizing the photo before inference
    #[arg(long = "model-filter", value_enum, default_value_t = ResampleFilter::Triangle, global = true)]
    pub model_filter: ResampleFilter,
    /// Filter used when resizing the hair mask to the photo resolution
    #[arg(long = "mask-filter", value_enum, default_value_t = ResampleFilter::Triangle, global = true)]
    pub mask_filter: ResampleFilter,
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export the detected hair mask as a PNG
    Mask(MaskCommand),
    /// Recolor the hair and export one PNG per color
    Recolor(RecolorCommand),
    /// Download the face-parsing model into the user cache directory
    #[cfg(feature = "fetch-model")]
    FetchModel(FetchModelCommand),
}

/// Resampling filters for image resizing.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ResampleFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResampleFilter> for FilterType {
    /// Convert ResampleFilter to image::imageops::FilterType.
    fn from(value: ResampleFilter) -> Self {
        match value {
            ResampleFilter::Nearest => FilterType::Nearest,
            ResampleFilter::Triangle => FilterType::Triangle,
            ResampleFilter::CatmullRom => FilterType::CatmullRom,
            ResampleFilter::Gaussian => FilterType::Gaussian,
            ResampleFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

#[derive(Args, Debug)]
pub struct MaskCommand {
    /// Input photo path
    pub input: PathBuf,
    /// Output path (defaults to `<name>-hair-mask.png`)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Also save the mask tinted over the photo
    #[arg(long, value_name = "PATH", num_args = 0..=1)]
    pub overlay: Option<Option<PathBuf>>,
    #[command(flatten)]
    pub mask: MaskArgs,
}

#[derive(Args, Debug)]
pub struct RecolorCommand {
    /// Input photo path
    pub input: PathBuf,
    /// Target hair color as #RRGGBB; repeat to render several colors from one mask
    #[arg(short, long = "color", value_name = "HEX", required = true, action = ArgAction::Append)]
    pub colors: Vec<String>,
    /// Recolor strength in percent
    #[arg(short, long, default_value_t = 85.0, value_parser = parse_percent)]
    pub intensity: f32,
    /// How far lightness moves towards the target (0.0-0.2)
    #[arg(long = "lightness-bias", default_value_t = 0.0)]
    pub lightness_bias: f32,
    /// Output path; only valid with a single color (defaults to `<name>-<hex>.png`)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Also save the hair mask
    #[arg(long = "export-mask", value_name = "PATH", num_args = 0..=1)]
    pub export_mask: Option<Option<PathBuf>>,
    #[command(flatten)]
    pub mask: MaskArgs,
}

#[derive(Args, Debug)]
pub struct MaskArgs {
    /// Hair channel by label or index (defaults to the `hair` label)
    #[arg(long = "hair-channel", value_name = "LABEL|INDEX", value_parser = parse_hair_channel)]
    pub hair_channel: Option<HairChannelSelector>,
    /// Minimum peak confidence (0.0-1.0) for hair to count as detected
    #[arg(long = "detection-threshold", default_value_t = 0.5, value_parser = parse_unit_interval)]
    pub detection_threshold: f32,
    /// Threshold the mask into hard hair/background pixels
    #[arg(long)]
    pub binary: bool,
    /// Threshold used by --binary (0-255 or 0.0-1.0); values strictly above it are hair
    #[arg(long = "mask-threshold", default_value_t = HALF_CONFIDENCE, value_parser = parse_mask_threshold)]
    pub mask_threshold: u8,
    /// Gaussian sigma used to feather the mask edge
    #[arg(long)]
    pub feather: Option<f32>,
}

impl From<&MaskArgs> for MaskInterpretation {
    fn from(args: &MaskArgs) -> Self {
        let mode = if args.binary {
            MaskMode::Binary {
                threshold: args.mask_threshold,
            }
        } else {
            MaskMode::Soft
        };
        MaskInterpretation::default()
            .with_selector(args.hair_channel.clone().unwrap_or_default())
            .with_detection_threshold(args.detection_threshold)
            .with_mode(mode)
            .with_feather(args.feather)
    }
}

#[cfg(feature = "fetch-model")]
#[derive(Args, Debug)]
pub struct FetchModelCommand {
    /// Where to save the model (defaults to the user cache directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Overwrite an existing model file
    #[arg(long)]
    pub force: bool,
    /// Download from this URL instead of the default face-parsing model
    #[arg(long)]
    pub url: Option<String>,
    /// Expected SHA-256 of the download (64 hex digits); without it the digest
    /// the host publishes for the file is required
    #[arg(long)]
    pub sha256: Option<String>,
}

fn parse_hair_channel(value: &str) -> Result<HairChannelSelector, String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("hair channel must be a label or an index".to_string());
    }
    Ok(match value.parse::<usize>() {
        Ok(index) => HairChannelSelector::Index(index),
        Err(_) => HairChannelSelector::Label(value.to_string()),
    })
}

fn parse_percent(value: &str) -> Result<f32, String> {
    let percent = value
        .parse::<f32>()
        .map_err(|_| format!("intensity must be numeric (0-100), got `{value}`"))?;
    if (0.0..=100.0).contains(&percent) {
        Ok(percent)
    } else {
        Err(format!("intensity {value} is out of range; expected 0-100"))
    }
}

fn parse_unit_interval(value: &str) -> Result<f32, String> {
    let parsed = value
        .parse::<f32>()
        .map_err(|_| format!("detection threshold must be numeric (0.0-1.0), got `{value}`"))?;
    if (0.0..=1.0).contains(&parsed) {
        Ok(parsed)
    } else {
        Err(format!(
            "detection threshold {value} is out of range; expected 0.0-1.0"
        ))
    }
}

fn parse_mask_threshold(value: &str) -> Result<u8, String> {
    if let Ok(int_value) = value.parse::<u8>() {
        return Ok(int_value);
    }

    let float_value = value
        .parse::<f32>()
        .map_err(|_| format!("mask threshold must be numeric (0-255 or 0.0-1.0), got `{value}`"))?;

    if (0.0..=1.0).contains(&float_value) {
        // Truncate so 0.5 maps to 127, whose cut sits at exactly 0.5 confidence.
        let scaled = (float_value * 255.0) as i32;
        return Ok(scaled.clamp(0, 255) as u8);
    }

    if float_value.fract().abs() <= f32::EPSILON && (0.0..=255.0).contains(&float_value) {
        return Ok(float_value as u8);
    }

    Err(format!(
        "mask threshold {value} is out of range; expected 0-255 or 0.0-1.0"
    ))
}
