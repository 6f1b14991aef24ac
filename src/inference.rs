use std::convert::TryFrom;
use std::io;
use std::sync::{Mutex, PoisonError};

use image::RgbImage;
use image::imageops::FilterType;
use ndarray::{Array3, Array4, ArrayViewD, Axis, Ix3};
use ort::session::Session;
use ort::value::Tensor;
use tracing::{debug, info};

use crate::config::InferenceSettings;
use crate::provider::{ProviderLoader, SegmentationChannel, SegmentationProvider};
use crate::{HairshadeError, HairshadeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    Nchw,
    Nhwc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInputSpec {
    pub width: usize,
    pub height: usize,
    pub layout: ChannelLayout,
}

/// Face-parsing models are usually exported at 512x512.
pub const DEFAULT_MODEL_INPUT_SPEC: ModelInputSpec = ModelInputSpec {
    width: 512,
    height: 512,
    layout: ChannelLayout::Nchw,
};

/// Tries to figure out the model input spec from the session and falls back to the default.
pub fn determine_model_input_spec(session: &Session) -> ModelInputSpec {
    infer_model_input_spec(session).unwrap_or(DEFAULT_MODEL_INPUT_SPEC)
}

fn infer_model_input_spec(session: &Session) -> Option<ModelInputSpec> {
    let input = session.inputs().first()?;
    let shape = input.dtype().tensor_shape()?;
    let dims: &[i64] = shape;
    spec_from_dims(dims)
}

fn spec_from_dims(dims: &[i64]) -> Option<ModelInputSpec> {
    if dims.len() < 4 {
        return None;
    }
    infer_nchw_spec(dims).or_else(|| infer_nhwc_spec(dims))
}

/// Checks for an NCHW layout and returns a matching spec when dimensions line up.
fn infer_nchw_spec(dims: &[i64]) -> Option<ModelInputSpec> {
    let channels = *dims.get(1)?;
    if channels != 3 && channels != -1 {
        return None;
    }
    let height = positive_dim_to_usize(*dims.get(2)?)?;
    let width = positive_dim_to_usize(*dims.get(3)?)?;
    Some(ModelInputSpec {
        width,
        height,
        layout: ChannelLayout::Nchw,
    })
}

/// Checks for an NHWC layout and returns a matching spec when dimensions line up.
fn infer_nhwc_spec(dims: &[i64]) -> Option<ModelInputSpec> {
    let channels = *dims.get(3)?;
    if channels != 3 && channels != -1 {
        return None;
    }
    let height = positive_dim_to_usize(*dims.get(1)?)?;
    let width = positive_dim_to_usize(*dims.get(2)?)?;
    Some(ModelInputSpec {
        width,
        height,
        layout: ChannelLayout::Nhwc,
    })
}

/// Converts a positive i64 dimension to usize, returning None for non-positive or overflow.
fn positive_dim_to_usize(dim: i64) -> Option<usize> {
    if dim > 0 {
        usize::try_from(dim).ok()
    } else {
        None
    }
}

/// Resizes and normalizes the RGB image into the flat buffer and shape the model expects.
pub fn preprocess_image(
    rgb: &RgbImage,
    filter: FilterType,
    spec: ModelInputSpec,
) -> HairshadeResult<Array4<f32>> {
    let target_w = u32::try_from(spec.width).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("model width {} exceeds u32", spec.width),
        )
    })?;
    let target_h = u32::try_from(spec.height).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("model height {} exceeds u32", spec.height),
        )
    })?;

    let resized = image::imageops::resize(rgb, target_w, target_h, filter);
    let w = resized.width() as usize;
    let h = resized.height() as usize;
    let mean = [0.485f32, 0.456, 0.406];
    let std = [0.229f32, 0.224, 0.225];
    let inv255 = 1.0 / 255.0;
    let plane = h * w;

    let mut buffer = vec![0f32; 3 * plane];
    for (idx, pixel) in resized.pixels().enumerate() {
        for c in 0..3 {
            let value = (f32::from(pixel[c]) * inv255 - mean[c]) / std[c];
            let at = match spec.layout {
                ChannelLayout::Nchw => c * plane + idx,
                ChannelLayout::Nhwc => idx * 3 + c,
            };
            buffer[at] = value;
        }
    }

    let shape = match spec.layout {
        ChannelLayout::Nchw => (1usize, 3usize, h, w),
        ChannelLayout::Nhwc => (1usize, h, w, 3usize),
    };
    Ok(Array4::from_shape_vec(shape, buffer)?)
}

/// Turn a raw model output into per-class probability channels.
///
/// A `C x H x W` output (after dropping leading singleton axes) is treated as
/// class logits and softmaxed across `C`. A single `H x W` plane is taken as a
/// probability map, with a sigmoid applied when it holds values outside `[0, 1]`.
pub fn output_to_channels(
    output: ArrayViewD<f32>,
    labels: &[String],
) -> HairshadeResult<Vec<SegmentationChannel>> {
    let original_shape: Vec<usize> = output.shape().to_vec();
    let mut view = output;

    while view.ndim() > 3 {
        let axis = view
            .shape()
            .iter()
            .position(|&len| len == 1)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Cannot infer CxHxW from output shape {original_shape:?}"),
                )
            })?;
        view = view.index_axis_move(Axis(axis), 0);
    }
    if view.ndim() == 2 {
        view = view.insert_axis(Axis(0));
    }

    let planes: Array3<f32> = view.into_dimensionality::<Ix3>()?.to_owned();
    let (classes, h, w) = planes.dim();
    let probabilities = if classes == 1 {
        single_plane_probabilities(planes)
    } else {
        softmax_over_classes(planes)
    };

    let width = u32::try_from(w).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidData, "output width exceeds u32")
    })?;
    let height = u32::try_from(h).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidData, "output height exceeds u32")
    })?;

    Ok(probabilities
        .axis_iter(Axis(0))
        .enumerate()
        .map(|(class, plane)| SegmentationChannel {
            label: if classes == 1 {
                None
            } else {
                labels.get(class).cloned()
            },
            width,
            height,
            data: plane.iter().copied().collect(),
        })
        .collect())
}

fn single_plane_probabilities(mut planes: Array3<f32>) -> Array3<f32> {
    let in_unit_range = planes.iter().all(|v| (0.0..=1.0).contains(v));
    if !in_unit_range {
        planes.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp()));
    }
    planes
}

fn softmax_over_classes(mut planes: Array3<f32>) -> Array3<f32> {
    let (_, h, w) = planes.dim();
    for y in 0..h {
        for x in 0..w {
            let mut lane = planes.slice_mut(ndarray::s![.., y, x]);
            let max = lane.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            lane.mapv_inplace(|v| (v - max).exp());
            let sum: f32 = lane.sum();
            if sum > 0.0 {
                lane.mapv_inplace(|v| v / sum);
            }
        }
    }
    planes
}

fn session_error(err: impl std::fmt::Display) -> HairshadeError {
    HairshadeError::ModelUnavailable(format!("failed to build ONNX session: {err}"))
}

/// A face-parsing ONNX model run through ONNX Runtime.
pub struct OnnxFaceParser {
    session: Mutex<Session>,
    spec: ModelInputSpec,
    settings: InferenceSettings,
}

impl OnnxFaceParser {
    /// Load the model named by `settings`.
    pub fn load(settings: InferenceSettings) -> HairshadeResult<Self> {
        if !settings.model_path.exists() {
            return Err(HairshadeError::ModelNotFound {
                path: settings.model_path.clone(),
            });
        }

        let mut builder = Session::builder().map_err(session_error)?;
        if let Some(threads) = settings.intra_threads {
            builder = builder.with_intra_threads(threads).map_err(session_error)?;
        }
        let session = builder
            .commit_from_file(&settings.model_path)
            .map_err(session_error)?;
        let spec = determine_model_input_spec(&session);
        info!(
            model = %settings.model_path.display(),
            width = spec.width,
            height = spec.height,
            layout = ?spec.layout,
            "loaded face-parsing model"
        );

        Ok(Self {
            session: Mutex::new(session),
            spec,
            settings,
        })
    }

    pub fn input_spec(&self) -> ModelInputSpec {
        self.spec
    }
}

impl SegmentationProvider for OnnxFaceParser {
    fn segment(&self, image: &RgbImage) -> HairshadeResult<Vec<SegmentationChannel>> {
        let input = preprocess_image(image, self.settings.input_resize_filter, self.spec)?;
        let tensor = Tensor::from_array(input)?;

        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        let outputs = session.run(ort::inputs![tensor])?;
        let logits = outputs[0].try_extract_array::<f32>()?;
        let channels = output_to_channels(logits, &self.settings.labels)?;

        debug!(
            channels = channels.len(),
            size = ?channels.first().map(|c| (c.width, c.height)),
            "face-parsing inference finished"
        );
        Ok(channels)
    }
}

/// Loads an [`OnnxFaceParser`] on first use.
#[derive(Debug, Clone)]
pub struct OnnxModelLoader {
    settings: InferenceSettings,
}

impl OnnxModelLoader {
    pub fn new(settings: InferenceSettings) -> Self {
        Self { settings }
    }
}

impl ProviderLoader for OnnxModelLoader {
    type Provider = OnnxFaceParser;

    fn load(&self) -> HairshadeResult<OnnxFaceParser> {
        OnnxFaceParser::load(self.settings.clone())
    }
}
