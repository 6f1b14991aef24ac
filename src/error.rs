use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for operations that may fail with [`HairshadeError`].
pub type HairshadeResult<T> = std::result::Result<T, HairshadeError>;

/// Error types that can occur while extracting a hair mask or recoloring.
///
/// Covers color parsing, segmentation model loading and inference, mask
/// interpretation, and image decoding/encoding.
#[derive(Debug, Error)]
pub enum HairshadeError {
    /// The color string is not a `#RRGGBB` hex triple.
    #[error("Invalid color `{input}`: expected a hex color like #RRGGBB")]
    InvalidColorFormat { input: String },
    /// The segmentation output contains no usable hair channel.
    #[error("No hair region detected in the photo; try a different photo")]
    HairRegionNotDetected,
    /// Mask dimensions do not match the pixel buffer they are applied to.
    #[error("Mask size {found:?} does not match pixel buffer size {expected:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        found: (u32, u32),
    },
    /// A segmentation channel whose data length disagrees with its dimensions.
    #[error("Segmentation channel has {len} values, expected {width}x{height}")]
    InvalidChannel { width: u32, height: u32, len: usize },
    /// Image data could not be decoded.
    #[error("Image decoding failed: {0}")]
    Decode(#[source] image::ImageError),
    /// Pixels could not be encoded into a displayable image.
    #[error("Image encoding failed: {0}")]
    Encode(#[source] image::ImageError),
    /// The segmentation model could not be loaded or run.
    #[error("Segmentation model unavailable: {0}")]
    ModelUnavailable(String),
    /// Model file not found at the specified path.
    #[error("Model file not found: {}", path.display())]
    ModelNotFound { path: PathBuf },
    /// ONNX Runtime inference error.
    #[error("ONNX Runtime error: {0}")]
    Ort(#[from] ort::Error),
    /// Tensor shape mismatch or invalid dimensions.
    #[error("Invalid tensor shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
    /// File system I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Recolor was requested before any photo was prepared.
    #[error("No photo loaded; load a photo before recoloring")]
    NoPhotoLoaded,
    /// A newer photo replaced this one before its mask extraction finished.
    #[error("Mask extraction for photo #{generation} was superseded by a newer photo")]
    Superseded { generation: u64 },
}

/// How a caller is expected to react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid input from the calling code; not retried.
    CallerBug,
    /// Shown to the user, who should pick or re-upload another photo.
    UserVisible,
    /// Transient; may succeed when retried after a delay.
    Retryable,
    /// Broken internal invariant; fatal to the current operation.
    Internal,
    /// The result was abandoned in favour of newer work.
    Cancelled,
}

impl HairshadeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidColorFormat { .. } | Self::NoPhotoLoaded => ErrorKind::CallerBug,
            Self::HairRegionNotDetected | Self::Decode(_) | Self::Encode(_) => {
                ErrorKind::UserVisible
            }
            Self::ModelUnavailable(_) | Self::Ort(_) => ErrorKind::Retryable,
            Self::ModelNotFound { .. } | Self::Io(_) => ErrorKind::UserVisible,
            Self::DimensionMismatch { .. } | Self::InvalidChannel { .. } | Self::Shape(_) => {
                ErrorKind::Internal
            }
            Self::Superseded { .. } => ErrorKind::Cancelled,
        }
    }

    /// Whether retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Retryable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hair_not_detected_is_user_visible_and_not_retried() {
        let err = HairshadeError::HairRegionNotDetected;
        assert_eq!(err.kind(), ErrorKind::UserVisible);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("try a different photo"));
    }

    #[test]
    fn model_unavailable_is_retryable() {
        let err = HairshadeError::ModelUnavailable("load failed".into());
        assert!(err.is_retryable());
    }

    #[test]
    fn dimension_mismatch_is_internal() {
        let err = HairshadeError::DimensionMismatch {
            expected: (200, 200),
            found: (100, 100),
        };
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().contains("(100, 100)"));
    }

    #[test]
    fn invalid_color_is_caller_bug() {
        let err = HairshadeError::InvalidColorFormat {
            input: "#xyz".into(),
        };
        assert_eq!(err.kind(), ErrorKind::CallerBug);
        assert!(err.to_string().contains("#xyz"));
    }
}
