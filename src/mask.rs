use image::{GrayImage, Luma};
use imageproc::filter::gaussian_blur_f32;
use tracing::{debug, info};

use crate::config::{HairChannelSelector, MaskInterpretation, MaskMode, unit_interval_or};
use crate::io::{ConfidenceImage, resize_confidence};
use crate::provider::SegmentationChannel;
use crate::{HairshadeError, HairshadeResult};

/// Quantized cut-off for a confidence of 0.5: `Binary { threshold: 127 }`
/// keeps confidence strictly above 0.5.
pub const HALF_CONFIDENCE: u8 = 127;

/// A single refinement step applied to a resampled confidence plane.
#[derive(Debug, Clone, PartialEq)]
pub enum MaskOperation {
    /// Gaussian feathering of the hairline.
    Feather { sigma: f32 },
    /// Binary cut: confidence above `(value + 0.5) / 255` becomes 1.0, the rest 0.0.
    Threshold { value: u8 },
}

impl MaskOperation {
    pub fn apply(&self, input: &ConfidenceImage) -> ConfidenceImage {
        match self {
            MaskOperation::Feather { sigma } => gaussian_blur_f32(input, *sigma),
            MaskOperation::Threshold { value } => threshold_confidence(input, *value),
        }
    }
}

/// Run a list of operations against the provided plane, returning the refined plane.
pub fn apply_operations(source: &ConfidenceImage, operations: &[MaskOperation]) -> ConfidenceImage {
    let mut current = source.clone();
    for op in operations {
        current = op.apply(&current);
    }
    current
}

/// Produce the refinement sequence described by the interpretation options.
pub fn operations_from_options(options: &MaskInterpretation) -> Vec<MaskOperation> {
    let mut operations = Vec::new();
    if let Some(sigma) = options.feather_sigma.filter(|s| *s > 0.0) {
        operations.push(MaskOperation::Feather { sigma });
    }
    if let MaskMode::Binary { threshold } = options.mode {
        operations.push(MaskOperation::Threshold { value: threshold });
    }
    operations
}

/// Cut a confidence plane into hair (1.0) and background (0.0).
///
/// The comparison happens before quantization, so `thr = 127` keeps exactly
/// the pixels whose confidence is strictly above 0.5. NaN is background.
pub fn threshold_confidence(confidence: &ConfidenceImage, thr: u8) -> ConfidenceImage {
    let cut = (f32::from(thr) + 0.5) / 255.0;
    let (w, h) = confidence.dimensions();
    ConfidenceImage::from_fn(w, h, |x, y| {
        let value = confidence.get_pixel(x, y).0[0];
        Luma([if value > cut { 1.0 } else { 0.0 }])
    })
}

/// Quantize a confidence plane in [0.0, 1.0] to an 8-bit mask.
pub fn confidence_to_gray_image(confidence: &ConfidenceImage) -> GrayImage {
    let (w, h) = confidence.dimensions();
    let mut out = GrayImage::new(w, h);
    for (src, dst) in confidence.pixels().zip(out.pixels_mut()) {
        let value = if src[0].is_nan() {
            0.0
        } else {
            src[0].clamp(0.0, 1.0)
        };
        *dst = Luma([(value * 255.0 + 0.5) as u8]);
    }
    out
}

/// Pick the channel holding hair confidence.
pub fn select_hair_channel<'a>(
    channels: &'a [SegmentationChannel],
    selector: &HairChannelSelector,
) -> HairshadeResult<&'a SegmentationChannel> {
    let by_label = |wanted: &str| {
        channels.iter().find(|c| {
            c.label
                .as_deref()
                .is_some_and(|label| label.eq_ignore_ascii_case(wanted))
        })
    };

    let found = match selector {
        HairChannelSelector::Label(label) => by_label(label),
        HairChannelSelector::Index(index) => channels.get(*index),
        HairChannelSelector::Auto => {
            if channels.iter().any(|c| c.label.is_some()) {
                by_label("hair")
            } else {
                match channels {
                    [only] => Some(only),
                    [_, hair] => Some(hair),
                    _ => None,
                }
            }
        }
    };

    found.ok_or(HairshadeError::HairRegionNotDetected)
}

/// Share of pixels with a non-zero weight.
pub fn mask_coverage(mask: &GrayImage) -> f32 {
    let total = mask.as_raw().len();
    if total == 0 {
        return 0.0;
    }
    let covered = mask.as_raw().iter().filter(|v| **v > 0).count();
    covered as f32 / total as f32
}

/// Turn provider output into a mask matching a `width` x `height` photo.
///
/// Fails with [`HairshadeError::HairRegionNotDetected`] when no channel is hair,
/// when the hair channel has no pixel at or above the detection threshold, or
/// when refinement leaves no hair pixel at all.
pub fn interpret(
    channels: &[SegmentationChannel],
    options: &MaskInterpretation,
    width: u32,
    height: u32,
) -> HairshadeResult<GrayImage> {
    let channel = select_hair_channel(channels, &options.selector)?;
    channel.validate()?;

    let detection_threshold = unit_interval_or(options.detection_threshold, 0.5);
    let peak = channel
        .data
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(0.0f32, f32::max);
    if peak < detection_threshold {
        info!(
            peak,
            threshold = detection_threshold,
            "hair channel below detection threshold"
        );
        return Err(HairshadeError::HairRegionNotDetected);
    }

    let confidence =
        ConfidenceImage::from_raw(channel.width, channel.height, channel.data.clone()).ok_or(
            HairshadeError::InvalidChannel {
                width: channel.width,
                height: channel.height,
                len: channel.data.len(),
            },
        )?;
    let resized = resize_confidence(&confidence, width, height, options.resize_filter);
    let refined = apply_operations(&resized, &operations_from_options(options));
    let mask = confidence_to_gray_image(&refined);

    let coverage = mask_coverage(&mask);
    if coverage == 0.0 {
        info!(
            peak,
            mode = ?options.mode,
            "hair mask is empty after refinement"
        );
        return Err(HairshadeError::HairRegionNotDetected);
    }

    debug!(
        label = channel.label.as_deref().unwrap_or("<unlabeled>"),
        source = ?(channel.width, channel.height),
        target = ?(width, height),
        coverage,
        "interpreted hair mask"
    );
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_image(w: u32, h: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(w, h, Luma([value]))
    }

    fn channel(label: Option<&str>, value: f32) -> SegmentationChannel {
        SegmentationChannel {
            label: label.map(str::to_string),
            width: 2,
            height: 2,
            data: vec![value; 4],
        }
    }

    mod select_hair_channel {
        use super::*;

        #[test]
        fn auto_prefers_hair_label_case_insensitively() {
            let channels = vec![
                channel(Some("skin"), 0.1),
                channel(Some("Hair"), 0.9),
                channel(Some("cloth"), 0.2),
            ];
            let picked = select_hair_channel(&channels, &HairChannelSelector::Auto).unwrap();
            assert_eq!(picked.label.as_deref(), Some("Hair"));
        }

        #[test]
        fn auto_labeled_without_hair_is_not_detected() {
            let channels = vec![channel(Some("skin"), 0.1), channel(Some("nose"), 0.9)];
            let err = select_hair_channel(&channels, &HairChannelSelector::Auto).unwrap_err();
            assert!(matches!(err, HairshadeError::HairRegionNotDetected));
        }

        #[test]
        fn auto_single_unlabeled_channel_is_hair() {
            let channels = vec![channel(None, 0.7)];
            let picked = select_hair_channel(&channels, &HairChannelSelector::Auto).unwrap();
            assert_eq!(picked.data[0], 0.7);
        }

        #[test]
        fn auto_second_of_two_unlabeled_is_hair() {
            let channels = vec![channel(None, 0.1), channel(None, 0.9)];
            let picked = select_hair_channel(&channels, &HairChannelSelector::Auto).unwrap();
            assert_eq!(picked.data[0], 0.9);
        }

        #[test]
        fn auto_many_unlabeled_is_ambiguous() {
            let channels = vec![channel(None, 0.1), channel(None, 0.5), channel(None, 0.9)];
            assert!(select_hair_channel(&channels, &HairChannelSelector::Auto).is_err());
        }

        #[test]
        fn auto_empty_is_not_detected() {
            assert!(select_hair_channel(&[], &HairChannelSelector::Auto).is_err());
        }

        #[test]
        fn explicit_index_and_label() {
            let channels = vec![channel(Some("a"), 0.1), channel(Some("b"), 0.9)];
            let by_index = select_hair_channel(&channels, &HairChannelSelector::Index(0)).unwrap();
            assert_eq!(by_index.label.as_deref(), Some("a"));
            let by_label =
                select_hair_channel(&channels, &HairChannelSelector::Label("B".into())).unwrap();
            assert_eq!(by_label.label.as_deref(), Some("b"));
            assert!(select_hair_channel(&channels, &HairChannelSelector::Index(5)).is_err());
        }
    }

    mod interpret {
        use super::*;
        use image::imageops::FilterType;

        #[test]
        fn soft_mask_passes_confidence_through() {
            let channels = vec![SegmentationChannel::labeled(
                "hair",
                2,
                1,
                vec![0.25, 1.0],
            )];
            let mask = interpret(&channels, &MaskInterpretation::default(), 2, 1).unwrap();
            assert_eq!(mask.as_raw(), &vec![64, 255]);
        }

        #[test]
        fn binary_mode_thresholds_at_half() {
            let channels = vec![SegmentationChannel::labeled(
                "hair",
                3,
                1,
                vec![0.3, 0.6, 1.0],
            )];
            let options = MaskInterpretation::default().with_mode(MaskMode::Binary {
                threshold: HALF_CONFIDENCE,
            });
            let mask = interpret(&channels, &options, 3, 1).unwrap();
            assert_eq!(mask.as_raw(), &vec![0, 255, 255]);
        }

        #[test]
        fn binary_mode_keeps_exactly_half_as_background() {
            let channels = vec![SegmentationChannel::labeled(
                "hair",
                3,
                1,
                vec![0.5, 128.0 / 255.0, 1.0],
            )];
            let options = MaskInterpretation::default()
                .with_resize_filter(FilterType::Nearest)
                .with_mode(MaskMode::Binary {
                    threshold: HALF_CONFIDENCE,
                });
            let mask = interpret(&channels, &options, 3, 1).unwrap();
            assert_eq!(mask.as_raw(), &vec![0, 255, 255]);
        }

        #[test]
        fn binary_cut_above_every_pixel_is_not_detected() {
            let channels = vec![SegmentationChannel::labeled("hair", 2, 2, vec![0.8; 4])];
            let options = MaskInterpretation::default().with_mode(MaskMode::Binary { threshold: 230 });
            let err = interpret(&channels, &options, 2, 2).unwrap_err();
            assert!(matches!(err, HairshadeError::HairRegionNotDetected));
        }

        #[test]
        fn nan_detection_threshold_falls_back_to_half() {
            let channels = vec![SegmentationChannel::labeled("hair", 2, 2, vec![0.3; 4])];
            let mut options = MaskInterpretation::default();
            options.detection_threshold = f32::NAN;
            let err = interpret(&channels, &options, 2, 2).unwrap_err();
            assert!(matches!(err, HairshadeError::HairRegionNotDetected));
        }

        #[test]
        fn resamples_to_photo_size() {
            let channels = vec![SegmentationChannel::labeled("hair", 2, 2, vec![1.0; 4])];
            let options = MaskInterpretation::default().with_resize_filter(FilterType::Nearest);
            let mask = interpret(&channels, &options, 6, 4).unwrap();
            assert_eq!(mask.dimensions(), (6, 4));
            assert!(mask.pixels().all(|p| p.0[0] == 255));
        }

        #[test]
        fn all_zero_hair_channel_is_not_detected() {
            let channels = vec![SegmentationChannel::labeled("hair", 2, 2, vec![0.0; 4])];
            let err = interpret(&channels, &MaskInterpretation::default(), 2, 2).unwrap_err();
            assert!(matches!(err, HairshadeError::HairRegionNotDetected));
        }

        #[test]
        fn detection_threshold_is_configurable() {
            let channels = vec![SegmentationChannel::labeled("hair", 2, 2, vec![0.3; 4])];
            assert!(interpret(&channels, &MaskInterpretation::default(), 2, 2).is_err());
            let lenient = MaskInterpretation::default().with_detection_threshold(0.2);
            assert!(interpret(&channels, &lenient, 2, 2).is_ok());
        }

        #[test]
        fn malformed_channel_is_rejected() {
            let channels = vec![SegmentationChannel::labeled("hair", 3, 3, vec![1.0; 4])];
            let err = interpret(&channels, &MaskInterpretation::default(), 3, 3).unwrap_err();
            assert!(matches!(err, HairshadeError::InvalidChannel { .. }));
        }

        #[test]
        fn feather_softens_binary_edge() {
            let mut data = vec![0.0; 10 * 10];
            for y in 0..10 {
                for x in 5..10 {
                    data[y * 10 + x] = 1.0;
                }
            }
            let channels = vec![SegmentationChannel::labeled("hair", 10, 10, data)];
            let options = MaskInterpretation::default().with_feather(Some(1.5));
            let mask = interpret(&channels, &options, 10, 10).unwrap();
            assert!(mask.pixels().any(|p| p.0[0] > 0 && p.0[0] < 255));
        }
    }

    mod operations {
        use super::*;

        #[test]
        fn soft_without_feather_has_no_operations() {
            assert!(operations_from_options(&MaskInterpretation::default()).is_empty());
        }

        #[test]
        fn feather_then_threshold_order() {
            let options = MaskInterpretation::default()
                .with_feather(Some(2.0))
                .with_mode(MaskMode::Binary { threshold: 100 });
            let ops = operations_from_options(&options);
            assert_eq!(
                ops,
                vec![
                    MaskOperation::Feather { sigma: 2.0 },
                    MaskOperation::Threshold { value: 100 }
                ]
            );
        }

        #[test]
        fn zero_sigma_feather_is_skipped() {
            let options = MaskInterpretation::default().with_feather(Some(0.0));
            assert!(operations_from_options(&options).is_empty());
        }

        #[test]
        fn empty_operations_returns_clone() {
            let input = ConfidenceImage::from_pixel(3, 3, Luma([0.4]));
            assert_eq!(apply_operations(&input, &[]), input);
        }

        #[test]
        fn threshold_is_strictly_greater_than_half() {
            let input =
                ConfidenceImage::from_raw(4, 1, vec![0.499, 0.5, 0.501, f32::NAN]).unwrap();
            let result = threshold_confidence(&input, HALF_CONFIDENCE);
            assert_eq!(result.as_raw(), &vec![0.0, 0.0, 1.0, 0.0]);
        }

        #[test]
        fn threshold_output_quantizes_to_hard_edges() {
            let input = ConfidenceImage::from_raw(2, 1, vec![0.2, 0.9]).unwrap();
            let cut = threshold_confidence(&input, 100);
            assert_eq!(confidence_to_gray_image(&cut).as_raw(), &vec![0, 255]);
        }

        #[test]
        fn coverage_counts_nonzero_pixels() {
            let mut mask = gray_image(2, 2, 0);
            mask.put_pixel(0, 0, Luma([1]));
            assert_eq!(mask_coverage(&mask), 0.25);
            assert_eq!(mask_coverage(&GrayImage::new(0, 0)), 0.0);
        }
    }

    mod confidence_to_gray_image {
        use super::*;
        use proptest::prelude::*;

        #[test]
        fn clamps_and_rounds() {
            let plane =
                ConfidenceImage::from_raw(4, 1, vec![-1.0, 0.5, 2.0, f32::NAN]).unwrap();
            let gray = confidence_to_gray_image(&plane);
            assert_eq!(gray.as_raw(), &vec![0, 128, 255, 0]);
        }

        proptest! {
            /// confidence_to_gray_image: values in [0, 1] map to proportional bytes
            #[test]
            fn valid_range_maps_proportionally(value in 0.0f32..=1.0f32) {
                let plane = ConfidenceImage::from_pixel(1, 1, Luma([value]));
                let byte = confidence_to_gray_image(&plane).get_pixel(0, 0).0[0];
                prop_assert_eq!(byte, (value * 255.0 + 0.5) as u8);
            }
        }
    }
}
