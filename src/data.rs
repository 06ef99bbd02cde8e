mod average_meter;
mod config_ort;
mod time_calc;

pub use average_meter::{ArrayMeter, AverageMeter};
pub use config_ort::ConfigOrt;
pub use time_calc::TimeCalc;

pub use crate::segmentation_runners::ort_segmenter::image_ops::ImageTransform;
pub use crate::segmentation_runners::ort_segmenter::input_wrapper::X;
pub use crate::segmentation_runners::ort_segmenter::score_map::{ScoreAccumulator, ScoreMap};
pub use crate::segmentation_runners::ort_segmenter::xs::Xs;

pub(crate) const CROSS_MARK: &str = "❌";
