#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use image::{GrayImage, Luma, Rgb, RgbImage};
use seg_eval::common::{LabelMap, Sample};
use seg_eval::data::{ImageTransform, ScoreMap, Xs};
use seg_eval::segmentation_processing::Criterion;
use seg_eval::segmentation_runners::ort_segmenter::score_map::scores_from_output;
use seg_eval::segmentation_runners::InferenceProcess;
use tempfile::TempDir;

/// Pure colors whose normalized channel is the largest for that class.
pub const CLASS_COLOURS: [[u8; 3]; 3] = [[255, 0, 0], [0, 255, 0], [0, 0, 255]];

/// Scores every pixel with its own normalized RGB values, so the predicted
/// class is the dominant colour channel.
pub struct ChannelSegmenter {
    pub softmax: bool,
    pub crit: Option<Criterion>,
    pub calls: usize,
}

impl ChannelSegmenter {
    pub fn new() -> Self {
        Self {
            softmax: false,
            crit: None,
            calls: 0,
        }
    }

    pub fn with_loss() -> Self {
        Self {
            softmax: true,
            crit: Some(Criterion::NllLoss),
            calls: 0,
        }
    }
}

impl InferenceProcess for ChannelSegmenter {
    fn num_class(&self) -> usize {
        3
    }

    fn inference(&mut self, xs: Xs) -> Result<Xs> {
        self.calls += 1;
        Ok(xs)
    }

    fn postprocess(&self, xs: Xs, seg_size: (usize, usize)) -> Result<ScoreMap> {
        scores_from_output(&xs[0], 3, seg_size, self.softmax)
    }

    fn criterion(&self) -> Option<&Criterion> {
        self.crit.as_ref()
    }
}

pub fn paint(labels: &LabelMap) -> RgbImage {
    let (h, w) = labels.dim();
    RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let l = labels[[y as usize, x as usize]].clamp(0, 2) as usize;
        Rgb(CLASS_COLOURS[l])
    })
}

/// A sample whose image is painted from `labels`, evaluated at `sizes`.
pub fn painted_sample(labels: &LabelMap, sizes: &[u32], info: &str) -> Sample {
    let img = paint(labels);
    let transform = ImageTransform::new(sizes, 10_000, 1);
    let img_data = transform.apply(&img).unwrap();
    Sample::new(img, labels.clone(), img_data, info)
}

pub fn label_png(labels: &LabelMap) -> GrayImage {
    let (h, w) = labels.dim();
    GrayImage::from_fn(w as u32, h as u32, |x, y| {
        Luma([labels[[y as usize, x as usize]] as u8])
    })
}

/// Fresh, empty directory removed when the guard drops.
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().unwrap()
}

/// Write image/label pairs under `root` and an `.odgt` manifest listing them.
pub fn write_dataset(root: &Path, samples: &[(&str, LabelMap)]) -> PathBuf {
    fs::create_dir_all(root.join("images")).unwrap();
    fs::create_dir_all(root.join("annotations")).unwrap();
    let mut manifest = String::new();
    for (name, labels) in samples {
        let (h, w) = labels.dim();
        let fpath_img = format!("images/{name}.png");
        let fpath_segm = format!("annotations/{name}.png");
        paint(labels).save(root.join(&fpath_img)).unwrap();
        label_png(labels).save(root.join(&fpath_segm)).unwrap();
        manifest.push_str(&format!(
            "{{\"fpath_img\": \"{fpath_img}\", \"fpath_segm\": \"{fpath_segm}\", \"width\": {w}, \"height\": {h}}}\n"
        ));
        manifest.push('\n');
    }
    let list_val = root.join("validation.odgt");
    fs::write(&list_val, manifest).unwrap();
    list_val
}
