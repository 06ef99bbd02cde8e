//! Side-by-side PNG dumps: original | ground truth | prediction.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{GenericImage, Rgb, RgbImage};

use crate::common::LabelMap;
use crate::segmentation_processing::LabelPolicy;

/// Gray level of class `c`, spread evenly over `0..=255`.
pub fn label_level(c: usize, num_class: usize) -> u8 {
    if num_class <= 1 {
        return 255;
    }
    ((c * 255) as f64 / (num_class - 1) as f64).round() as u8
}

/// Unlabeled pixels stand out from every gray class level.
pub const UNLABELED_COLOUR: [u8; 3] = [255, 0, 255];

/// One gray pixel per class; unlabeled pixels get [`UNLABELED_COLOUR`].
pub fn render_labels(labels: &LabelMap, policy: &LabelPolicy) -> RgbImage {
    let (h, w) = labels.dim();
    RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let l = labels[[y as usize, x as usize]];
        if policy.is_labeled(l) {
            let v = label_level(l as usize, policy.num_class);
            Rgb([v, v, v])
        } else {
            Rgb(UNLABELED_COLOUR)
        }
    })
}

/// Concatenate the panels along the width.
pub fn compose(img: &RgbImage, seg: &RgbImage, pred: &RgbImage) -> Result<RgbImage> {
    let (w, h) = img.dimensions();
    if seg.dimensions() != (w, h) || pred.dimensions() != (w, h) {
        anyhow::bail!(
            "panel sizes differ: image {:?}, label {:?}, prediction {:?}",
            img.dimensions(),
            seg.dimensions(),
            pred.dimensions()
        );
    }
    let mut canvas = RgbImage::new(w * 3, h);
    canvas.copy_from(img, 0, 0)?;
    canvas.copy_from(seg, w, 0)?;
    canvas.copy_from(pred, w * 2, 0)?;
    Ok(canvas)
}

/// `images/val/ADE_0001.jpg` -> `ADE_0001.png`
pub fn output_name(info: &str) -> PathBuf {
    let base = Path::new(info)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(info));
    base.with_extension("png")
}

/// Write the composite for one sample under `result_dir`.
pub fn visualize_result(
    img: &RgbImage,
    seg: &LabelMap,
    pred: &LabelMap,
    info: &str,
    policy: &LabelPolicy,
    result_dir: &Path,
) -> Result<PathBuf> {
    let canvas = compose(img, &render_labels(seg, policy), &render_labels(pred, policy))
        .with_context(|| format!("cannot visualize {info}"))?;
    let path = result_dir.join(output_name(info));
    canvas
        .save(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    log::debug!("Saved {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn three_classes_map_to_black_gray_white() {
        assert_eq!(label_level(0, 3), 0);
        assert_eq!(label_level(1, 3), 128);
        assert_eq!(label_level(2, 3), 255);
    }

    #[test]
    fn ignored_pixels_differ_from_class_zero() {
        let policy = LabelPolicy::new(3).with_ignore_index(Some(1));
        let panel = render_labels(&array![[0, 1, 7]], &policy);
        assert_eq!(panel.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(panel.get_pixel(1, 0), &Rgb(UNLABELED_COLOUR));
        assert_eq!(panel.get_pixel(2, 0), &Rgb(UNLABELED_COLOUR));
    }

    #[test]
    fn output_name_keeps_basename_only() {
        assert_eq!(output_name("images/val/ADE_0001.jpg"), PathBuf::from("ADE_0001.png"));
        assert_eq!(output_name("plain"), PathBuf::from("plain.png"));
    }

    #[test]
    fn composite_is_three_panels_wide() {
        let policy = LabelPolicy::new(3);
        let img = RgbImage::from_pixel(2, 1, Rgb([10, 20, 30]));
        let seg = render_labels(&array![[1, -1]], &policy);
        let pred = render_labels(&array![[2, 0]], &policy);
        let canvas = compose(&img, &seg, &pred).unwrap();
        assert_eq!(canvas.dimensions(), (6, 1));
        assert_eq!(canvas.get_pixel(1, 0), &Rgb([10, 20, 30]));
        assert_eq!(canvas.get_pixel(2, 0), &Rgb([128, 128, 128]));
        assert_eq!(canvas.get_pixel(3, 0), &Rgb(UNLABELED_COLOUR));
        assert_eq!(canvas.get_pixel(4, 0), &Rgb([255, 255, 255]));
        assert_eq!(canvas.get_pixel(5, 0), &Rgb([0, 0, 0]));
    }
}
