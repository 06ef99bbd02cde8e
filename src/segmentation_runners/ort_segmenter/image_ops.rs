//! Functions to turn one validation image into the per-scale network inputs.

use anyhow::{bail, Result};
use fast_image_resize::{FilterType, ResizeAlg, ResizeOptions, Resizer};
use image::{DynamicImage, RgbImage};
use ndarray::Array;
use rayon::prelude::*;

use crate::data::X;

/// ImageNet statistics the encoders were trained with, RGB order.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Multi-scale resize settings shared by every sample.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTransform {
    /// Target length of the short edge, one entry per scale.
    pub img_sizes: Vec<u32>,
    /// Upper bound of the long edge.
    pub img_max_size: u32,
    /// Resized sides are rounded up to a multiple of this.
    pub padding_constant: u32,
}

impl ImageTransform {
    pub fn new(img_sizes: &[u32], img_max_size: u32, padding_constant: u32) -> Self {
        Self {
            img_sizes: img_sizes.to_vec(),
            img_max_size,
            padding_constant: padding_constant.max(1),
        }
    }

    pub fn num_scales(&self) -> usize {
        self.img_sizes.len()
    }

    /// `(width, height)` an image of `ori_w × ori_h` is resized to for the
    /// short-edge size `short_size`.
    pub fn target_size(&self, ori_w: u32, ori_h: u32, short_size: u32) -> (u32, u32) {
        let scale = (short_size as f64 / ori_w.min(ori_h) as f64)
            .min(self.img_max_size as f64 / ori_w.max(ori_h) as f64);
        let target_w = ((ori_w as f64 * scale) as u32).max(1);
        let target_h = ((ori_h as f64 * scale) as u32).max(1);
        (
            round2nearest_multiple(target_w, self.padding_constant),
            round2nearest_multiple(target_h, self.padding_constant),
        )
    }

    /// Resize `img` once per scale and normalize each copy into a
    /// `1×3×h×w` tensor. Output order follows `img_sizes`.
    pub fn apply(&self, img: &RgbImage) -> Result<Vec<X>> {
        let (ori_w, ori_h) = img.dimensions();
        if ori_w == 0 || ori_h == 0 {
            bail!("Cannot resize an empty image");
        }
        let src = DynamicImage::ImageRgb8(img.clone());
        let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));

        self.img_sizes
            .par_iter()
            .map(|&short_size| {
                let (w, h) = self.target_size(ori_w, ori_h, short_size);
                let mut dst = DynamicImage::new_rgb8(w, h);
                let mut resizer = Resizer::new();
                resizer.resize(&src, &mut dst, &options)?;
                nchw_normalize(&dst.into_rgb8())
            })
            .collect()
    }
}

/// Smallest multiple of `p` that is `>= x`.
pub fn round2nearest_multiple(x: u32, p: u32) -> u32 {
    x.div_ceil(p) * p
}

pub fn make_divisible(x: usize, divisor: usize) -> usize {
    x.div_ceil(divisor) * divisor
}

/// `x / 255`, then per-channel `(x - mean) / std`, laid out as `1×3×h×w`.
pub fn nchw_normalize(img: &RgbImage) -> Result<X> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let buf = img.as_raw();
    if buf.len() != w * h * 3 {
        bail!("Unexpected buffer size: got {}, expected {}", buf.len(), w * h * 3);
    }

    let hw = w * h;
    let mut out = vec![0.0f32; buf.len()];
    for (i, px) in buf.chunks_exact(3).enumerate() {
        for c in 0..3 {
            out[i + c * hw] = (px[c] as f32 / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }

    Ok(X::from(Array::from_shape_vec((1, 3, h, w), out)?.into_dyn()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_up_to_padding_constant() {
        assert_eq!(round2nearest_multiple(17, 8), 24);
        assert_eq!(round2nearest_multiple(16, 8), 16);
        assert_eq!(round2nearest_multiple(5, 1), 5);
    }

    #[test]
    fn short_edge_drives_scale() {
        let t = ImageTransform::new(&[300], 1000, 1);
        assert_eq!(t.target_size(600, 400, 300), (450, 300));
    }

    #[test]
    fn long_edge_is_capped() {
        let t = ImageTransform::new(&[300], 400, 8);
        // 300/100 = 3.0 but 400/1000 = 0.4 wins: 1000x100 -> 400x40
        assert_eq!(t.target_size(1000, 100, 300), (400, 40));
        let t = ImageTransform::new(&[300], 400, 32);
        assert_eq!(t.target_size(1000, 100, 300), (416, 64));
    }

    #[test]
    fn apply_produces_one_tensor_per_scale() {
        let img = RgbImage::from_pixel(8, 4, image::Rgb([255, 0, 128]));
        let t = ImageTransform::new(&[4, 2], 100, 1);
        let xs = t.apply(&img).unwrap();
        assert_eq!(xs.len(), 2);
        assert_eq!(xs[0].shape(), &[1, 3, 4, 8]);
        assert_eq!(xs[1].shape(), &[1, 3, 2, 4]);
    }

    #[test]
    fn normalization_uses_imagenet_statistics() {
        let img = RgbImage::from_pixel(2, 1, image::Rgb([255, 0, 0]));
        let x = nchw_normalize(&img).unwrap();
        assert_eq!(x.shape(), &[1, 3, 1, 2]);
        let r = (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        let g = (0.0 - IMAGENET_MEAN[1]) / IMAGENET_STD[1];
        assert!((x[[0, 0, 0, 1]] - r).abs() < 1e-6);
        assert!((x[[0, 1, 0, 0]] - g).abs() < 1e-6);
    }
}
