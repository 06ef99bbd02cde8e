use image::RgbImage;
use ndarray::Array2;

use crate::data::X;
use crate::error::EvalError;

/// Per-pixel class indices, `(height, width)`. Negative or out-of-range
/// values mark unlabeled pixels.
pub type LabelMap = Array2<i32>;

/// One evaluation unit as produced by the loader.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Original RGB image at label resolution.
    pub img_ori: RgbImage,
    pub seg_label: LabelMap,
    /// One `1×3×h×w` tensor per configured scale, in configuration order.
    pub img_data: Vec<X>,
    /// Identifier of the sample, the image path from the manifest.
    pub info: String,
}

impl Sample {
    pub fn new(img_ori: RgbImage, seg_label: LabelMap, img_data: Vec<X>, info: impl Into<String>) -> Self {
        Self {
            img_ori,
            seg_label,
            img_data,
            info: info.into(),
        }
    }

    /// `(height, width)` of the label map; score maps are pinned to it.
    pub fn seg_size(&self) -> (usize, usize) {
        self.seg_label.dim()
    }

    pub fn num_scales(&self) -> usize {
        self.img_data.len()
    }

    /// Check the fields the evaluation loop depends on.
    pub fn validate(&self) -> Result<(), EvalError> {
        let (h, w) = self.seg_size();
        if h == 0 || w == 0 {
            return Err(EvalError::malformed(&self.info, "empty label map"));
        }
        if self.img_data.is_empty() {
            return Err(EvalError::malformed(&self.info, "no resized image tensors"));
        }
        let (img_w, img_h) = self.img_ori.dimensions();
        if (img_h as usize, img_w as usize) != (h, w) {
            return Err(EvalError::malformed(
                &self.info,
                format!("image is {img_w}x{img_h} but label map is {w}x{h}"),
            ));
        }
        if let Some(x) = self.img_data.iter().find(|x| x.ndim() != 4) {
            return Err(EvalError::malformed(
                &self.info,
                format!("expected NCHW image tensors, got shape {:?}", x.shape()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(img: (u32, u32), label: (usize, usize), scales: usize) -> Sample {
        let xs = (0..scales)
            .map(|_| X::from_shape_vec(&[1, 3, 2, 2], vec![0.0; 12]).unwrap())
            .collect();
        Sample::new(RgbImage::new(img.0, img.1), LabelMap::zeros(label), xs, "a/b.jpg")
    }

    #[test]
    fn consistent_sample_validates() {
        assert!(sample((4, 3), (3, 4), 2).validate().is_ok());
    }

    #[test]
    fn missing_scales_are_malformed() {
        let err = sample((4, 3), (3, 4), 0).validate().unwrap_err();
        assert!(err.to_string().contains("no resized image tensors"));
    }

    #[test]
    fn size_mismatch_is_malformed() {
        let err = sample((4, 4), (3, 4), 1).validate().unwrap_err();
        assert!(matches!(err, EvalError::MalformedSample { .. }));
    }
}
