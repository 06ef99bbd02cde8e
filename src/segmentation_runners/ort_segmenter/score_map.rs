//! Class-score maps: conversion from raw network outputs, multi-scale
//! accumulation and arg-max.

use anyhow::{bail, Result};
use ndarray::{Array2, Array3, Axis, Ix4, Zip};

use crate::common::LabelMap;
use crate::data::X;

/// Class scores laid out as `(num_class, height, width)`.
pub type ScoreMap = Array3<f32>;

/// Running equal-weight average of the score maps of every scale of one
/// sample, pinned to the label resolution.
#[derive(Debug, Clone)]
pub struct ScoreAccumulator {
    scores: ScoreMap,
    num_scales: usize,
    added: usize,
}

impl ScoreAccumulator {
    pub fn new(num_class: usize, seg_size: (usize, usize), num_scales: usize) -> Self {
        Self {
            scores: ScoreMap::zeros((num_class, seg_size.0, seg_size.1)),
            num_scales: num_scales.max(1),
            added: 0,
        }
    }

    /// `scores / num_scales` is added to the running sum.
    pub fn add(&mut self, scores: &ScoreMap) -> Result<()> {
        if scores.dim() != self.scores.dim() {
            bail!(
                "Score map of shape {:?} does not match accumulator shape {:?}",
                scores.dim(),
                self.scores.dim()
            );
        }
        self.scores.scaled_add(1.0 / self.num_scales as f32, scores);
        self.added += 1;
        Ok(())
    }

    pub fn scores(&self) -> &ScoreMap {
        &self.scores
    }

    pub fn added(&self) -> usize {
        self.added
    }

    pub fn prediction(&self) -> LabelMap {
        argmax(&self.scores)
    }

    pub fn into_prediction(self) -> LabelMap {
        self.prediction()
    }
}

/// Per-pixel index of the highest class score; the lowest index wins ties.
pub fn argmax(scores: &ScoreMap) -> LabelMap {
    let (_, h, w) = scores.dim();
    let mut pred = Array2::<i32>::zeros((h, w));
    Zip::from(&mut pred)
        .and(scores.lanes(Axis(0)))
        .par_for_each(|p, lane| {
            let mut best = 0usize;
            for (c, v) in lane.iter().enumerate() {
                if *v > lane[best] {
                    best = c;
                }
            }
            *p = best as i32;
        });
    pred
}

/// Softmax over the class axis, in place.
pub fn softmax(scores: &mut ScoreMap) {
    Zip::from(scores.lanes_mut(Axis(0))).par_for_each(|mut lane| {
        let max = lane.fold(f32::NEG_INFINITY, |m, v| m.max(*v));
        lane.mapv_inplace(|v| (v - max).exp());
        let sum = lane.sum();
        if sum > 0.0 {
            lane.mapv_inplace(|v| v / sum);
        }
    });
}

/// Bilinear resize of every class plane to `(height, width)` using
/// half-pixel centers (no corner alignment).
pub fn resize_bilinear(scores: &ScoreMap, size: (usize, usize)) -> ScoreMap {
    let (c, in_h, in_w) = scores.dim();
    let (out_h, out_w) = size;
    if (in_h, in_w) == (out_h, out_w) {
        return scores.to_owned();
    }

    let ys = source_coords(in_h, out_h);
    let xs = source_coords(in_w, out_w);
    let mut out = ScoreMap::zeros((c, out_h, out_w));
    Zip::indexed(&mut out).par_for_each(|(k, y, x), v| {
        let (y0, y1, ly) = ys[y];
        let (x0, x1, lx) = xs[x];
        let top = scores[[k, y0, x0]] * (1.0 - lx) + scores[[k, y0, x1]] * lx;
        let bottom = scores[[k, y1, x0]] * (1.0 - lx) + scores[[k, y1, x1]] * lx;
        *v = top * (1.0 - ly) + bottom * ly;
    });
    out
}

fn source_coords(in_len: usize, out_len: usize) -> Vec<(usize, usize, f32)> {
    let scale = in_len as f32 / out_len as f32;
    (0..out_len)
        .map(|i| {
            let src = ((i as f32 + 0.5) * scale - 0.5).max(0.0);
            let i0 = (src.floor() as usize).min(in_len - 1);
            let i1 = (i0 + 1).min(in_len - 1);
            (i0, i1, src - i0 as f32)
        })
        .collect()
}

/// Turn a `1×C×h×w` network output into a `C×H×W` score map at label
/// resolution, optionally through a class softmax.
pub fn scores_from_output(
    x: &X,
    num_class: usize,
    seg_size: (usize, usize),
    apply_softmax: bool,
) -> Result<ScoreMap> {
    let x = x.view().into_dimensionality::<Ix4>().map_err(|_| {
        anyhow::anyhow!("Expected a 1xCxHxW score tensor, got shape {:?}", x.shape())
    })?;
    let (n, c, h, w) = x.dim();
    if n != 1 {
        bail!("Expected a batch of one score map, got {n}");
    }
    if c != num_class {
        bail!("Network produced {c} class channels, expected num_class = {num_class}");
    }
    if h == 0 || w == 0 {
        bail!("Network produced an empty score map");
    }

    let mut scores = x.index_axis(Axis(0), 0).to_owned();
    if apply_softmax {
        softmax(&mut scores);
    }
    Ok(resize_bilinear(&scores, seg_size))
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn argmax_prefers_lowest_index_on_ties() {
        let scores = array![[[0.5, 0.1]], [[0.5, 0.2]], [[0.1, 0.7]]];
        assert_eq!(argmax(&scores), array![[0, 2]]);
    }

    #[test]
    fn duplicated_scales_match_single_scale() {
        let single = array![[[0.2, 0.6], [0.3, 0.1]], [[0.8, 0.4], [0.7, 0.9]]];

        let mut once = ScoreAccumulator::new(2, (2, 2), 1);
        once.add(&single).unwrap();

        let mut repeated = ScoreAccumulator::new(2, (2, 2), 4);
        for _ in 0..4 {
            repeated.add(&single).unwrap();
        }
        assert_eq!(repeated.added(), 4);
        for (a, b) in repeated.scores().iter().zip(once.scores()) {
            assert!((a - b).abs() < 1e-6);
        }
        assert_eq!(repeated.into_prediction(), once.into_prediction());
    }

    #[test]
    fn accumulator_rejects_foreign_shapes() {
        let mut acc = ScoreAccumulator::new(2, (2, 2), 1);
        assert!(acc.add(&ScoreMap::zeros((2, 3, 2))).is_err());
    }

    #[test]
    fn softmax_normalizes_each_pixel() {
        let mut scores = array![[[1.0, -3.0]], [[2.0, 0.0]], [[3.0, 5.0]]];
        softmax(&mut scores);
        for x in 0..2 {
            let total: f32 = (0..3).map(|c| scores[[c, 0, x]]).sum();
            assert!((total - 1.0).abs() < 1e-6);
        }
        assert_eq!(argmax(&scores), array![[2, 2]]);
    }

    #[test]
    fn resize_keeps_constant_planes_constant() {
        let scores = ScoreMap::from_elem((2, 3, 5), 0.25);
        let out = resize_bilinear(&scores, (7, 4));
        assert_eq!(out.dim(), (2, 7, 4));
        assert!(out.iter().all(|v| (v - 0.25).abs() < 1e-6));
    }

    #[test]
    fn resize_upsamples_with_half_pixel_centers() {
        let scores = array![[[0.0, 1.0]]];
        let out = resize_bilinear(&scores, (1, 4));
        let expected = [0.0, 0.25, 0.75, 1.0];
        for (v, e) in out.iter().zip(expected) {
            assert!((v - e).abs() < 1e-6, "{v} != {e}");
        }
    }

    #[test]
    fn output_tensor_is_checked_against_num_class() {
        let x = X::from_shape_vec(&[1, 2, 1, 1], vec![0.1, 0.9]).unwrap();
        let scores = scores_from_output(&x, 2, (2, 2), false).unwrap();
        assert_eq!(scores.dim(), (2, 2, 2));
        assert_eq!(argmax(&scores), Array2::from_elem((2, 2), 1));
        assert!(scores_from_output(&x, 3, (2, 2), false).is_err());
    }
}
