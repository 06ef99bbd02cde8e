use ndarray::{Axis, Zip};

use crate::common::LabelMap;
use crate::data::ScoreMap;

/// Which ground-truth pixels count as labeled.
///
/// A pixel is labeled iff its value lies in `[0, num_class)` and differs from
/// `ignore_index`. Unlabeled pixels are excluded from accuracy, IoU and loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelPolicy {
    pub num_class: usize,
    pub ignore_index: Option<i32>,
}

impl LabelPolicy {
    pub fn new(num_class: usize) -> Self {
        Self {
            num_class,
            ignore_index: None,
        }
    }

    pub fn with_ignore_index(mut self, ignore_index: Option<i32>) -> Self {
        self.ignore_index = ignore_index;
        self
    }

    #[inline]
    pub fn is_labeled(&self, label: i32) -> bool {
        label >= 0 && (label as usize) < self.num_class && Some(label) != self.ignore_index
    }
}

/// Fraction of labeled pixels predicted correctly, and the labeled pixel count.
pub fn accuracy(pred: &LabelMap, label: &LabelMap, policy: &LabelPolicy) -> (f64, u64) {
    let mut correct = 0u64;
    let mut labeled = 0u64;
    Zip::from(pred).and(label).for_each(|&p, &l| {
        if policy.is_labeled(l) {
            labeled += 1;
            if p == l {
                correct += 1;
            }
        }
    });
    (correct as f64 / (labeled as f64 + 1e-10), labeled)
}

/// Per-class `(intersection, union)` pixel counts over labeled pixels.
pub fn intersection_and_union(
    pred: &LabelMap,
    label: &LabelMap,
    policy: &LabelPolicy,
) -> (Vec<u64>, Vec<u64>) {
    let n = policy.num_class;
    let mut area_inter = vec![0u64; n];
    let mut area_pred = vec![0u64; n];
    let mut area_label = vec![0u64; n];
    Zip::from(pred).and(label).for_each(|&p, &l| {
        if !policy.is_labeled(l) {
            return;
        }
        area_label[l as usize] += 1;
        if p >= 0 && (p as usize) < n {
            area_pred[p as usize] += 1;
            if p == l {
                area_inter[p as usize] += 1;
            }
        }
    });
    let area_union = area_pred
        .iter()
        .zip(&area_label)
        .zip(&area_inter)
        .map(|((p, l), i)| p + l - i)
        .collect();
    (area_inter, area_union)
}

/// `intersection / (union + 1e-10)` per class.
pub fn class_iou(intersection: &[f64], union: &[f64]) -> Vec<f64> {
    intersection
        .iter()
        .zip(union)
        .map(|(i, u)| i / (u + 1e-10))
        .collect()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Loss attached to the composed module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Criterion {
    /// Negative log-likelihood of the labeled class, computed on class
    /// probabilities (decoders end in a softmax, or `--softmax` is set).
    #[default]
    NllLoss,
}

impl Criterion {
    /// Mean loss over labeled pixels and the number of labeled pixels, or
    /// `None` when the sample has no labeled pixel.
    pub fn loss(&self, scores: &ScoreMap, label: &LabelMap, policy: &LabelPolicy) -> Option<(f64, u64)> {
        match self {
            Criterion::NllLoss => {
                let mut total = 0f64;
                let mut labeled = 0u64;
                Zip::from(scores.lanes(Axis(0))).and(label).for_each(|lane, &l| {
                    if policy.is_labeled(l) {
                        let p = lane[l as usize].max(1e-10) as f64;
                        total -= p.ln();
                        labeled += 1;
                    }
                });
                (labeled > 0).then(|| (total / labeled as f64, labeled))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn perfect_prediction() {
        let label = array![[0, 0], [1, 2]];
        let policy = LabelPolicy::new(3);
        let (acc, pix) = accuracy(&label, &label, &policy);
        assert!((acc - 1.0).abs() < 1e-9);
        assert_eq!(pix, 4);

        let (inter, union) = intersection_and_union(&label, &label, &policy);
        assert_eq!(inter, vec![2, 1, 1]);
        assert_eq!(union, vec![2, 1, 1]);
        let iou = class_iou(
            &inter.iter().map(|v| *v as f64).collect::<Vec<_>>(),
            &union.iter().map(|v| *v as f64).collect::<Vec<_>>(),
        );
        assert!(iou.iter().all(|v| (v - 1.0).abs() < 1e-9));
        assert!((mean(&iou) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn constant_prediction() {
        let pred = array![[0, 0], [0, 0]];
        let label = array![[0, 0], [1, 2]];
        let policy = LabelPolicy::new(3);
        let (inter, union) = intersection_and_union(&pred, &label, &policy);
        assert_eq!(inter, vec![2, 0, 0]);
        assert_eq!(union, vec![4, 1, 1]);
        let iou = class_iou(&[2.0, 0.0, 0.0], &[4.0, 1.0, 1.0]);
        assert!((iou[0] - 0.5).abs() < 1e-9);
        assert_eq!(&iou[1..], &[0.0, 0.0]);
        let (acc, _) = accuracy(&pred, &label, &policy);
        assert!((acc - 0.5).abs() < 1e-9);
    }

    #[test]
    fn disjoint_class_union_is_sum_of_areas() {
        let pred = array![[1, 1, 0], [0, 0, 0]];
        let label = array![[0, 0, 1], [1, 0, 0]];
        let policy = LabelPolicy::new(2);
        let (inter, union) = intersection_and_union(&pred, &label, &policy);
        // class 1: predicted at 2 pixels, labeled at 2 other pixels
        assert_eq!(inter[1], 0);
        assert_eq!(union[1], 4);
    }

    #[test]
    fn unlabeled_pixels_are_ignored() {
        let pred = array![[0, 1], [2, 2]];
        let label = array![[0, -1], [7, 2]];
        let policy = LabelPolicy::new(3);
        let (acc, pix) = accuracy(&pred, &label, &policy);
        assert_eq!(pix, 2);
        assert!((acc - 1.0).abs() < 1e-9);
        let (inter, union) = intersection_and_union(&pred, &label, &policy);
        assert_eq!(inter, vec![1, 0, 1]);
        assert_eq!(union, vec![1, 0, 1]);

        let policy = LabelPolicy::new(3).with_ignore_index(Some(2));
        let (_, pix) = accuracy(&pred, &label, &policy);
        assert_eq!(pix, 1);
    }

    #[test]
    fn nll_loss_on_probabilities() {
        let scores = array![[[1.0, 0.5]], [[0.0, 0.5]]];
        let label = array![[0, 1]];
        let (loss, pix) = Criterion::NllLoss
            .loss(&scores, &label, &LabelPolicy::new(2))
            .unwrap();
        assert_eq!(pix, 2);
        assert!((loss - (2f64.ln() / 2.0)).abs() < 1e-6);

        let unlabeled = array![[-1, -1]];
        assert!(Criterion::NllLoss
            .loss(&scores, &unlabeled, &LabelPolicy::new(2))
            .is_none());
    }
}
