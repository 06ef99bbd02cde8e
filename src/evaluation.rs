//! The per-sample evaluation loop and its summary.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};

use crate::common::{EvalConfig, Sample};
use crate::data::{ArrayMeter, AverageMeter, ScoreAccumulator};
use crate::error::EvalError;
use crate::segmentation_processing::{accuracy, class_iou, intersection_and_union, mean, LabelPolicy};
use crate::segmentation_runners::InferenceProcess;
use crate::visualizer::visualize_result;

/// Settings of [`evaluate`] that do not come from the network.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalOptions {
    pub num_class: usize,
    pub policy: LabelPolicy,
    /// Composites are written here when set.
    pub result_dir: Option<PathBuf>,
    /// Expected number of samples, the length of the progress bar.
    pub total: Option<usize>,
}

impl EvalOptions {
    pub fn new(num_class: usize) -> Self {
        Self {
            num_class,
            policy: LabelPolicy::new(num_class),
            result_dir: None,
            total: None,
        }
    }

    pub fn with_ignore_index(mut self, ignore_index: Option<i32>) -> Self {
        self.policy = self.policy.with_ignore_index(ignore_index);
        self
    }

    pub fn with_result_dir(mut self, result_dir: Option<&Path>) -> Self {
        self.result_dir = result_dir.map(Path::to_path_buf);
        self
    }

    pub fn with_total(mut self, total: usize) -> Self {
        self.total = Some(total);
        self
    }
}

impl From<&EvalConfig> for EvalOptions {
    fn from(config: &EvalConfig) -> Self {
        Self::new(config.num_class)
            .with_ignore_index(config.ignore_index)
            .with_result_dir(config.visualize.then_some(config.result.as_path()))
    }
}

/// Aggregated metrics of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalSummary {
    pub num_samples: usize,
    pub intersection: Vec<f64>,
    pub union: Vec<f64>,
    pub class_iou: Vec<f64>,
    pub mean_iou: f64,
    /// Pixel accuracy over labeled pixels, in `[0, 1]`.
    pub accuracy: f64,
    /// Mean seconds per sample, all scales included.
    pub inference_time: f64,
    pub mean_loss: Option<f64>,
}

impl fmt::Display for EvalSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, iou) in self.class_iou.iter().enumerate() {
            writeln!(f, "class [{}], IoU: {:.4}", i, iou)?;
        }
        writeln!(f, "[Eval Summary]:")?;
        write!(
            f,
            "Mean IoU: {:.4}, Accuracy: {:.2}%, Inference Time: {:.4}s",
            self.mean_iou,
            self.accuracy * 100.0,
            self.inference_time
        )?;
        if let Some(loss) = self.mean_loss {
            write!(f, "\nMean Loss: {:.4}", loss)?;
        }
        Ok(())
    }
}

/// Bar over `total` samples; without a total only the count is shown.
pub fn progress_bar(total: Option<usize>) -> ProgressBar {
    let pb = match total {
        Some(n) => ProgressBar::new(n as u64),
        None => ProgressBar::no_length(),
    };
    if let Ok(style) =
        ProgressStyle::with_template("[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Run `module` over every sample and aggregate accuracy, IoU and timing.
///
/// The first failing sample aborts the run.
pub fn evaluate<M, I>(module: &mut M, samples: I, options: &EvalOptions) -> Result<EvalSummary>
where
    M: InferenceProcess + ?Sized,
    I: IntoIterator<Item = Result<Sample>>,
{
    evaluate_with_progress(module, samples, options, &progress_bar(options.total))
}

/// [`evaluate`], advancing `pb` once per sample and finishing it at the end.
pub fn evaluate_with_progress<M, I>(
    module: &mut M,
    samples: I,
    options: &EvalOptions,
    pb: &ProgressBar,
) -> Result<EvalSummary>
where
    M: InferenceProcess + ?Sized,
    I: IntoIterator<Item = Result<Sample>>,
{
    let num_class = options.num_class;
    if module.num_class() != num_class {
        return Err(EvalError::InvalidConfig(format!(
            "network scores {} classes, evaluation expects {}",
            module.num_class(),
            num_class
        ))
        .into());
    }

    let mut acc_meter = AverageMeter::default();
    let mut time_meter = AverageMeter::default();
    let mut loss_meter = AverageMeter::default();
    let mut intersection_meter = ArrayMeter::new(num_class);
    let mut union_meter = ArrayMeter::new(num_class);

    for sample in samples {
        let sample = sample?;
        sample.validate()?;
        let seg_size = sample.seg_size();

        module.synchronize()?;
        let tic = Instant::now();
        let mut scores = ScoreAccumulator::new(num_class, seg_size, sample.num_scales());
        for x in sample.img_data.iter() {
            let scores_tmp = module.forward(x, seg_size)?;
            scores.add(&scores_tmp)?;
        }
        let pred = scores.prediction();
        module.synchronize()?;
        time_meter.update(tic.elapsed().as_secs_f64(), 1.0);

        if let Some(crit) = module.criterion() {
            if let Some((loss, pix)) = crit.loss(scores.scores(), &sample.seg_label, &options.policy) {
                loss_meter.update(loss, pix as f64);
            }
        }

        let (acc, pix) = accuracy(&pred, &sample.seg_label, &options.policy);
        let (intersection, union) = intersection_and_union(&pred, &sample.seg_label, &options.policy);
        acc_meter.update(acc, pix as f64);
        intersection_meter.update(&intersection);
        union_meter.update(&union);

        if let Some(dir) = &options.result_dir {
            visualize_result(
                &sample.img_ori,
                &sample.seg_label,
                &pred,
                &sample.info,
                &options.policy,
                dir,
            )?;
        }

        log::debug!("{} | acc: {:.2}% | {:.4}s", sample.info, acc * 100.0, time_meter.value());
        pb.set_message(format!("accuracy: {:.2}%", acc_meter.average() * 100.0));
        pb.inc(1);
    }
    pb.finish();

    let intersection = intersection_meter.sum().to_vec();
    let union = union_meter.sum().to_vec();
    let ious = class_iou(&intersection, &union);
    Ok(EvalSummary {
        num_samples: intersection_meter.count(),
        mean_iou: mean(&ious),
        class_iou: ious,
        intersection,
        union,
        accuracy: acc_meter.average(),
        inference_time: time_meter.average(),
        mean_loss: (loss_meter.count() > 0.0).then(|| loss_meter.average()),
    })
}
