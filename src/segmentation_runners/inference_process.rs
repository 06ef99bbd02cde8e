use std::time::Instant;

use anyhow::Result;

use crate::data::{ScoreMap, Xs, X};
use crate::segmentation_processing::Criterion;
use crate::segmentation_runners::ort_segmenter::score_map::scores_from_output;

/// A segmentation network seen by the evaluation loop: one normalized
/// image tensor in, one class-score map at label resolution out.
pub trait InferenceProcess {
    /// Number of classes the network scores.
    fn num_class(&self) -> usize;

    /// Pre-process the input tensor.
    fn preprocess(&self, x: &X) -> Result<Xs> {
        Ok(Xs::from(x.clone()))
    }

    /// Executes the network on the preprocessed data.
    fn inference(&mut self, xs: Xs) -> Result<Xs>;

    /// Turns the last network output into a score map of `seg_size`.
    fn postprocess(&self, xs: Xs, seg_size: (usize, usize)) -> Result<ScoreMap> {
        let y = match xs.into_iter().last() {
            Some(y) => y,
            None => anyhow::bail!("Network returned no output"),
        };
        scores_from_output(&y, self.num_class(), seg_size, false)
    }

    /// Executes the full pipeline for one scale.
    fn forward(&mut self, x: &X, seg_size: (usize, usize)) -> Result<ScoreMap> {
        let t_pre = Instant::now();
        let ys = self.preprocess(x)?;
        let t_pre = t_pre.elapsed();

        let t_exe = Instant::now();
        let ys = self.inference(ys)?;
        let t_exe = t_exe.elapsed();

        let t_post = Instant::now();
        let ys = self.postprocess(ys, seg_size)?;
        let t_post = t_post.elapsed();

        log::trace!("Preprocess: {t_pre:?} | Inference: {t_exe:?} | Postprocess: {t_post:?}");
        Ok(ys)
    }

    /// Blocks until queued device work is finished.
    fn synchronize(&self) -> Result<()> {
        Ok(())
    }

    /// Loss reported next to the metrics, if any.
    fn criterion(&self) -> Option<&Criterion> {
        None
    }

    fn print_time(&self) {}
}
