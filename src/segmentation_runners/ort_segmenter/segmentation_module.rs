use anyhow::{Context, Result};

use crate::common::{EvalConfig, ModelArch};
use crate::data::{ScoreMap, TimeCalc, Xs};
use crate::error::EvalError;
use crate::segmentation_processing::Criterion;
use crate::segmentation_runners::inference_process::InferenceProcess;
use crate::segmentation_runners::ort_segmenter::ort_engine::OrtEngine;
use crate::segmentation_runners::ort_segmenter::score_map::scores_from_output;

/// How the loaded sessions are chained.
#[derive(Debug)]
pub enum Assembly {
    /// Encoder features are fed to the decoder.
    EncoderDecoder { encoder: OrtEngine, decoder: OrtEngine },
    Unet(OrtEngine),
}

/// The composed network: image tensor in, class scores out.
#[derive(Debug)]
pub struct SegmentationModule {
    arch: ModelArch,
    assembly: Assembly,
    num_class: usize,
    softmax: bool,
    crit: Criterion,
    pub infer_time: TimeCalc,
}

impl SegmentationModule {
    pub fn new(config: &EvalConfig) -> Result<Self> {
        let build = |component: &str, arch: &str| -> Result<OrtEngine> {
            let options = config.session_options(component, arch)?;
            log::info!(
                "Initializing {} ({}) with the {} execution provider",
                component,
                options.onnx_path,
                config.device
            );
            OrtEngine::new(&options)
        };

        let assembly = match &config.arch {
            ModelArch::EncoderDecoder { encoder, decoder } => Assembly::EncoderDecoder {
                encoder: build("encoder", encoder.as_str())?,
                decoder: build("decoder", decoder.as_str())?,
            },
            ModelArch::Unet { arch } => Assembly::Unet(build("unet", arch.as_str())?),
        };

        Self::assemble(config.arch.clone(), assembly, config.num_class, config.fc_dim, config.softmax)
    }

    /// Validate the channel contracts between the sessions and wrap them.
    pub fn assemble(
        arch: ModelArch,
        assembly: Assembly,
        num_class: usize,
        fc_dim: usize,
        softmax: bool,
    ) -> Result<Self> {
        let head = match &assembly {
            Assembly::EncoderDecoder { encoder, decoder } => {
                check_feature_contract(encoder.out_dimss(), decoder.in_dimss(), fc_dim)?;
                decoder
            }
            Assembly::Unet(unet) => unet,
        };
        check_head_contract(head.name(), head.out_dimss(), num_class)?;

        Ok(Self {
            arch,
            assembly,
            num_class,
            softmax,
            crit: Criterion::NllLoss,
            infer_time: TimeCalc::default(),
        })
    }

    pub fn arch(&self) -> &ModelArch {
        &self.arch
    }
}

/// Channel axis of the last tensor in `dimss`.
fn last_channels(dimss: &[Vec<usize>]) -> Option<usize> {
    dimss.last().and_then(|d| d.get(1)).copied()
}

/// The decoder is fed the last encoder outputs, so the `fc_dim` feature map is
/// both the encoder's last output and the decoder's last input.
fn check_feature_contract(
    enc_out_dimss: &[Vec<usize>],
    dec_in_dimss: &[Vec<usize>],
    fc_dim: usize,
) -> Result<()> {
    check_channels("encoder output", last_channels(enc_out_dimss), fc_dim, "fc_dim")?;
    check_channels("decoder input", last_channels(dec_in_dimss), fc_dim, "fc_dim")
}

/// The scores are read from the last output of the final session.
fn check_head_contract(name: &str, out_dimss: &[Vec<usize>], num_class: usize) -> Result<()> {
    check_channels(&format!("{name} output"), last_channels(out_dimss), num_class, "num_class")
}

/// Static channel counts must match; dynamic ones (`0`) are checked at run time.
fn check_channels(what: &str, found: Option<usize>, expected: usize, flag: &str) -> Result<()> {
    match found {
        Some(c) if c > 0 && c != expected => Err(EvalError::InvalidConfig(format!(
            "{what} has {c} channels but {flag} is {expected}"
        ))
        .into()),
        _ => Ok(()),
    }
}

impl InferenceProcess for SegmentationModule {
    fn num_class(&self) -> usize {
        self.num_class
    }

    fn inference(&mut self, xs: Xs) -> Result<Xs> {
        let t = std::time::Instant::now();
        let ys = match &mut self.assembly {
            Assembly::Unet(unet) => unet.engine_run(xs)?,
            Assembly::EncoderDecoder { encoder, decoder } => {
                let features = encoder.engine_run(xs)?;
                let n = decoder.in_names().len();
                let features = features
                    .last_n(n)
                    .context("encoder produced fewer feature maps than the decoder consumes")?;
                decoder.engine_run(features)?
            }
        };
        self.infer_time.add(t.elapsed());
        Ok(ys)
    }

    fn postprocess(&self, xs: Xs, seg_size: (usize, usize)) -> Result<ScoreMap> {
        let y = match xs.into_iter().last() {
            Some(y) => y,
            None => anyhow::bail!("{} returned no output", self.arch.name()),
        };
        scores_from_output(&y, self.num_class, seg_size, self.softmax)
    }

    /// ONNX Runtime copies outputs back to host memory before `run` returns,
    /// so there is never pending device work here.
    fn synchronize(&self) -> Result<()> {
        Ok(())
    }

    fn criterion(&self) -> Option<&Criterion> {
        Some(&self.crit)
    }

    fn print_time(&self) {
        let engines: Vec<&OrtEngine> = match &self.assembly {
            Assembly::Unet(unet) => vec![unet],
            Assembly::EncoderDecoder { encoder, decoder } => vec![encoder, decoder],
        };
        for engine in engines {
            let ts = engine.ts();
            log::info!(
                "[{}] runs: {} | avg: {:.4?} [alignment: {:.4?} | inference: {:.4?} | to_f32: {:.4?}]",
                engine.name(),
                ts.n(),
                ts.avg(),
                ts.avg_i(0),
                ts.avg_i(1),
                ts.avg_i(2),
            );
        }
        log::info!(
            "[{}] forward passes: {} | avg: {:.4?}",
            self.arch.name(),
            self.infer_time.n(),
            self.infer_time.avg()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_channel_mismatch_is_rejected() {
        assert!(check_channels("decoder input", Some(512), 2048, "fc_dim").is_err());
        assert!(check_channels("decoder input", Some(2048), 2048, "fc_dim").is_ok());
    }

    #[test]
    fn dynamic_or_missing_channels_pass() {
        assert!(check_channels("unet output", Some(0), 3, "num_class").is_ok());
        assert!(check_channels("unet output", None, 3, "num_class").is_ok());
    }

    #[test]
    fn two_input_decoder_takes_fc_dim_last() {
        let encoder_out = vec![vec![1, 1024, 0, 0], vec![1, 2048, 0, 0]];
        let decoder_in = vec![vec![1, 1024, 0, 0], vec![1, 2048, 0, 0]];
        assert!(check_feature_contract(&encoder_out, &decoder_in, 2048).is_ok());

        let swapped = vec![vec![1, 2048, 0, 0], vec![1, 1024, 0, 0]];
        let err = check_feature_contract(&encoder_out, &swapped, 2048).unwrap_err();
        assert!(matches!(err.downcast_ref::<EvalError>(), Some(EvalError::InvalidConfig(_))));
    }

    #[test]
    fn head_contract_reads_the_last_output() {
        let outputs = vec![vec![1, 3, 0, 0], vec![1, 150, 0, 0]];
        assert!(check_head_contract("decoder", &outputs, 150).is_ok());
        assert!(check_head_contract("decoder", &outputs, 3).is_err());
        assert!(check_head_contract("unet", &[vec![1, 0, 0, 0]], 3).is_ok());
    }
}
