use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::args::Args;
use crate::common::inference_device::InferenceDevice;
use crate::common::model_arch::{normalize_arch, ModelArch};
use crate::data::ConfigOrt;
use crate::error::EvalError;

/// Resolved, read-only settings of one evaluation run.
#[derive(Debug, Clone)]
pub struct EvalConfig {
    pub id: String,
    pub suffix: String,
    pub arch_encoder: String,
    pub arch_decoder: String,
    pub arch_unet: String,
    pub arch: ModelArch,
    pub fc_dim: usize,
    pub list_val: PathBuf,
    pub root_dataset: PathBuf,
    pub num_val: Option<usize>,
    pub num_class: usize,
    pub batch_size: usize,
    pub img_sizes: Vec<u32>,
    pub img_max_size: u32,
    pub padding_constant: u32,
    pub ckpt: PathBuf,
    /// Checkpoint files in [`ModelArch::components`] order.
    pub weights: Vec<PathBuf>,
    pub visualize: bool,
    pub result: PathBuf,
    pub gpu: usize,
    pub device: InferenceDevice,
    pub ort_lib_path: Option<String>,
    pub trt_fp16: bool,
    pub trt_engine_cache: bool,
    pub profile: bool,
    pub num_workers: usize,
    pub label_offset: i32,
    pub ignore_index: Option<i32>,
    pub softmax: bool,
}

impl EvalConfig {
    /// Resolve the arguments, check that every checkpoint exists and create
    /// the per-model result directory.
    pub fn from_args(args: Args) -> Result<Self> {
        let config = Self::resolve(args)?;
        config.check_checkpoints()?;
        config.ensure_result_dir()?;
        Ok(config)
    }

    /// Pure part of [`EvalConfig::from_args`]: no filesystem access.
    pub fn resolve(args: Args) -> Result<Self> {
        if args.batch_size != 1 {
            return Err(EvalError::UnsupportedBatchSize(args.batch_size).into());
        }
        if args.num_class == 0 {
            return Err(EvalError::InvalidConfig("num_class must be positive".into()).into());
        }
        if args.img_size.is_empty() || args.img_size.contains(&0) {
            return Err(EvalError::InvalidConfig(format!(
                "imgSize must be a non-empty list of positive sizes, got {:?}",
                args.img_size
            ))
            .into());
        }
        if args.img_max_size == 0 || args.padding_constant == 0 {
            return Err(EvalError::InvalidConfig(
                "imgMaxSize and padding_constant must be positive".into(),
            )
            .into());
        }
        let device = InferenceDevice::from_str(&args.device, args.gpu).ok_or_else(|| {
            EvalError::InvalidConfig(format!(
                "unknown device `{}`, expected one of {:?}",
                args.device,
                InferenceDevice::all_inference_devices()
            ))
        })?;

        let arch_encoder = normalize_arch(&args.arch_encoder);
        let arch_decoder = normalize_arch(&args.arch_decoder);
        let arch_unet = normalize_arch(&args.arch_unet);
        let arch = if args.unet {
            ModelArch::unet(&arch_unet)
        } else {
            ModelArch::encoder_decoder(&arch_encoder, &arch_decoder)
        };

        let ckpt = PathBuf::from(&args.ckpt);
        let weights = arch.checkpoint_paths(&ckpt, &args.id, &args.suffix);
        let result = Path::new(&args.result).join(&args.id);
        let num_val = usize::try_from(args.num_val).ok().filter(|n| *n > 0);

        Ok(Self {
            id: args.id,
            suffix: args.suffix,
            arch_encoder,
            arch_decoder,
            arch_unet,
            arch,
            fc_dim: args.fc_dim,
            list_val: PathBuf::from(args.list_val),
            root_dataset: PathBuf::from(args.root_dataset),
            num_val,
            num_class: args.num_class,
            batch_size: args.batch_size,
            img_sizes: args.img_size,
            img_max_size: args.img_max_size,
            padding_constant: args.padding_constant,
            ckpt,
            weights,
            visualize: args.visualize,
            result,
            gpu: args.gpu,
            device,
            ort_lib_path: args.ort_lib,
            trt_fp16: args.trt_fp16,
            trt_engine_cache: args.trt_engine_cache,
            profile: args.profile,
            num_workers: args.num_workers.max(1),
            label_offset: args.label_offset,
            ignore_index: args.ignore_index,
            softmax: args.softmax,
        })
    }

    pub fn check_checkpoints(&self) -> Result<()> {
        for path in &self.weights {
            if !path.is_file() {
                return Err(EvalError::MissingCheckpoint(path.clone()).into());
            }
        }
        Ok(())
    }

    pub fn ensure_result_dir(&self) -> Result<()> {
        if !self.result.is_dir() {
            std::fs::create_dir_all(&self.result).with_context(|| {
                format!("failed to create result directory {}", self.result.display())
            })?;
            log::debug!("Created result directory {}", self.result.display());
        }
        Ok(())
    }

    pub fn weights_for(&self, component: &str) -> Option<&Path> {
        self.arch
            .components()
            .iter()
            .position(|c| *c == component)
            .and_then(|i| self.weights.get(i))
            .map(PathBuf::as_path)
    }

    /// Session options of one network component.
    pub fn session_options(&self, component: &str, arch: &str) -> Result<ConfigOrt> {
        let weights = self.weights_for(component).ok_or_else(|| {
            EvalError::InvalidConfig(format!("no checkpoint resolved for `{component}`"))
        })?;
        let options = ConfigOrt::new()
            .with_name(component)
            .with_model(&weights.to_string_lossy())?
            .with_ort_lib_path(self.ort_lib_path.as_deref())
            .with_device(self.device)
            .with_arch(arch)
            .with_trt_fp16(self.trt_fp16)
            .with_trt_engine_cache(self.trt_engine_cache)
            .with_profile(self.profile);
        Ok(options)
    }

    /// `(name, value)` pairs echoed at startup.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        let mut entries = vec![
            ("id", self.id.clone()),
            ("suffix", self.suffix.clone()),
            ("arch_encoder", self.arch_encoder.clone()),
            ("arch_decoder", self.arch_decoder.clone()),
            ("fc_dim", self.fc_dim.to_string()),
            ("unet", self.arch.is_unet().to_string()),
            ("arch_unet", self.arch_unet.clone()),
            ("list_val", self.list_val.display().to_string()),
            ("root_dataset", self.root_dataset.display().to_string()),
            (
                "num_val",
                self.num_val.map_or_else(|| "-1".to_string(), |n| n.to_string()),
            ),
            ("num_class", self.num_class.to_string()),
            ("batch_size", self.batch_size.to_string()),
            ("imgSize", format!("{:?}", self.img_sizes)),
            ("imgMaxSize", self.img_max_size.to_string()),
            ("padding_constant", self.padding_constant.to_string()),
            ("ckpt", self.ckpt.display().to_string()),
            ("visualize", self.visualize.to_string()),
            ("result", self.result.display().to_string()),
            ("gpu", self.gpu.to_string()),
            ("device", self.device.to_string()),
            ("trt_fp16", self.trt_fp16.to_string()),
            ("trt_engine_cache", self.trt_engine_cache.to_string()),
            ("profile", self.profile.to_string()),
            ("num_workers", self.num_workers.to_string()),
            ("label_offset", self.label_offset.to_string()),
            (
                "ignore_index",
                self.ignore_index.map_or_else(|| "none".to_string(), |i| i.to_string()),
            ),
            ("softmax", self.softmax.to_string()),
        ];
        if let Some(lib) = &self.ort_lib_path {
            entries.push(("ort_lib", lib.clone()));
        }
        for (component, path) in self.arch.components().iter().zip(&self.weights) {
            let key = match *component {
                "encoder" => "weights_encoder",
                "decoder" => "weights_decoder",
                _ => "weights_unet",
            };
            entries.push((key, path.display().to_string()));
        }
        entries
    }
}

impl fmt::Display for EvalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Input arguments:")?;
        for (key, value) in self.entries() {
            writeln!(f, "{:16} {}", key, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["seg-eval", "--id", "baseline"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn defaults_select_unet() {
        let config = EvalConfig::resolve(parse(&[])).unwrap();
        assert!(config.arch.is_unet());
        assert_eq!(config.weights, vec![PathBuf::from("ckpt/baseline/unet_epoch_20.onnx")]);
        assert_eq!(config.result, PathBuf::from("result/baseline"));
        assert_eq!(config.num_val, None);
        assert_eq!(config.img_sizes.len(), 14);
        assert!(config.visualize);
    }

    #[test]
    fn encoder_decoder_mode_normalizes_names() {
        let config = EvalConfig::resolve(parse(&[
            "--unet",
            "false",
            "--arch_encoder",
            "ResNet50Dilated",
            "--arch_decoder",
            "PPM_DeepSup",
            "--suffix",
            "_best.onnx",
            "--num_val",
            "10",
        ]))
        .unwrap();
        assert_eq!(config.arch, ModelArch::encoder_decoder("resnet50dilated", "ppm_deepsup"));
        assert_eq!(
            config.weights_for("decoder"),
            Some(Path::new("ckpt/baseline/decoder_best.onnx"))
        );
        assert_eq!(config.num_val, Some(10));
    }

    #[test]
    fn rejects_batches_larger_than_one() {
        let err = EvalConfig::resolve(parse(&["--batch_size", "4"])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EvalError>(),
            Some(EvalError::UnsupportedBatchSize(4))
        ));
    }

    #[test]
    fn multi_scale_sizes_parse_in_order() {
        let config = EvalConfig::resolve(parse(&["--imgSize", "300", "400", "500"])).unwrap();
        assert_eq!(config.img_sizes, vec![300, 400, 500]);
    }

    #[test]
    fn missing_checkpoint_is_reported_with_its_path() {
        let config = EvalConfig::resolve(parse(&["--ckpt", "/nonexistent/ckpt"])).unwrap();
        let err = config.check_checkpoints().unwrap_err();
        match err.downcast_ref::<EvalError>() {
            Some(EvalError::MissingCheckpoint(path)) => {
                assert_eq!(path, &PathBuf::from("/nonexistent/ckpt/baseline/unet_epoch_20.onnx"))
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn session_options_carry_runtime_flags() {
        let config = EvalConfig::resolve(parse(&[
            "--unet",
            "false",
            "--device",
            "tensorrt",
            "--gpu",
            "1",
            "--trt_fp16",
            "--trt_engine_cache",
            "false",
            "--profile",
        ]))
        .unwrap();
        let options = config.session_options("decoder", "ppm_deepsup").unwrap();
        assert_eq!(options.name, "decoder");
        assert_eq!(options.onnx_path, "ckpt/baseline/decoder_epoch_20.onnx");
        assert_eq!(options.device, InferenceDevice::TensorRT(1));
        assert!(options.trt_fp16_enable);
        assert!(!options.trt_engine_cache_enable);
        assert!(options.profile);

        let defaults = EvalConfig::resolve(parse(&[])).unwrap();
        let options = defaults.session_options("unet", "albunet").unwrap();
        assert!(!options.trt_fp16_enable && options.trt_engine_cache_enable && !options.profile);
        assert!(defaults.session_options("encoder", "resnet50dilated").is_err());
    }

    #[test]
    fn echo_lists_resolved_weights() {
        let config = EvalConfig::resolve(parse(&[])).unwrap();
        let echo = config.to_string();
        assert!(echo.starts_with("Input arguments:\n"));
        assert!(echo.contains("weights_unet     ckpt/baseline/unet_epoch_20.onnx"));
    }
}
