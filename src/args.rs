use clap::{ArgAction, Parser};

/// Evaluate a pretrained segmentation network on a labeled validation set
#[derive(Parser, Debug, Clone)]
#[command(name = "seg-eval", author, version, about, long_about = None)]
pub struct Args {
    /// A name identifying the model to load (sub-directory of --ckpt)
    #[arg(long)]
    pub id: String,

    /// Which snapshot to load, appended to encoder/decoder/unet
    #[arg(long, default_value = "_epoch_20.onnx")]
    pub suffix: String,

    /// Architecture of the encoder
    #[arg(long = "arch_encoder", default_value = "resnet50dilated")]
    pub arch_encoder: String,

    /// Architecture of the decoder
    #[arg(long = "arch_decoder", default_value = "ppm_deepsup")]
    pub arch_decoder: String,

    /// Number of feature channels between encoder and decoder
    #[arg(long = "fc_dim", default_value_t = 2048)]
    pub fc_dim: usize,

    /// Evaluate a single U-Net instead of an encoder/decoder pair
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub unet: bool,

    /// Architecture of the U-Net
    #[arg(long = "arch_unet", default_value = "albunet")]
    pub arch_unet: String,

    /// Validation manifest (.odgt, one JSON record per line)
    #[arg(long = "list_val", default_value = "data/validation.odgt")]
    pub list_val: String,

    /// Root directory the manifest paths are relative to
    #[arg(long = "root_dataset", default_value = "data/")]
    pub root_dataset: String,

    /// Number of images to evaluate, -1 for all
    #[arg(long = "num_val", default_value_t = -1, allow_negative_numbers = true)]
    pub num_val: i64,

    /// Number of classes
    #[arg(long = "num_class", default_value_t = 3)]
    pub num_class: usize,

    /// Batch size, only 1 is supported
    #[arg(long = "batch_size", default_value_t = 1)]
    pub batch_size: usize,

    /// Input image sizes (short edge), several values for multi-scale testing
    #[arg(
        long = "imgSize",
        num_args = 1..,
        default_values_t = [127u32, 83, 97, 130, 165, 118, 142, 384, 256, 528, 150, 95, 140, 170]
    )]
    pub img_size: Vec<u32>,

    /// Maximum input size of the long edge
    #[arg(long = "imgMaxSize", default_value_t = 528)]
    pub img_max_size: u32,

    /// Maximum down-sampling rate of the network; resized sides are rounded up to it
    #[arg(long = "padding_constant", default_value_t = 1)]
    pub padding_constant: u32,

    /// Checkpoint root directory
    #[arg(long, default_value = "ckpt")]
    pub ckpt: String,

    /// Write side-by-side visualizations
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub visualize: bool,

    /// Folder to output visualization results
    #[arg(long, default_value = "result")]
    pub result: String,

    /// Device index for evaluation
    #[arg(long, default_value_t = 0)]
    pub gpu: usize,

    /// Execution provider
    #[arg(long, default_value = "cuda", value_parser = ["cpu", "cuda", "tensorrt"])]
    pub device: String,

    /// Path of the ONNX Runtime shared library, ORT_DYLIB_PATH is used when absent
    #[arg(long = "ort_lib", value_name = "FILE")]
    pub ort_lib: Option<String>,

    /// Build TensorRT engines in half precision
    #[arg(long = "trt_fp16", default_value_t = false)]
    pub trt_fp16: bool,

    /// Cache built TensorRT engines under ./trt-cache
    #[arg(long = "trt_engine_cache", default_value_t = true, action = ArgAction::Set)]
    pub trt_engine_cache: bool,

    /// Log the stage timings of every session run
    #[arg(long, default_value_t = false)]
    pub profile: bool,

    /// Number of data-loading worker threads
    #[arg(long = "num_workers", default_value_t = 5)]
    pub num_workers: usize,

    /// Value subtracted from label image pixels when loading
    #[arg(long = "label_offset", default_value_t = 0, allow_negative_numbers = true)]
    pub label_offset: i32,

    /// Label value excluded from accuracy and IoU
    #[arg(long = "ignore_index", allow_negative_numbers = true)]
    pub ignore_index: Option<i32>,

    /// Apply a softmax over classes to raw network outputs
    #[arg(long, default_value_t = false)]
    pub softmax: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long = "log_level", default_value = "info")]
    pub log_level: String,
}
