mod eval_config;
mod inference_device;
mod model_arch;
mod seg_sample;

pub use eval_config::*;
pub use inference_device::*;
pub use model_arch::*;
pub use seg_sample::*;
