mod onnx;
mod ort_engine;
mod segmentation_module;
pub mod image_ops;
pub mod input_wrapper;
pub mod score_map;
pub mod xs;

pub use ort_engine::*;
pub use segmentation_module::*;
