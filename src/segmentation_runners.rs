pub mod inference_process;
pub mod ort_segmenter;

pub use inference_process::InferenceProcess;
pub use ort_segmenter::*;
