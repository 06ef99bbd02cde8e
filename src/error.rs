use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort an evaluation run.
///
/// Everything else (I/O, ONNX Runtime, image decoding) travels as a plain
/// `anyhow::Error` with context attached.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("checkpoint does not exist: {}", .0.display())]
    MissingCheckpoint(PathBuf),

    #[error("ONNX opset {found} in {model} is older than the minimum supported opset {required}")]
    UnsupportedOpset {
        model: String,
        found: i64,
        required: i64,
    },

    #[error("batch size {0} is not supported, samples are evaluated one at a time")]
    UnsupportedBatchSize(usize),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("malformed sample `{info}`: {reason}")]
    MalformedSample { info: String, reason: String },
}

impl EvalError {
    pub fn malformed(info: &str, reason: impl Into<String>) -> Self {
        EvalError::MalformedSample {
            info: info.to_string(),
            reason: reason.into(),
        }
    }
}
