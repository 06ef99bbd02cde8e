use std::fmt;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum InferenceDevice {
    #[default] CPU,
    CUDA(usize),
    TensorRT(usize),
}

// Hardcoded device names. Storing the "proper" spelling and the lowercase version.
const CPU: [&str; 2] = ["CPU", "cpu"];
const CUDA: [&str; 2] = ["CUDA", "cuda"];
const TENSOR_RT: [&str; 2] = ["TensorRT", "tensorrt"];

impl InferenceDevice {
    pub fn from_str(device: &str, device_id: usize) -> Option<Self> {
        match device.trim().to_lowercase().as_str() {
            "cpu" => Some(InferenceDevice::CPU),
            "cuda" | "gpu" => Some(InferenceDevice::CUDA(device_id)),
            "tensorrt" | "trt" => Some(InferenceDevice::TensorRT(device_id)),
            _ => None,
        }
    }

    pub fn str(&self) -> &'static str {
        match self {
            InferenceDevice::CPU => CPU[0],
            InferenceDevice::CUDA(_) => CUDA[0],
            InferenceDevice::TensorRT(_) => TENSOR_RT[0],
        }
    }

    pub fn str_lowercase(&self) -> &'static str {
        match self {
            InferenceDevice::CPU => CPU[1],
            InferenceDevice::CUDA(_) => CUDA[1],
            InferenceDevice::TensorRT(_) => TENSOR_RT[1],
        }
    }

    pub fn device_id(&self) -> Option<usize> {
        match self {
            InferenceDevice::CPU => None,
            InferenceDevice::CUDA(id) | InferenceDevice::TensorRT(id) => Some(*id),
        }
    }

    pub fn all_inference_devices() -> Vec<&'static str> {
        vec![
            InferenceDevice::CPU.str_lowercase(),
            InferenceDevice::CUDA(0).str_lowercase(),
            InferenceDevice::TensorRT(0).str_lowercase(),
        ]
    }
}

impl fmt::Display for InferenceDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.device_id() {
            Some(id) => write!(f, "{}:{}", self.str(), id),
            None => f.write_str(self.str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(InferenceDevice::from_str("CUDA", 1), Some(InferenceDevice::CUDA(1)));
        assert_eq!(InferenceDevice::from_str("TensorRT", 0), Some(InferenceDevice::TensorRT(0)));
        assert_eq!(InferenceDevice::from_str(" cpu ", 3), Some(InferenceDevice::CPU));
        assert_eq!(InferenceDevice::from_str("rocm", 0), None);
    }

    #[test]
    fn display_includes_device_index() {
        assert_eq!(InferenceDevice::CUDA(2).to_string(), "CUDA:2");
        assert_eq!(InferenceDevice::CPU.to_string(), "CPU");
    }
}
