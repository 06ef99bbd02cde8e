//! Options for building one ONNX Runtime session.

use anyhow::Result;

use crate::common::InferenceDevice;

#[derive(Debug, Clone)]
pub struct ConfigOrt {
    /// Component name used in logs, e.g. `encoder`.
    pub name: String,
    pub onnx_path: String,
    pub ort_lib_path: Option<String>,
    pub device: InferenceDevice,
    pub profile: bool,
    /// Architecture expected in the graph's `arch` metadata entry.
    pub arch: Option<String>,

    // trt related
    pub trt_engine_cache_enable: bool,
    pub trt_fp16_enable: bool,
}

impl Default for ConfigOrt {
    fn default() -> Self {
        Self {
            name: String::from("model"),
            onnx_path: String::new(),
            ort_lib_path: None,
            device: InferenceDevice::CPU,
            profile: false,
            arch: None,

            trt_engine_cache_enable: true,
            trt_fp16_enable: false,
        }
    }
}

impl ConfigOrt {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_model(mut self, onnx_path: &str) -> Result<Self> {
        if onnx_path.is_empty() {
            anyhow::bail!("Empty ONNX model path for `{}`", self.name);
        }
        self.onnx_path = onnx_path.to_string();
        Ok(self)
    }

    pub fn with_ort_lib_path(mut self, ort_lib_path: Option<&str>) -> Self {
        self.ort_lib_path = ort_lib_path.map(str::to_string);
        self
    }

    pub fn with_device(mut self, device_type: InferenceDevice) -> Self {
        self.device = device_type;
        self
    }

    pub fn with_arch(mut self, arch: &str) -> Self {
        self.arch = Some(arch.to_string());
        self
    }

    pub fn with_trt_fp16(mut self, x: bool) -> Self {
        self.trt_fp16_enable = x;
        self
    }

    pub fn with_trt_engine_cache(mut self, x: bool) -> Self {
        self.trt_engine_cache_enable = x;
        self
    }

    pub fn with_profile(mut self, profile: bool) -> Self {
        self.profile = profile;
        self
    }
}
