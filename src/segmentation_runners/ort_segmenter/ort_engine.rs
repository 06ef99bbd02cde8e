//! ONNX Runtime session wrapper shared by every network component.

use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Instant;

use anyhow::{Context, Result};
use half::{bf16, f16};
use ndarray::{Array, IxDyn};
use ort::{
    execution_providers::{
        CPUExecutionProvider, CUDAExecutionProvider, ExecutionProvider, TensorRTExecutionProvider,
    },
    session::builder::{GraphOptimizationLevel, SessionBuilder},
    session::{Session, SessionInputValue},
    tensor::{PrimitiveTensorElementType, TensorElementType},
    value::{DynValue, Tensor},
};
use prost::Message;

use crate::common::{normalize_arch, InferenceDevice};
use crate::data::{ConfigOrt, TimeCalc, Xs, CROSS_MARK, X};
use crate::error::EvalError;
use crate::segmentation_runners::ort_segmenter::image_ops::make_divisible;
use crate::segmentation_runners::ort_segmenter::onnx;
use crate::utils::human_bytes;

/// Oldest default-domain opset the exported networks may use.
pub const MIN_OPSET_VERSION: i64 = 11;

/// Names, element types and dimensions of a graph's inputs or outputs.
/// Dynamic dimensions are stored as `0`.
#[derive(Debug, Clone, Default)]
pub struct OrtTensorAttr {
    pub names: Vec<String>,
    pub dtypes: Vec<TensorElementType>,
    pub dimss: Vec<Vec<usize>>,
}

static RUNTIME: OnceLock<std::result::Result<(), String>> = OnceLock::new();

/// Point the dynamically loaded ONNX Runtime at `ort_lib_path`, once per
/// process.
///
/// Without a path the runtime is located through `ORT_DYLIB_PATH` or the
/// system library search path on first use.
pub fn init_runtime(ort_lib_path: Option<&str>) -> Result<()> {
    let Some(path) = ort_lib_path else {
        return Ok(());
    };
    let committed = RUNTIME.get_or_init(|| match ort::init_from(path).commit() {
        Ok(_) => {
            log::debug!("ONNX Runtime loaded from {path}");
            Ok(())
        }
        Err(e) => {
            log::error!("{CROSS_MARK} ORT commit failed for {path}: {e:?}");
            Err(format!("{e:?}"))
        }
    });
    committed
        .clone()
        .map_err(|e| anyhow::anyhow!("Failed to commit ORT from {path}: {e}"))
}

/// One ONNX Runtime session plus the graph facts read from the model file.
#[derive(Debug)]
pub struct OrtEngine {
    name: String,
    session: Session,
    device: InferenceDevice,
    inputs_attrs: OrtTensorAttr,
    outputs_attrs: OrtTensorAttr,
    profile: bool,
    model_proto: onnx::ModelProto,
    params: usize,
    wb_mem: usize,
    pub infer_time: TimeCalc,
}

impl OrtEngine {
    pub fn new(config: &ConfigOrt) -> Result<Self> {
        let model_proto = Self::load_onnx(&config.onnx_path)
            .with_context(|| format!("Failed to load {} from {}", config.name, config.onnx_path))?;
        let opset = Self::check_opset(&config.name, &model_proto)?;

        let graph = match &model_proto.graph {
            Some(graph) => graph,
            None => anyhow::bail!("No graph found in {}. Failed to parse ONNX model.", config.onnx_path),
        };

        // params & weight memory, 16 byte aligned
        let byte_alignment = 16;
        let mut params: usize = 0;
        let mut wb_mem: usize = 0;
        let mut initializer_names: HashSet<&str> = HashSet::new();
        for tensor_proto in graph.initializer.iter() {
            initializer_names.insert(&tensor_proto.name);
            let param = tensor_proto.dims.iter().product::<i64>().max(0) as usize;
            params += param;
            if let Some(n) = Self::nbytes_from_onnx_dtype_id(tensor_proto.data_type) {
                wb_mem += make_divisible(param, byte_alignment) * n;
            }
        }

        let inputs_attrs = Self::io_from_onnx_value_info(&initializer_names, &graph.input)?;
        let outputs_attrs = Self::io_from_onnx_value_info(&initializer_names, &graph.output)?;
        log::debug!("{} inputs: {:?}", config.name, inputs_attrs);
        log::debug!("{} outputs: {:?}", config.name, outputs_attrs);

        init_runtime(config.ort_lib_path.as_deref())?;

        let mut builder = Session::builder()?;
        let mut device = config.device;
        match device {
            InferenceDevice::TensorRT(device_id) => {
                Self::build_trt(
                    &mut builder,
                    device_id,
                    config.trt_fp16_enable,
                    config.trt_engine_cache_enable,
                )?;
            }
            InferenceDevice::CUDA(device_id) => {
                Self::build_cuda(&mut builder, device_id).unwrap_or_else(|err| {
                    log::warn!("{err}, Using cpu");
                    device = InferenceDevice::CPU;
                })
            }
            InferenceDevice::CPU => {
                Self::build_cpu(&mut builder)?;
            }
        }

        let session = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(&config.onnx_path)?;

        let engine = Self {
            name: config.name.clone(),
            session,
            device,
            inputs_attrs,
            outputs_attrs,
            profile: config.profile,
            model_proto,
            params,
            wb_mem,
            infer_time: TimeCalc::default(),
        };

        if let (Some(expected), Some(found)) = (&config.arch, engine.try_fetch("arch")) {
            if normalize_arch(expected) != normalize_arch(&found) {
                log::warn!(
                    "{} was exported as `{}` but `{}` was requested",
                    engine.name,
                    found,
                    expected
                );
            }
        }

        log::info!(
            "Loaded {} | Backend: ONNXRuntime | Opset: {} | Device: {} | Params: {} | Weights: {}",
            engine.name,
            opset,
            engine.device(),
            human_bytes(engine.parameters() as f64),
            human_bytes(engine.memory_weights() as f64),
        );

        Ok(engine)
    }

    fn check_opset(name: &str, model_proto: &onnx::ModelProto) -> Result<i64> {
        let found = model_proto
            .opset_import
            .iter()
            .find(|o| o.domain.is_empty() || o.domain == "ai.onnx")
            .map(|o| o.version)
            .unwrap_or(0);
        if found < MIN_OPSET_VERSION {
            return Err(EvalError::UnsupportedOpset {
                model: name.to_string(),
                found,
                required: MIN_OPSET_VERSION,
            }
            .into());
        }
        Ok(found)
    }

    fn build_trt(
        builder: &mut SessionBuilder,
        device_id: usize,
        fp16_enable: bool,
        engine_cache_enable: bool,
    ) -> Result<()> {
        let trt = TensorRTExecutionProvider::default()
            .with_device_id(device_id as i32)
            .with_fp16(fp16_enable)
            .with_engine_cache(engine_cache_enable)
            .with_engine_cache_path("trt-cache")
            .with_timing_cache(false);
        if trt.is_available()? {
            if let Err(err) = trt.register(builder) {
                anyhow::bail!("{CROSS_MARK} TensorRT initialization failed: {:?}", err)
            }
            log::info!("Initial model serialization with TensorRT may take some time, once per input shape");
            Ok(())
        } else {
            anyhow::bail!("{CROSS_MARK} TensorRT execution provider not available")
        }
    }

    fn build_cuda(builder: &mut SessionBuilder, device_id: usize) -> Result<()> {
        let ep = CUDAExecutionProvider::default().with_device_id(device_id as i32);
        if ep.is_available()? {
            if let Err(err) = ep.register(builder) {
                anyhow::bail!("{CROSS_MARK} CUDA initialization failed: {:?}", err)
            }
            Ok(())
        } else {
            anyhow::bail!("{CROSS_MARK} CUDA execution provider not available")
        }
    }

    fn build_cpu(builder: &mut SessionBuilder) -> Result<()> {
        let ep = CPUExecutionProvider::default();
        if ep.is_available()? {
            if let Err(err) = ep.register(builder) {
                anyhow::bail!("{CROSS_MARK} CPU initialization failed: {:?}", err)
            }
            Ok(())
        } else {
            anyhow::bail!("{CROSS_MARK} CPU execution provider not available")
        }
    }

    fn tensor_preprocess(x: &X, dtype: &TensorElementType) -> Result<DynValue> {
        let x = match dtype {
            TensorElementType::Float32 => Tensor::from_array(x.0.clone())?.into_dyn(),
            TensorElementType::Float64 => Tensor::from_array(x.mapv(|x_| x_ as f64))?.into_dyn(),
            TensorElementType::Float16 => Tensor::from_array(x.mapv(f16::from_f32))?.into_dyn(),
            TensorElementType::Bfloat16 => Tensor::from_array(x.mapv(bf16::from_f32))?.into_dyn(),
            TensorElementType::Int32 => Tensor::from_array(x.mapv(|x_| x_ as i32))?.into_dyn(),
            TensorElementType::Int64 => Tensor::from_array(x.mapv(|x_| x_ as i64))?.into_dyn(),
            TensorElementType::Uint8 => Tensor::from_array(x.mapv(|x_| x_ as u8))?.into_dyn(),
            _ => anyhow::bail!("Unsupported ort input tensor type: {:?}", dtype),
        };
        Ok(x)
    }

    fn tensor_postprocess(x: &DynValue, dtype: &TensorElementType) -> Result<Array<f32, IxDyn>> {
        fn extract_and_convert<T>(x: &DynValue, map_fn: impl Fn(T) -> f32) -> Result<Array<f32, IxDyn>>
        where
            T: Clone + 'static + PrimitiveTensorElementType,
        {
            let x = x
                .try_extract_array::<T>()
                .map_err(|e| anyhow::anyhow!("Failed to extract from ort outputs: {e:?}"))?;
            Ok(x.mapv(map_fn))
        }
        match dtype {
            TensorElementType::Float32 => extract_and_convert::<f32>(x, |x| x),
            TensorElementType::Float16 => extract_and_convert::<f16>(x, f16::to_f32),
            TensorElementType::Bfloat16 => extract_and_convert::<bf16>(x, bf16::to_f32),
            TensorElementType::Float64 => extract_and_convert::<f64>(x, |x| x as f32),
            TensorElementType::Int64 => extract_and_convert::<i64>(x, |x| x as f32),
            TensorElementType::Int32 => extract_and_convert::<i32>(x, |x| x as f32),
            TensorElementType::Uint8 => extract_and_convert::<u8>(x, |x| x as f32),
            _ => Err(anyhow::anyhow!("Unsupported ort output tensor type: {:?}", dtype)),
        }
    }

    /// Feed `xs` positionally to the graph inputs and collect every output
    /// by name, converted to `f32`.
    pub fn engine_run(&mut self, xs: Xs) -> Result<Xs> {
        if xs.len() != self.inputs_attrs.names.len() {
            anyhow::bail!(
                "{} expects {} inputs, got {}",
                self.name,
                self.inputs_attrs.names.len(),
                xs.len()
            );
        }

        // alignment
        let t_pre = Instant::now();
        let mut xs_ = Vec::new();
        for (dtype, x) in self.inputs_attrs.dtypes.iter().zip(xs.iter()) {
            xs_.push(Into::<SessionInputValue<'_>>::into(Self::tensor_preprocess(x, dtype)?));
        }
        let t_pre = t_pre.elapsed();
        self.infer_time.add_or_push(0, t_pre);

        // inference
        let t_run = Instant::now();
        let outputs = self
            .session
            .run(&xs_[..])
            .with_context(|| format!("{} inference failed", self.name))?;
        let t_run = t_run.elapsed();
        self.infer_time.add_or_push(1, t_run);

        // extract
        let t_post = Instant::now();
        let mut ys = Xs::new();
        for (dtype, name) in self.outputs_attrs.dtypes.iter().zip(self.outputs_attrs.names.iter()) {
            let y = Self::tensor_postprocess(&outputs[name.as_str()], dtype)?;
            ys.push_kv(name.as_str(), X::from(y))?;
        }
        let t_post = t_post.elapsed();
        self.infer_time.add_or_push(2, t_post);

        if self.profile {
            let len = 10usize;
            let n = 4usize;
            log::info!(
                "[Profile {}] {:>len$.n$?} ({:>len$.n$?} avg) [alignment: {:>len$.n$?} | inference: {:>len$.n$?} | to_f32: {:>len$.n$?}]",
                self.name,
                t_pre + t_run + t_post,
                self.infer_time.avg(),
                t_pre,
                t_run,
                t_post,
            );
        }
        Ok(ys)
    }

    fn nbytes_from_onnx_dtype_id(x: i32) -> Option<usize> {
        match x {
            7 | 11 | 13 => Some(8),     // i64, f64, u64
            1 | 6 | 12 => Some(4),      // f32, i32, u32
            10 | 16 | 5 | 4 => Some(2), // f16, bf16, i16, u16
            2 | 3 | 9 => Some(1),       // u8, i8, bool
            _ => None,
        }
    }

    fn ort_dtype_from_onnx_dtype_id(value: i32) -> Option<TensorElementType> {
        match value {
            1 => Some(TensorElementType::Float32),
            2 => Some(TensorElementType::Uint8),
            3 => Some(TensorElementType::Int8),
            4 => Some(TensorElementType::Uint16),
            5 => Some(TensorElementType::Int16),
            6 => Some(TensorElementType::Int32),
            7 => Some(TensorElementType::Int64),
            8 => Some(TensorElementType::String),
            9 => Some(TensorElementType::Bool),
            10 => Some(TensorElementType::Float16),
            11 => Some(TensorElementType::Float64),
            12 => Some(TensorElementType::Uint32),
            13 => Some(TensorElementType::Uint64),
            16 => Some(TensorElementType::Bfloat16),
            _ => None,
        }
    }

    fn io_from_onnx_value_info(
        initializer_names: &HashSet<&str>,
        value_info: &[onnx::ValueInfoProto],
    ) -> Result<OrtTensorAttr> {
        let mut attrs = OrtTensorAttr::default();
        for v in value_info.iter() {
            if initializer_names.contains(v.name.as_str()) {
                continue;
            }
            let tensor = match v.r#type.as_ref().and_then(|t| t.value.as_ref()) {
                Some(onnx::type_proto::Value::TensorType(tensor)) => tensor,
                None => anyhow::bail!("`{}` is not a tensor", v.name),
            };
            let dtype = match Self::ort_dtype_from_onnx_dtype_id(tensor.elem_type) {
                Some(dtype) => dtype,
                None => anyhow::bail!("`{}` has unsupported element type {}", v.name, tensor.elem_type),
            };

            let mut dims: Vec<usize> = Vec::new();
            if let Some(shape) = &tensor.shape {
                for dim in shape.dim.iter() {
                    match &dim.value {
                        Some(onnx::tensor_shape_proto::dimension::Value::DimValue(x)) => {
                            dims.push((*x).max(0) as usize)
                        }
                        Some(onnx::tensor_shape_proto::dimension::Value::DimParam(_)) | None => {
                            dims.push(0)
                        }
                    }
                }
            }

            attrs.names.push(v.name.to_string());
            attrs.dtypes.push(dtype);
            attrs.dimss.push(dims);
        }
        Ok(attrs)
    }

    pub(crate) fn load_onnx<P: AsRef<Path>>(p: P) -> Result<onnx::ModelProto> {
        let f = std::fs::read(p)?;
        onnx::ModelProto::decode(f.as_slice())
            .map_err(|e| anyhow::anyhow!("Failed to decode ONNX model: {}", e))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn in_names(&self) -> &Vec<String> {
        &self.inputs_attrs.names
    }

    pub fn in_dimss(&self) -> &Vec<Vec<usize>> {
        &self.inputs_attrs.dimss
    }

    pub fn out_dimss(&self) -> &Vec<Vec<usize>> {
        &self.outputs_attrs.dimss
    }

    pub fn device(&self) -> &InferenceDevice {
        &self.device
    }

    /// Custom metadata entry of the model file.
    pub fn try_fetch(&self, key: &str) -> Option<String> {
        self.model_proto
            .metadata_props
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.clone())
    }

    pub fn parameters(&self) -> usize {
        self.params
    }

    pub fn memory_weights(&self) -> usize {
        self.wb_mem
    }

    pub fn ts(&self) -> &TimeCalc {
        &self.infer_time
    }
}
