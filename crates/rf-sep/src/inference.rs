//! ONNX-backed separation model
//!
//! Uses tract (pure Rust) to run an exported network. The graph inputs are fed
//! from [`TensorDict`] keys in a fixed order and the graph outputs are named
//! back into a dictionary.

use std::path::Path;

use ndarray::ArrayD;

use crate::error::{SepError, SepResult};
use crate::model::{SeparationModel, TensorDict};

/// Execution provider for inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionProvider {
    /// CPU execution using tract
    #[default]
    Cpu,
    /// NVIDIA CUDA
    Cuda,
    /// Apple CoreML
    CoreML,
}

impl ExecutionProvider {
    /// Check if this provider is available with the tract backend
    pub fn is_available(&self) -> bool {
        // tract only runs on CPU
        matches!(self, ExecutionProvider::Cpu)
    }
}

/// Configuration for inference engine
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Requested execution provider
    pub provider: ExecutionProvider,
    /// Graph input names, in graph input order
    pub input_keys: Vec<String>,
    /// Names given to the graph outputs, in graph output order
    pub output_keys: Vec<String>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            provider: ExecutionProvider::Cpu,
            input_keys: vec![crate::keys::WAVEFORM.into()],
            output_keys: vec![crate::keys::WAVEFORM.into()],
        }
    }
}

impl InferenceConfig {
    /// Conditional model taking waveform and condition inputs
    pub fn conditional() -> Self {
        Self {
            input_keys: vec![crate::keys::WAVEFORM.into(), crate::keys::CONDITION.into()],
            ..Default::default()
        }
    }
}

type TractPlan = tract_onnx::prelude::SimplePlan<
    tract_onnx::prelude::TypedFact,
    Box<dyn tract_onnx::prelude::TypedOp>,
    tract_onnx::prelude::Graph<
        tract_onnx::prelude::TypedFact,
        Box<dyn tract_onnx::prelude::TypedOp>,
    >,
>;

/// Tract inference engine
pub struct InferenceEngine {
    provider: ExecutionProvider,
    plan: TractPlan,
}

impl InferenceEngine {
    /// Load and optimize an ONNX model
    pub fn new<P: AsRef<Path>>(model_path: P, config: &InferenceConfig) -> SepResult<Self> {
        let path = model_path.as_ref();

        if !path.exists() {
            return Err(SepError::ModelNotFound {
                path: path.display().to_string(),
            });
        }

        let provider = if config.provider.is_available() {
            config.provider
        } else {
            log::warn!(
                "Execution provider {:?} not available, falling back to CPU",
                config.provider
            );
            ExecutionProvider::Cpu
        };

        log::info!(
            "Using execution provider: {:?} for model {}",
            provider,
            path.display()
        );

        let plan = Self::load_plan(path)?;

        Ok(Self { provider, plan })
    }

    fn load_plan(path: &Path) -> SepResult<TractPlan> {
        use tract_onnx::prelude::*;

        tract_onnx::onnx()
            .model_for_path(path)
            .map_err(|e| SepError::Tract(e.to_string()))?
            .into_optimized()
            .map_err(|e| SepError::Tract(e.to_string()))?
            .into_runnable()
            .map_err(|e| SepError::Tract(e.to_string()))
    }

    /// Run inference with f32 inputs and outputs
    pub fn run_f32(&self, inputs: Vec<ArrayD<f32>>) -> SepResult<Vec<ArrayD<f32>>> {
        use tract_onnx::prelude::*;

        let tract_inputs: TVec<TValue> = inputs
            .into_iter()
            .map(|arr| {
                let tensor: Tensor = arr.into();
                tensor.into()
            })
            .collect();

        let outputs = self
            .plan
            .run(tract_inputs)
            .map_err(|e| SepError::ModelInvocation {
                reason: e.to_string(),
            })?;

        outputs
            .iter()
            .map(|output| {
                output
                    .to_array_view::<f32>()
                    .map(|view| view.to_owned())
                    .map_err(|e| SepError::Tract(e.to_string()))
            })
            .collect()
    }

    pub fn provider(&self) -> ExecutionProvider {
        self.provider
    }
}

/// [`SeparationModel`] running an ONNX graph
pub struct OnnxModel {
    engine: InferenceEngine,
    input_keys: Vec<String>,
    output_keys: Vec<String>,
    name: String,
}

impl OnnxModel {
    pub fn load<P: AsRef<Path>>(model_path: P, config: InferenceConfig) -> SepResult<Self> {
        let model_path = model_path.as_ref();

        if config.input_keys.is_empty() || config.output_keys.is_empty() {
            return Err(SepError::Config(
                "ONNX model needs at least one input and one output key".into(),
            ));
        }

        let name = model_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("onnx")
            .to_string();

        let engine = InferenceEngine::new(model_path, &config)?;

        Ok(Self {
            engine,
            input_keys: config.input_keys,
            output_keys: config.output_keys,
            name,
        })
    }

    pub fn input_keys(&self) -> &[String] {
        &self.input_keys
    }

    pub fn output_keys(&self) -> &[String] {
        &self.output_keys
    }
}

impl SeparationModel for OnnxModel {
    fn forward(&self, batch: &TensorDict) -> SepResult<TensorDict> {
        let inputs = self
            .input_keys
            .iter()
            .map(|key| {
                batch.get(key).cloned().ok_or_else(|| {
                    SepError::KeyMismatch(format!("model input '{}' missing from batch", key))
                })
            })
            .collect::<SepResult<Vec<_>>>()?;

        let outputs = self.engine.run_f32(inputs)?;

        if outputs.len() != self.output_keys.len() {
            return Err(SepError::KeyMismatch(format!(
                "model produced {} outputs, {} output keys configured",
                outputs.len(),
                self.output_keys.len()
            )));
        }

        Ok(self.output_keys.iter().cloned().zip(outputs).collect())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
