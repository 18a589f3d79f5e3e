//! ONNX Runtime backend for the segmentation model
//!
//! Runs the model through `ort` with execution-provider auto-detection:
//! an accelerated preference (CUDA, CoreML) is downgraded to CPU when the
//! accelerator is not actually available. The backend returns the model's
//! last output head as raw scores after validating its shape.

use crate::config::{ExecutionProvider, RemovalConfig};
use crate::error::{BgStripError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, ModelManager, PreprocessingConfig};
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;

/// ONNX Runtime backend for running the background removal model
pub struct OnnxBackend {
    session: Option<Session>,
    model_manager: ModelManager,
    initialized: bool,
}

impl OnnxBackend {
    /// Create a new ONNX backend for a resolved model
    #[must_use]
    pub fn new(model_manager: ModelManager) -> Self {
        Self {
            session: None,
            model_manager,
            initialized: false,
        }
    }

    /// Resolve the effective execution provider for a requested one
    ///
    /// `Auto` probes CUDA then CoreML and falls back to CPU; explicit
    /// accelerator requests downgrade to CPU with a warning when the
    /// accelerator is unavailable.
    #[must_use]
    pub fn resolve_provider(requested: ExecutionProvider) -> ExecutionProvider {
        match requested {
            ExecutionProvider::Cpu => ExecutionProvider::Cpu,
            ExecutionProvider::Auto => {
                if cuda_available() {
                    ExecutionProvider::Cuda
                } else if coreml_available() {
                    ExecutionProvider::CoreMl
                } else {
                    tracing::debug!("No accelerator available, using CPU execution");
                    ExecutionProvider::Cpu
                }
            },
            ExecutionProvider::Cuda => {
                if cuda_available() {
                    ExecutionProvider::Cuda
                } else {
                    tracing::warn!("CUDA requested but not available, falling back to CPU");
                    ExecutionProvider::Cpu
                }
            },
            ExecutionProvider::CoreMl => {
                if coreml_available() {
                    ExecutionProvider::CoreMl
                } else {
                    tracing::warn!("CoreML requested but not available, falling back to CPU");
                    ExecutionProvider::Cpu
                }
            },
        }
    }

    /// Load the model and create the ONNX Runtime session
    fn load_model(&mut self, config: &RemovalConfig) -> Result<instant::Duration> {
        let model_load_start = instant::Instant::now();

        let model_data = self.model_manager.load_model()?;
        let effective_provider = Self::resolve_provider(config.execution_provider);

        let mut session_builder = Session::builder()
            .map_err(|e| {
                BgStripError::inference(format!("Failed to create session builder: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                BgStripError::inference(format!("Failed to set optimization level: {e}"))
            })?;

        session_builder = match effective_provider {
            ExecutionProvider::Cuda => {
                tracing::info!("Using CUDA execution provider");
                session_builder
                    .with_execution_providers([CUDAExecutionProvider::default().build()])
                    .map_err(|e| {
                        BgStripError::inference(format!(
                            "Failed to set CUDA execution provider: {e}"
                        ))
                    })?
            },
            ExecutionProvider::CoreMl => {
                tracing::info!("Using CoreML execution provider");
                let provider = CoreMLExecutionProvider::default().with_subgraphs(true);
                session_builder
                    .with_execution_providers([provider.build()])
                    .map_err(|e| {
                        BgStripError::inference(format!(
                            "Failed to set CoreML execution provider: {e}"
                        ))
                    })?
            },
            ExecutionProvider::Cpu | ExecutionProvider::Auto => {
                tracing::info!("Using CPU execution provider");
                session_builder
            },
        };

        // Auto-detect threading when unset: all cores within ops, a small
        // pool between ops
        let parallelism = std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(8);
        let intra_threads = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            parallelism
        };
        let inter_threads = if config.inter_threads > 0 {
            config.inter_threads
        } else {
            (parallelism / 4).max(1)
        };

        let session = session_builder
            .with_parallel_execution(true)
            .map_err(|e| {
                BgStripError::inference(format!("Failed to enable parallel execution: {e}"))
            })?
            .with_intra_threads(intra_threads)
            .map_err(|e| BgStripError::inference(format!("Failed to set intra threads: {e}")))?
            .with_inter_threads(inter_threads)
            .map_err(|e| BgStripError::inference(format!("Failed to set inter threads: {e}")))?
            .commit_from_memory(&model_data)
            .map_err(|e| {
                BgStripError::inference(format!("Failed to create session from model data: {e}"))
            })?;

        let model_info = self.model_manager.get_info()?;
        let model_load_time = model_load_start.elapsed();
        tracing::info!(
            model = %model_info.name,
            precision = %model_info.precision,
            provider = %effective_provider,
            size_mb = %format_args!("{:.2}", model_info.size_bytes as f64 / (1024.0 * 1024.0)),
            load_ms = model_load_time.as_millis() as u64,
            "ONNX session created"
        );

        self.session = Some(session);
        self.initialized = true;
        Ok(model_load_time)
    }
}

impl InferenceBackend for OnnxBackend {
    fn initialize(&mut self, config: &RemovalConfig) -> Result<Option<instant::Duration>> {
        if self.initialized {
            return Ok(None);
        }
        let model_load_time = self.load_model(config)?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        if !self.initialized {
            return Err(BgStripError::internal("Backend not initialized"));
        }
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| BgStripError::internal("ONNX session not initialized"))?;

        tracing::debug!(input_shape = ?input.dim(), "Starting ONNX inference");

        let input_value = Value::from_array(input.clone())
            .map_err(|e| BgStripError::processing(format!("Failed to convert input tensor: {e}")))?;

        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| BgStripError::processing(format!("ONNX inference failed: {e}")))?;

        // Segmentation models commonly expose several supervision heads;
        // the final one is the full-resolution mask. Validate instead of
        // trusting the ordering blindly.
        let keys: Vec<_> = outputs.keys().collect();
        let last_key = keys
            .last()
            .ok_or_else(|| BgStripError::processing("No output tensors found"))?;
        tracing::debug!(outputs = keys.len(), mask_head = %last_key, "Selected final output head");

        let output_tensor = outputs
            .get(last_key)
            .ok_or_else(|| BgStripError::processing("Final output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| {
                BgStripError::processing(format!("Failed to extract output tensor: {e}"))
            })?;

        let output_shape = output_tensor.shape().to_vec();
        if output_shape.len() != 4 {
            return Err(BgStripError::processing(format!(
                "Expected 4D mask output, got {}D with shape {output_shape:?}",
                output_shape.len()
            )));
        }
        let batch = output_shape.first().copied().unwrap_or(0);
        let channels = output_shape.get(1).copied().unwrap_or(0);
        if batch != 1 || channels != 1 {
            return Err(BgStripError::processing(format!(
                "Expected [1, 1, H, W] mask output, got {output_shape:?}"
            )));
        }

        let height = output_shape.get(2).copied().unwrap_or(0);
        let width = output_shape.get(3).copied().unwrap_or(0);
        let data = output_tensor.view().to_owned().into_raw_vec_and_offset().0;
        Array4::from_shape_vec((1, 1, height, width), data)
            .map_err(|e| BgStripError::processing(format!("Failed to reshape output tensor: {e}")))
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        self.model_manager
            .get_info()
            .map_or((1, 3, 1024, 1024), |info| info.input_shape)
    }

    fn output_shape(&self) -> (usize, usize, usize, usize) {
        self.model_manager
            .get_info()
            .map_or((1, 1, 1024, 1024), |info| info.output_shape)
    }

    fn preprocessing_config(&self) -> PreprocessingConfig {
        self.model_manager.get_preprocessing_config()
    }

    fn model_info(&self) -> Result<ModelInfo> {
        self.model_manager.get_info()
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

fn cuda_available() -> bool {
    OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false)
}

fn coreml_available() -> bool {
    OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_request_never_probes_accelerators() {
        assert_eq!(
            OnnxBackend::resolve_provider(ExecutionProvider::Cpu),
            ExecutionProvider::Cpu
        );
    }

    #[test]
    fn test_resolution_always_yields_concrete_provider() {
        // Auto must resolve to something runnable on this machine
        let resolved = OnnxBackend::resolve_provider(ExecutionProvider::Auto);
        assert_ne!(resolved, ExecutionProvider::Auto);
    }
}
