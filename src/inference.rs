//! Inference backend abstraction

use crate::config::RemovalConfig;
use crate::error::Result;
use crate::models::{ModelInfo, PreprocessingConfig};
use ndarray::Array4;

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// Trait for inference backends
///
/// A backend owns a loaded segmentation model and turns a normalized NCHW
/// input tensor into a single-channel raw-score tensor. Backends return raw
/// scores; the sigmoid mapping to probabilities happens in mask
/// post-processing so every backend shares it.
pub trait InferenceBackend {
    /// Initialize the backend, loading the model
    ///
    /// Returns the model loading time when a load actually happened.
    ///
    /// # Errors
    /// - Model loading or session creation failures
    /// - Invalid configuration parameters
    fn initialize(&mut self, config: &RemovalConfig) -> Result<Option<Duration>>;

    /// Run inference on the input tensor
    ///
    /// The output is the model's mask head as raw scores, validated to be
    /// a `[1, 1, H, W]` tensor.
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Model inference failures
    /// - Output tensor of unexpected rank or channel count
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// The expected NCHW input shape for this backend
    fn input_shape(&self) -> (usize, usize, usize, usize);

    /// The expected NCHW output shape for this backend
    fn output_shape(&self) -> (usize, usize, usize, usize);

    /// Preprocessing configuration the model expects
    fn preprocessing_config(&self) -> PreprocessingConfig;

    /// Model information for this backend
    ///
    /// # Errors
    /// - Model metadata unavailable
    fn model_info(&self) -> Result<ModelInfo>;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;
}
