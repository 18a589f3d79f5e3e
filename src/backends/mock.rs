//! Mock inference backend for testing
//!
//! Produces a deterministic segmentation score map without loading any
//! model, so the full pipeline can be exercised in tests. Scores are raw
//! (pre-sigmoid) like the real backend's output: strongly positive inside
//! a centered foreground region, strongly negative outside it.

use crate::config::RemovalConfig;
use crate::error::Result;
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, PreprocessingConfig};
use ndarray::Array4;

const FOREGROUND_SCORE: f32 = 8.0;
const BACKGROUND_SCORE: f32 = -8.0;

/// Deterministic backend that segments a centered rectangle as foreground
pub struct MockBackend {
    initialized: bool,
    preprocessing: PreprocessingConfig,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            initialized: false,
            preprocessing: PreprocessingConfig::default(),
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, _config: &RemovalConfig) -> Result<Option<instant::Duration>> {
        self.initialized = true;
        Ok(Some(instant::Duration::from_millis(0)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let (_, _, height, width) = input.dim();
        let mut output = Array4::from_elem((1, 1, height, width), BACKGROUND_SCORE);

        // Centered rectangle covering half the frame in each dimension
        let y_start = height / 4;
        let y_end = height - height / 4;
        let x_start = width / 4;
        let x_end = width - width / 4;
        for y in y_start..y_end {
            for x in x_start..x_end {
                output[[0, 0, y, x]] = FOREGROUND_SCORE;
            }
        }

        Ok(output)
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        let [width, height] = self.preprocessing.target_size;
        (1, 3, height as usize, width as usize)
    }

    fn output_shape(&self) -> (usize, usize, usize, usize) {
        let [width, height] = self.preprocessing.target_size;
        (1, 1, height as usize, width as usize)
    }

    fn preprocessing_config(&self) -> PreprocessingConfig {
        self.preprocessing.clone()
    }

    fn model_info(&self) -> Result<ModelInfo> {
        Ok(ModelInfo {
            name: "mock".to_string(),
            precision: "fp32".to_string(),
            size_bytes: 0,
            input_shape: self.input_shape(),
            output_shape: self.output_shape(),
        })
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemovalConfig;

    #[test]
    fn test_mock_segments_centered_rectangle() {
        let mut backend = MockBackend::new();
        backend.initialize(&RemovalConfig::default()).unwrap();

        let input = Array4::zeros((1, 3, 64, 64));
        let output = backend.infer(&input).unwrap();

        assert_eq!(output.dim(), (1, 1, 64, 64));
        assert_eq!(output[[0, 0, 32, 32]], FOREGROUND_SCORE);
        assert_eq!(output[[0, 0, 0, 0]], BACKGROUND_SCORE);
    }

    #[test]
    fn test_mock_is_deterministic() {
        let mut backend = MockBackend::new();
        backend.initialize(&RemovalConfig::default()).unwrap();

        let input = Array4::zeros((1, 3, 32, 32));
        let first = backend.infer(&input).unwrap();
        let second = backend.infer(&input).unwrap();
        assert_eq!(first, second);
    }
}
