//! High-level background removal processor
//!
//! [`BackgroundRemover`] owns one initialized inference backend and runs
//! the full pipeline per call: decode, preprocess, infer, build the mask
//! and composite it back onto the input at its original dimensions. The
//! model is loaded once at construction; a remover can then process any
//! number of images.

use crate::config::RemovalConfig;
use crate::error::{BgStripError, Result};
use crate::inference::InferenceBackend;
use crate::input::ImageInput;
use crate::preprocessing::ImagePreprocessor;
use crate::types::{ProcessingTimings, RemovalResult, SegmentationMask};
use image::DynamicImage;

/// Factory for creating inference backends
///
/// The processor itself is backend-agnostic; tests inject a factory that
/// produces a mock backend.
pub trait BackendFactory: Send + Sync {
    /// Create an uninitialized backend for the given configuration
    fn create_backend(&self, config: &RemovalConfig) -> Result<Box<dyn InferenceBackend>>;
}

/// Default factory producing the ONNX Runtime backend
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    #[cfg(feature = "onnx")]
    fn create_backend(&self, config: &RemovalConfig) -> Result<Box<dyn InferenceBackend>> {
        // Variant auto-selection keys on the provider that will actually
        // run, so an Auto request on an accelerator-less machine resolves
        // to CPU before the fp16/fp32 choice is made
        let effective =
            crate::backends::OnnxBackend::resolve_provider(config.execution_provider);
        let manager = crate::models::ModelManager::from_spec_with_provider(
            &config.model_spec,
            Some(effective),
        )?;
        Ok(Box::new(crate::backends::OnnxBackend::new(manager)))
    }

    #[cfg(not(feature = "onnx"))]
    fn create_backend(&self, _config: &RemovalConfig) -> Result<Box<dyn InferenceBackend>> {
        Err(BgStripError::invalid_config(
            "No inference backend available, enable the onnx feature",
        ))
    }
}

/// Background removal processor with an eagerly loaded model
pub struct BackgroundRemover {
    backend: Box<dyn InferenceBackend>,
    config: RemovalConfig,
    client: reqwest::Client,
    model_load_time: Option<instant::Duration>,
}

impl BackgroundRemover {
    /// Create a processor, loading the model immediately
    ///
    /// Fails when the model cannot be resolved or the session cannot be
    /// created, so a constructed remover is always ready to process.
    pub fn new(config: RemovalConfig) -> Result<Self> {
        Self::with_factory(config, &DefaultBackendFactory)
    }

    /// Create a processor using a custom backend factory
    pub fn with_factory(config: RemovalConfig, factory: &dyn BackendFactory) -> Result<Self> {
        config.validate()?;

        let mut backend = factory.create_backend(&config)?;
        let model_load_time = backend.initialize(&config).map_err(|e| {
            BgStripError::model(format!("Failed to initialize inference backend: {e}"))
        })?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| BgStripError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            backend,
            config,
            client,
            model_load_time,
        })
    }

    /// Remove the background from an image input
    ///
    /// Accepts a path, URL or already decoded image and returns an RGBA
    /// result at the input's original dimensions.
    #[tracing::instrument(skip(self, input), fields(input = %input.description()))]
    pub async fn process(&mut self, input: ImageInput) -> Result<RemovalResult> {
        let total_start = instant::Instant::now();

        let decode_start = instant::Instant::now();
        let image = input.resolve(&self.client).await?;
        let decode_time = decode_start.elapsed();

        let mut result = self.run_pipeline(&image)?;
        result.timings.decode_ms = decode_time.as_millis() as u64;
        result.timings.total_ms = total_start.elapsed().as_millis() as u64;
        Ok(result)
    }

    /// Remove the background from an already decoded image
    pub fn process_image(&mut self, image: &DynamicImage) -> Result<RemovalResult> {
        let total_start = instant::Instant::now();
        let mut result = self.run_pipeline(image)?;
        result.timings.total_ms = total_start.elapsed().as_millis() as u64;
        Ok(result)
    }

    /// Remove the background from encoded image bytes
    pub fn process_bytes(&mut self, bytes: &[u8]) -> Result<RemovalResult> {
        let total_start = instant::Instant::now();

        let decode_start = instant::Instant::now();
        let image = image::load_from_memory(bytes)
            .map_err(|e| BgStripError::processing(format!("Failed to decode image bytes: {e}")))?;
        let decode_time = decode_start.elapsed();

        let mut result = self.run_pipeline(&image)?;
        result.timings.decode_ms = decode_time.as_millis() as u64;
        result.timings.total_ms = total_start.elapsed().as_millis() as u64;
        Ok(result)
    }

    fn run_pipeline(&mut self, image: &DynamicImage) -> Result<RemovalResult> {
        let original_dimensions = (image.width(), image.height());
        tracing::debug!(
            width = original_dimensions.0,
            height = original_dimensions.1,
            "Processing image"
        );

        let preprocessing_start = instant::Instant::now();
        let preprocessing_config = self.backend.preprocessing_config();
        let tensor = ImagePreprocessor::preprocess_for_inference(image, &preprocessing_config)?;
        let preprocessing_time = preprocessing_start.elapsed();

        let inference_start = instant::Instant::now();
        let scores = self.backend.infer(&tensor)?;
        let inference_time = inference_start.elapsed();

        let postprocessing_start = instant::Instant::now();
        let mask = SegmentationMask::from_tensor(&scores)?.resize(original_dimensions)?;
        let output = mask.apply_to_image(image)?;
        let postprocessing_time = postprocessing_start.elapsed();

        let timings = ProcessingTimings {
            model_load_ms: self
                .model_load_time
                .take()
                .map(|duration| duration.as_millis() as u64),
            decode_ms: 0,
            preprocessing_ms: preprocessing_time.as_millis() as u64,
            inference_ms: inference_time.as_millis() as u64,
            postprocessing_ms: postprocessing_time.as_millis() as u64,
            total_ms: 0,
        };

        tracing::debug!(
            preprocessing_ms = timings.preprocessing_ms,
            inference_ms = timings.inference_ms,
            postprocessing_ms = timings.postprocessing_ms,
            foreground_ratio = %format_args!("{:.3}", mask.foreground_ratio()),
            "Pipeline complete"
        );

        Ok(RemovalResult {
            image: output,
            mask,
            original_dimensions,
            timings,
        })
    }

    /// Configuration this processor was built with
    #[must_use]
    pub fn config(&self) -> &RemovalConfig {
        &self.config
    }

    /// Information about the loaded model
    pub fn model_info(&self) -> Result<crate::models::ModelInfo> {
        self.backend.model_info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockBackend;

    struct MockFactory;

    impl BackendFactory for MockFactory {
        fn create_backend(&self, _config: &RemovalConfig) -> Result<Box<dyn InferenceBackend>> {
            Ok(Box::new(MockBackend::new()))
        }
    }

    struct FailingFactory;

    impl BackendFactory for FailingFactory {
        fn create_backend(&self, _config: &RemovalConfig) -> Result<Box<dyn InferenceBackend>> {
            Err(BgStripError::model("model file not found"))
        }
    }

    #[test]
    fn test_construction_fails_when_backend_cannot_be_created() {
        let result = BackgroundRemover::with_factory(RemovalConfig::default(), &FailingFactory);
        assert!(result.is_err());
    }

    #[test]
    fn test_output_matches_input_dimensions() {
        let mut remover =
            BackgroundRemover::with_factory(RemovalConfig::default(), &MockFactory).unwrap();

        let image = DynamicImage::new_rgb8(500, 300);
        let result = remover.process_image(&image).unwrap();

        assert_eq!(result.image.dimensions(), (500, 300));
        assert_eq!(result.mask.dimensions, (500, 300));
        assert_eq!(result.original_dimensions, (500, 300));
    }

    #[test]
    fn test_model_load_time_reported_once() {
        let mut remover =
            BackgroundRemover::with_factory(RemovalConfig::default(), &MockFactory).unwrap();

        let image = DynamicImage::new_rgb8(32, 32);
        let first = remover.process_image(&image).unwrap();
        let second = remover.process_image(&image).unwrap();

        assert!(first.timings.model_load_ms.is_some());
        assert!(second.timings.model_load_ms.is_none());
    }

    #[cfg(feature = "onnx")]
    fn seed_dual_variant_model(dir: &std::path::Path) -> crate::models::ModelSpec {
        let onnx_dir = dir.join("onnx");
        std::fs::create_dir_all(&onnx_dir).unwrap();
        std::fs::write(onnx_dir.join("model.onnx"), b"fp32-stub").unwrap();
        std::fs::write(onnx_dir.join("model_fp16.onnx"), b"fp16-stub").unwrap();
        crate::models::ModelSpec {
            source: crate::models::ModelSource::External(dir.to_path_buf()),
            variant: None,
        }
    }

    #[cfg(feature = "onnx")]
    #[test]
    fn test_factory_selects_fp32_for_cpu_provider() {
        use crate::config::ExecutionProvider;

        let dir = tempfile::tempdir().unwrap();
        let config = RemovalConfig::builder()
            .execution_provider(ExecutionProvider::Cpu)
            .model_spec(seed_dual_variant_model(dir.path()))
            .build()
            .unwrap();

        let backend = DefaultBackendFactory.create_backend(&config).unwrap();
        assert_eq!(backend.model_info().unwrap().precision, "fp32");
    }

    #[cfg(feature = "onnx")]
    #[test]
    fn test_factory_variant_follows_resolved_provider_for_auto() {
        use crate::backends::OnnxBackend;
        use crate::config::ExecutionProvider;

        let dir = tempfile::tempdir().unwrap();
        let config = RemovalConfig::builder()
            .execution_provider(ExecutionProvider::Auto)
            .model_spec(seed_dual_variant_model(dir.path()))
            .build()
            .unwrap();

        // fp16 only when Auto actually resolved to an accelerator; on a
        // machine without one the CPU fallback must load fp32
        let expected = if OnnxBackend::resolve_provider(ExecutionProvider::Auto)
            == ExecutionProvider::Cpu
        {
            "fp32"
        } else {
            "fp16"
        };
        let backend = DefaultBackendFactory.create_backend(&config).unwrap();
        assert_eq!(backend.model_info().unwrap().precision, expected);
    }

    #[test]
    fn test_repeated_calls_are_deterministic() {
        let mut remover =
            BackgroundRemover::with_factory(RemovalConfig::default(), &MockFactory).unwrap();

        let image = DynamicImage::new_rgb8(64, 64);
        let first = remover.process_image(&image).unwrap();
        let second = remover.process_image(&image).unwrap();

        assert_eq!(first.mask.data, second.mask.data);
        assert_eq!(first.image.as_raw(), second.image.as_raw());
    }
}
