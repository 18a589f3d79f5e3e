//! Model management: specifications, metadata, and loading from the cache
//!
//! Models live in HuggingFace repository layout: `config.json`,
//! `preprocessor_config.json`, and ONNX files under `onnx/` (one per
//! precision variant). The manager resolves a [`ModelSpec`] to concrete
//! model bytes and the preprocessing constants the model was trained with.

use crate::cache::ModelCache;
use crate::config::ExecutionProvider;
use crate::error::{BgStripError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Default model repository: the BiRefNet general-purpose matting model
pub const DEFAULT_MODEL_URL: &str = "https://huggingface.co/ZhengPeng7/BiRefNet";

/// Relative ONNX file paths per precision variant
const VARIANT_FILES: &[(&str, &str)] = &[("fp32", "onnx/model.onnx"), ("fp16", "onnx/model_fp16.onnx")];

/// Model source specification
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ModelSource {
    /// Downloaded model from the cache, addressed by model ID
    Registry(String),
    /// External model directory on the filesystem (HuggingFace layout)
    External(PathBuf),
}

impl ModelSource {
    /// Get a display name for tracing and logging
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Registry(model_id) => format!("cached:{model_id}"),
            Self::External(path) => format!(
                "external:{}",
                path.file_name().unwrap_or_default().to_string_lossy()
            ),
        }
    }
}

/// Complete model specification including source and optional precision variant
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelSpec {
    pub source: ModelSource,
    pub variant: Option<String>,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            source: ModelSource::Registry(ModelCache::url_to_model_id(DEFAULT_MODEL_URL)),
            variant: None,
        }
    }
}

/// Model information and metadata
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub precision: String,
    pub size_bytes: usize,
    /// NCHW input shape
    pub input_shape: (usize, usize, usize, usize),
    /// NCHW output shape
    pub output_shape: (usize, usize, usize, usize),
}

/// Preprocessing constants a model expects its input normalized with
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PreprocessingConfig {
    /// Target spatial size (width, height) of the input tensor
    pub target_size: [u32; 2],
    /// Per-channel normalization mean (RGB)
    pub normalization_mean: [f32; 3],
    /// Per-channel normalization std (RGB)
    pub normalization_std: [f32; 3],
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        // ImageNet statistics, which BiRefNet and ISNet are trained with
        Self {
            target_size: [1024, 1024],
            normalization_mean: [0.485, 0.456, 0.406],
            normalization_std: [0.229, 0.224, 0.225],
        }
    }
}

/// Resolve the precision variant to use based on precedence rules
///
/// 1. Variant explicitly named in the `ModelSpec`
/// 2. fp16 when the execution provider prefers accelerated execution
/// 3. fp32
/// 4. First available variant
///
/// # Errors
/// - Explicitly requested variant is not available
/// - No variants available at all
pub fn resolve_variant(
    spec: &ModelSpec,
    provider: Option<ExecutionProvider>,
    available_variants: &[String],
) -> Result<String> {
    if let Some(variant) = &spec.variant {
        if available_variants.contains(variant) {
            return Ok(variant.clone());
        }
        return Err(BgStripError::invalid_config(format!(
            "Variant '{variant}' not available. Available variants: {available_variants:?}"
        )));
    }

    if provider.is_some_and(ExecutionProvider::prefers_acceleration)
        && available_variants.iter().any(|v| v == "fp16")
    {
        return Ok("fp16".to_string());
    }

    if available_variants.iter().any(|v| v == "fp32") {
        return Ok("fp32".to_string());
    }

    available_variants
        .first()
        .cloned()
        .ok_or_else(|| BgStripError::model("No variants available for model"))
}

/// Resolves a model specification to concrete files and metadata
#[derive(Debug, Clone)]
pub struct ModelManager {
    model_dir: PathBuf,
    name: String,
    variant: String,
    preprocessing: PreprocessingConfig,
}

impl ModelManager {
    /// Create a manager from a model specification
    ///
    /// # Errors
    /// - Model not present in the cache / on disk
    /// - No ONNX variant files found
    pub fn from_spec(spec: &ModelSpec) -> Result<Self> {
        Self::from_spec_with_provider(spec, None)
    }

    /// Create a manager from a spec, letting the execution provider influence
    /// variant auto-resolution (accelerated providers prefer fp16)
    ///
    /// # Errors
    /// - Model not present in the cache / on disk
    /// - Requested variant not available
    /// - Malformed model metadata files
    pub fn from_spec_with_provider(
        spec: &ModelSpec,
        provider: Option<ExecutionProvider>,
    ) -> Result<Self> {
        let model_dir = match &spec.source {
            ModelSource::Registry(model_id) => {
                let cache = ModelCache::new()?;
                if model_id.is_empty() {
                    return Err(BgStripError::invalid_config(
                        "Empty model ID; download a model first or pass an explicit model",
                    ));
                }
                if !cache.is_model_cached(model_id) {
                    return Err(BgStripError::model(format!(
                        "Model '{model_id}' is not cached. Download it first (see ModelDownloader)"
                    )));
                }
                cache.get_model_path(model_id)
            },
            ModelSource::External(path) => {
                if !path.is_dir() {
                    return Err(BgStripError::model_error_with_context(
                        "locate",
                        path,
                        "directory does not exist",
                        &["check the path", "expected a HuggingFace-layout model directory"],
                    ));
                }
                path.clone()
            },
        };

        let available = available_variants(&model_dir);
        let variant = resolve_variant(spec, provider, &available)?;

        let preprocessing = read_preprocessor_config(&model_dir)?;
        let name = model_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string());

        tracing::debug!(
            model = %name,
            variant = %variant,
            target_size = ?preprocessing.target_size,
            "Resolved model specification"
        );

        Ok(Self {
            model_dir,
            name,
            variant,
            preprocessing,
        })
    }

    /// Load the model data for the resolved variant
    ///
    /// # Errors
    /// - Model file missing or unreadable
    pub fn load_model(&self) -> Result<Vec<u8>> {
        let path = self.model_path()?;
        fs::read(&path).map_err(|e| BgStripError::file_io_error("read model file", &path, &e))
    }

    /// Get model information
    ///
    /// # Errors
    /// - Model file missing (size cannot be determined)
    pub fn get_info(&self) -> Result<ModelInfo> {
        let path = self.model_path()?;
        let size_bytes = fs::metadata(&path)
            .map_err(|e| BgStripError::file_io_error("stat model file", &path, &e))?
            .len() as usize;

        let [w, h] = self.preprocessing.target_size;
        Ok(ModelInfo {
            name: self.name.clone(),
            precision: self.variant.clone(),
            size_bytes,
            input_shape: (1, 3, h as usize, w as usize),
            output_shape: (1, 1, h as usize, w as usize),
        })
    }

    /// Get the preprocessing configuration for this model
    #[must_use]
    pub fn get_preprocessing_config(&self) -> PreprocessingConfig {
        self.preprocessing.clone()
    }

    /// Resolved precision variant
    #[must_use]
    pub fn variant(&self) -> &str {
        &self.variant
    }

    /// Path to the ONNX file of the resolved variant
    ///
    /// # Errors
    /// - Variant file missing from the model directory
    pub fn model_path(&self) -> Result<PathBuf> {
        let rel = VARIANT_FILES
            .iter()
            .find(|(v, _)| *v == self.variant)
            .map(|(_, f)| *f)
            .ok_or_else(|| {
                BgStripError::model(format!("Unknown model variant: {}", self.variant))
            })?;
        let path = self.model_dir.join(rel);
        if !path.is_file() {
            return Err(BgStripError::model_error_with_context(
                "load",
                &path,
                "variant file missing",
                &["re-download the model"],
            ));
        }
        Ok(path)
    }
}

/// Scan a model directory for available ONNX precision variants
fn available_variants(model_dir: &Path) -> Vec<String> {
    VARIANT_FILES
        .iter()
        .filter(|(_, rel)| model_dir.join(rel).is_file())
        .map(|(v, _)| (*v).to_string())
        .collect()
}

/// Read `preprocessor_config.json`, falling back to defaults when the file or
/// individual keys are absent
fn read_preprocessor_config(model_dir: &Path) -> Result<PreprocessingConfig> {
    let path = model_dir.join("preprocessor_config.json");
    if !path.is_file() {
        return Ok(PreprocessingConfig::default());
    }

    let raw = fs::read_to_string(&path)
        .map_err(|e| BgStripError::file_io_error("read preprocessor config", &path, &e))?;
    let json: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
        BgStripError::model(format!(
            "Malformed preprocessor config '{}': {e}",
            path.display()
        ))
    })?;

    let mut config = PreprocessingConfig::default();

    if let Some(size) = json.get("size") {
        let width = size.get("width").and_then(serde_json::Value::as_u64);
        let height = size.get("height").and_then(serde_json::Value::as_u64);
        if let (Some(w), Some(h)) = (width, height) {
            config.target_size = [w as u32, h as u32];
        }
    }
    if let Some(mean) = read_f32_triple(&json, "image_mean") {
        config.normalization_mean = mean;
    }
    if let Some(std) = read_f32_triple(&json, "image_std") {
        config.normalization_std = std;
    }

    Ok(config)
}

fn read_f32_triple(json: &serde_json::Value, key: &str) -> Option<[f32; 3]> {
    let values = json.get(key)?.as_array()?;
    if values.len() != 3 {
        return None;
    }
    let mut out = [0.0f32; 3];
    for (slot, value) in out.iter_mut().zip(values) {
        *slot = value.as_f64()? as f32;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_with_variant(variant: Option<&str>) -> ModelSpec {
        ModelSpec {
            source: ModelSource::Registry("test-model".to_string()),
            variant: variant.map(String::from),
        }
    }

    #[test]
    fn test_resolve_variant_explicit_precedence() {
        let available = vec!["fp16".to_string(), "fp32".to_string()];
        let spec = spec_with_variant(Some("fp32"));
        let result =
            resolve_variant(&spec, Some(ExecutionProvider::Auto), &available).unwrap();
        assert_eq!(result, "fp32");
    }

    #[test]
    fn test_resolve_variant_explicit_unavailable() {
        let available = vec!["fp32".to_string()];
        let spec = spec_with_variant(Some("fp16"));
        assert!(resolve_variant(&spec, None, &available).is_err());
    }

    #[test]
    fn test_resolve_variant_accelerated_prefers_fp16() {
        let available = vec!["fp16".to_string(), "fp32".to_string()];
        let spec = spec_with_variant(None);
        let result =
            resolve_variant(&spec, Some(ExecutionProvider::Cuda), &available).unwrap();
        assert_eq!(result, "fp16");
    }

    #[test]
    fn test_resolve_variant_cpu_prefers_fp32() {
        let available = vec!["fp16".to_string(), "fp32".to_string()];
        let spec = spec_with_variant(None);
        let result = resolve_variant(&spec, Some(ExecutionProvider::Cpu), &available).unwrap();
        assert_eq!(result, "fp32");

        // No provider hint behaves like CPU
        let result = resolve_variant(&spec, None, &available).unwrap();
        assert_eq!(result, "fp32");
    }

    #[test]
    fn test_resolve_variant_first_available_fallback() {
        let available = vec!["int8".to_string()];
        let spec = spec_with_variant(None);
        let result = resolve_variant(&spec, None, &available).unwrap();
        assert_eq!(result, "int8");
    }

    #[test]
    fn test_resolve_variant_empty_errors() {
        let spec = spec_with_variant(None);
        assert!(resolve_variant(&spec, None, &[]).is_err());
    }

    #[test]
    fn test_default_spec_points_at_birefnet() {
        let spec = ModelSpec::default();
        match spec.source {
            ModelSource::Registry(id) => assert_eq!(id, "ZhengPeng7--BiRefNet"),
            ModelSource::External(_) => panic!("default spec should be a registry model"),
        }
    }

    #[test]
    fn test_preprocessor_config_parsing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("preprocessor_config.json"),
            r#"{"size": {"width": 512, "height": 512}, "image_mean": [0.5, 0.5, 0.5], "image_std": [0.5, 0.5, 0.5]}"#,
        )
        .unwrap();

        let config = read_preprocessor_config(dir.path()).unwrap();
        assert_eq!(config.target_size, [512, 512]);
        assert_eq!(config.normalization_mean, [0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_preprocessor_config_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = read_preprocessor_config(dir.path()).unwrap();
        assert_eq!(config, PreprocessingConfig::default());
    }

    #[test]
    fn test_external_manager_resolution() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("onnx")).unwrap();
        fs::write(dir.path().join("onnx/model.onnx"), b"stub").unwrap();

        let spec = ModelSpec {
            source: ModelSource::External(dir.path().to_path_buf()),
            variant: None,
        };
        let manager = ModelManager::from_spec(&spec).unwrap();
        assert_eq!(manager.variant(), "fp32");
        assert_eq!(manager.load_model().unwrap(), b"stub");

        let info = manager.get_info().unwrap();
        assert_eq!(info.input_shape, (1, 3, 1024, 1024));
        assert_eq!(info.output_shape, (1, 1, 1024, 1024));
    }

    #[test]
    fn test_external_manager_missing_dir() {
        let spec = ModelSpec {
            source: ModelSource::External(PathBuf::from("/nonexistent/model-dir")),
            variant: None,
        };
        assert!(ModelManager::from_spec(&spec).is_err());
    }
}
