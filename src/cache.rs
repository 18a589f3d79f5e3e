//! Model cache management for downloaded models
//!
//! Cached models live in an XDG-compliant directory structure, one directory
//! per model ID. A model ID is derived from the repository URL it was
//! downloaded from.

use crate::error::{BgStripError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Information about a cached model
#[derive(Debug, Clone)]
pub struct CachedModelInfo {
    /// Model identifier (derived from URL)
    pub model_id: String,
    /// Path to the cached model directory
    pub path: PathBuf,
    /// Available ONNX model variants (fp16, fp32)
    pub variants: Vec<String>,
    /// Estimated size of the model directory in bytes
    pub size_bytes: u64,
}

/// Model cache manager
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Create a new model cache manager
    ///
    /// Uses XDG Base Directory specification for cache location:
    /// - Linux/macOS: `~/.cache/bgstrip/models/`
    /// - Windows: `%LOCALAPPDATA%/bgstrip/models/`
    ///
    /// The `BGSTRIP_CACHE_DIR` environment variable overrides the base.
    ///
    /// # Errors
    /// - Failed to determine cache directory
    /// - Failed to create cache directory
    pub fn new() -> Result<Self> {
        let cache_dir = Self::get_cache_dir()?;
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir).map_err(|e| {
                BgStripError::file_io_error("create cache directory", &cache_dir, &e)
            })?;
        }
        Ok(Self { cache_dir })
    }

    /// Create a cache manager rooted at a custom directory
    ///
    /// # Errors
    /// - Failed to create the directory
    pub fn with_custom_cache_dir(cache_dir: &Path) -> Result<Self> {
        let models_dir = cache_dir.join("models");
        if !models_dir.exists() {
            fs::create_dir_all(&models_dir).map_err(|e| {
                BgStripError::file_io_error("create cache directory", &models_dir, &e)
            })?;
        }
        Ok(Self {
            cache_dir: models_dir,
        })
    }

    fn get_cache_dir() -> Result<PathBuf> {
        // Environment variable override takes precedence
        if let Ok(cache_override) = std::env::var("BGSTRIP_CACHE_DIR") {
            return Ok(PathBuf::from(cache_override).join("models"));
        }

        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                BgStripError::invalid_config(
                    "Failed to determine cache directory. Set BGSTRIP_CACHE_DIR environment variable.",
                )
            })?
            .join("bgstrip")
            .join("models"))
    }

    /// Generate a model ID from a URL
    ///
    /// Converts URLs like `https://huggingface.co/ZhengPeng7/BiRefNet`
    /// to cache-safe identifiers like `ZhengPeng7--BiRefNet`.
    #[must_use]
    pub fn url_to_model_id(url: &str) -> String {
        let prefix = "https://huggingface.co/";
        if url.starts_with(prefix) {
            url.get(prefix.len()..).unwrap_or(url).replace('/', "--")
        } else {
            // Non-HuggingFace URLs get a hash-based identifier
            use sha2::{Digest, Sha256};
            let mut hasher = Sha256::new();
            hasher.update(url.as_bytes());
            let hash_string = format!("url-{:x}", hasher.finalize());
            hash_string.get(..16).unwrap_or(&hash_string).to_string()
        }
    }

    /// Check if a model is cached and structurally valid
    #[must_use]
    pub fn is_model_cached(&self, model_id: &str) -> bool {
        let model_path = self.cache_dir.join(model_id);
        model_path.exists() && Self::validate_model_directory(&model_path)
    }

    /// Get the path to a cached model directory (may not exist)
    #[must_use]
    pub fn get_model_path(&self, model_id: &str) -> PathBuf {
        self.cache_dir.join(model_id)
    }

    /// The cache directory currently in use
    #[must_use]
    pub fn get_current_cache_dir(&self) -> &PathBuf {
        &self.cache_dir
    }

    /// A model directory is valid when it has at least one ONNX variant file
    fn validate_model_directory(model_path: &Path) -> bool {
        let onnx_dir = model_path.join("onnx");
        onnx_dir.join("model.onnx").is_file() || onnx_dir.join("model_fp16.onnx").is_file()
    }

    /// Scan the cache directory and return all valid cached models
    ///
    /// # Errors
    /// - Cache directory unreadable
    pub fn scan_cached_models(&self) -> Result<Vec<CachedModelInfo>> {
        let mut models = Vec::new();

        let entries = fs::read_dir(&self.cache_dir).map_err(|e| {
            BgStripError::file_io_error("read cache directory", &self.cache_dir, &e)
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| {
                BgStripError::file_io_error("read cache entry", &self.cache_dir, &e)
            })?;
            let path = entry.path();
            if !path.is_dir() || !Self::validate_model_directory(&path) {
                continue;
            }

            let model_id = entry.file_name().to_string_lossy().into_owned();
            let mut variants = Vec::new();
            if path.join("onnx/model.onnx").is_file() {
                variants.push("fp32".to_string());
            }
            if path.join("onnx/model_fp16.onnx").is_file() {
                variants.push("fp16".to_string());
            }

            models.push(CachedModelInfo {
                model_id,
                size_bytes: directory_size(&path),
                path,
                variants,
            });
        }

        models.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        Ok(models)
    }

    /// Remove all cached models, returning the removed IDs
    ///
    /// # Errors
    /// - Failures removing model directories
    pub fn clear_all_models(&self) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for model in self.scan_cached_models()? {
            fs::remove_dir_all(&model.path).map_err(|e| {
                BgStripError::file_io_error("remove cached model", &model.path, &e)
            })?;
            removed.push(model.model_id);
        }
        Ok(removed)
    }

    /// Remove a specific cached model; returns whether anything was removed
    ///
    /// # Errors
    /// - Failure removing the model directory
    pub fn clear_specific_model(&self, model_id: &str) -> Result<bool> {
        let path = self.cache_dir.join(model_id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&path)
            .map_err(|e| BgStripError::file_io_error("remove cached model", &path, &e))?;
        Ok(true)
    }
}

fn directory_size(path: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(path) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                directory_size(&path)
            } else {
                entry.metadata().map(|m| m.len()).unwrap_or(0)
            }
        })
        .sum()
}

/// Format a byte count for human-readable display
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS.get(unit).copied().unwrap_or("B"))
    }
}
