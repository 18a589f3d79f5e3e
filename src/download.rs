//! Model downloading from `HuggingFace` repositories
//!
//! Downloads the model repository files into the cache with streaming I/O,
//! sha256 integrity checks, and atomic temp-directory → final-location moves.

use crate::cache::ModelCache;
use crate::error::{BgStripError, Result};
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tokio_util::io::StreamReader;

/// Files that are always downloaded for a model repository
const REQUIRED_FILES: &[&str] = &["config.json", "preprocessor_config.json"];

/// ONNX model files to attempt downloading, by precision variant
const ONNX_FILES: &[(&str, &str)] = &[
    ("onnx/model.onnx", "fp32"),
    ("onnx/model_fp16.onnx", "fp16"),
];

/// Model downloader with progress reporting
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
}

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    /// Set message for progress indicator
    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => {
                let _ = msg;
            },
        }
    }

    /// Set length for progress indicator
    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {
                let _ = len;
            },
        }
    }

    /// Set position for progress indicator
    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {
                let _ = pos;
            },
        }
    }

    /// Finish progress indicator with message
    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {
                let _ = msg;
            },
        }
    }
}

impl ModelDownloader {
    /// Create a new model downloader using the default cache location
    ///
    /// # Errors
    /// - Failed to create HTTP client
    /// - Failed to initialize model cache
    pub fn new() -> Result<Self> {
        let cache = ModelCache::new()?;
        Self::with_cache(cache)
    }

    /// Create a downloader with a specific cache
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn with_cache(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| BgStripError::network_error("Failed to create HTTP client", &e))?;
        Ok(Self { client, cache })
    }

    /// Download a model repository into the cache
    ///
    /// Skips the download when the model is already cached. The download goes
    /// to a temporary directory first and is moved into place only when every
    /// file arrived intact.
    ///
    /// # Errors
    /// - Invalid or unsupported URL format
    /// - Network errors during download
    /// - File system errors during caching
    pub async fn download_model(&self, url: &str, show_progress: bool) -> Result<String> {
        validate_model_url(url)?;

        let model_id = ModelCache::url_to_model_id(url);
        tracing::info!(url = %url, model_id = %model_id, "Downloading model");

        if self.cache.is_model_cached(&model_id) {
            tracing::info!(model_id = %model_id, "Model already cached");
            return Ok(model_id);
        }

        let temp_dir = Self::create_temp_download_dir(&model_id)?;
        let final_dir = self.cache.get_model_path(&model_id);

        let progress = if show_progress {
            Some(Self::create_progress_indicator())
        } else {
            None
        };

        match self
            .download_model_files(url, &temp_dir, progress.as_ref())
            .await
        {
            Ok(()) => {
                if final_dir.exists() {
                    fs::remove_dir_all(&final_dir).map_err(|e| {
                        BgStripError::file_io_error(
                            "remove existing model directory",
                            &final_dir,
                            &e,
                        )
                    })?;
                }
                fs::rename(&temp_dir, &final_dir).map_err(|e| {
                    BgStripError::file_io_error("move downloaded model to cache", &final_dir, &e)
                })?;

                if let Some(pb) = progress {
                    pb.finish_with_message(format!("Downloaded {model_id}"));
                }
                tracing::info!(model_id = %model_id, "Successfully downloaded model");
                Ok(model_id)
            },
            Err(e) => {
                if temp_dir.exists() {
                    if let Err(cleanup_err) = fs::remove_dir_all(&temp_dir) {
                        tracing::warn!(error = %cleanup_err, "Failed to clean up temp directory");
                    }
                }
                if let Some(pb) = progress {
                    pb.finish_with_message("Download failed".to_string());
                }
                Err(e)
            },
        }
    }

    /// Access the underlying cache
    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    fn create_temp_download_dir(model_id: &str) -> Result<PathBuf> {
        let temp_dir = std::env::temp_dir().join(format!("bgstrip-{model_id}"));
        if temp_dir.exists() {
            fs::remove_dir_all(&temp_dir).map_err(|e| {
                BgStripError::file_io_error("remove existing temp directory", &temp_dir, &e)
            })?;
        }
        fs::create_dir_all(&temp_dir)
            .map_err(|e| BgStripError::file_io_error("create temp directory", &temp_dir, &e))?;
        Ok(temp_dir)
    }

    fn create_progress_indicator() -> ProgressIndicator {
        #[cfg(feature = "cli")]
        {
            let pb = ProgressBar::new(100);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                    .unwrap()
                    .progress_chars("#>-"),
            );
            ProgressIndicator::Indicatif(pb)
        }
        #[cfg(not(feature = "cli"))]
        {
            ProgressIndicator::NoOp
        }
    }

    async fn download_model_files(
        &self,
        base_url: &str,
        download_dir: &Path,
        progress: Option<&ProgressIndicator>,
    ) -> Result<()> {
        let raw_base = format!("{base_url}/resolve/main/");

        for file_name in REQUIRED_FILES {
            let file_url = format!("{raw_base}{file_name}");
            let local_path = download_dir.join(file_name);
            if let Some(pb) = progress {
                pb.set_message(format!("Downloading {file_name}"));
            }
            self.download_file(&file_url, &local_path, progress).await?;
        }

        // At least one ONNX variant must download; missing fp16 is tolerated
        let mut downloaded_any_onnx = false;
        for (file_name, variant) in ONNX_FILES {
            let file_url = format!("{raw_base}{file_name}");
            let local_path = download_dir.join(file_name);
            if let Some(pb) = progress {
                pb.set_message(format!("Downloading {file_name} ({variant})"));
            }
            match self.download_file(&file_url, &local_path, progress).await {
                Ok(()) => downloaded_any_onnx = true,
                Err(e) => {
                    tracing::debug!(file = %file_name, error = %e, "Optional variant not available");
                },
            }
        }

        if !downloaded_any_onnx {
            return Err(BgStripError::model(format!(
                "No ONNX model files found at {base_url}"
            )));
        }
        Ok(())
    }

    async fn download_file(
        &self,
        url: &str,
        local_path: &Path,
        progress: Option<&ProgressIndicator>,
    ) -> Result<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BgStripError::network_error("Failed to request file", &e))?;

        if !response.status().is_success() {
            return Err(BgStripError::Network(format!(
                "Failed to download '{url}': HTTP {}",
                response.status()
            )));
        }

        if let (Some(pb), Some(len)) = (progress, response.content_length()) {
            pb.set_length(len);
            pb.set_position(0);
        }

        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| BgStripError::file_io_error("create download directory", parent, &e))?;
        }

        let byte_stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        let mut reader = StreamReader::new(byte_stream);
        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| BgStripError::file_io_error("create download file", local_path, &e))?;

        tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| BgStripError::file_io_error("write download file", local_path, &e))?;

        verify_file_integrity(local_path, None)?;
        Ok(())
    }
}

/// Verify a downloaded file: non-empty, and matching an expected sha256 when
/// one is known
///
/// # Errors
/// - File unreadable or empty
/// - Digest mismatch against `expected_sha256`
pub fn verify_file_integrity(path: &Path, expected_sha256: Option<&str>) -> Result<()> {
    let data = fs::read(path)
        .map_err(|e| BgStripError::file_io_error("read downloaded file", path, &e))?;
    if data.is_empty() {
        return Err(BgStripError::model(format!(
            "Downloaded file is empty: {}",
            path.display()
        )));
    }

    let digest = format!("{:x}", Sha256::digest(&data));
    tracing::debug!(file = %path.display(), sha256 = %digest, "Verified download");

    if let Some(expected) = expected_sha256 {
        if !digest.eq_ignore_ascii_case(expected) {
            return Err(BgStripError::model(format!(
                "Integrity check failed for '{}': expected {expected}, got {digest}",
                path.display()
            )));
        }
    }
    Ok(())
}

/// Validate that a URL is a supported model repository URL
///
/// # Errors
/// - Non-HuggingFace URL or missing owner/repository components
pub fn validate_model_url(url: &str) -> Result<()> {
    parse_huggingface_url(url).map(|_| ())
}

/// Parse a `HuggingFace` repository URL into (owner, repository)
///
/// # Errors
/// - Unsupported URL format
pub fn parse_huggingface_url(url: &str) -> Result<(String, String)> {
    let prefix = "https://huggingface.co/";
    let rest = url.strip_prefix(prefix).ok_or_else(|| {
        BgStripError::invalid_config(format!(
            "Unsupported URL format: {url}. Only HuggingFace repositories are supported."
        ))
    })?;

    let mut parts = rest.trim_end_matches('/').split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() => {
            Ok((owner.to_string(), repo.to_string()))
        },
        _ => Err(BgStripError::invalid_config(format!(
            "Invalid HuggingFace URL: {url}. Expected https://huggingface.co/<owner>/<repo>"
        ))),
    }
}
