#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # bgstrip
//!
//! A Rust library for image background removal using the `BiRefNet`
//! segmentation model through ONNX Runtime.
//!
//! The pipeline loads the model once, then per image: resolves the input
//! (file path, URL or decoded image), resizes and normalizes it into the
//! model's input tensor, runs inference, converts the score map into an
//! alpha mask at the original resolution, and composites an RGBA result.
//!
//! ## Features
//!
//! - **Input flexibility**: file paths, HTTP(S) URLs, or in-memory images
//! - **Hardware acceleration**: CUDA and `CoreML` execution providers with
//!   automatic CPU fallback
//! - **Model management**: automatic downloading and caching of models
//!   from `HuggingFace`
//! - **Precision variants**: FP16 models are preferred on accelerators,
//!   FP32 on CPU
//! - **CLI**: optional command-line interface (enable with the `cli`
//!   feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgstrip::{remove_background, ImageInput, RemovalConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = RemovalConfig::default();
//! let result = remove_background(ImageInput::parse("photo.jpg")?, &config).await?;
//! result.save_png("photo_no_bg.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! For repeated processing, build a [`BackgroundRemover`] once and reuse
//! it; the model loads a single time at construction:
//!
//! ```rust,no_run
//! use bgstrip::{BackgroundRemover, ImageInput, RemovalConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut remover = BackgroundRemover::new(RemovalConfig::default())?;
//! for path in ["a.jpg", "b.jpg"] {
//!     let result = remover.process(ImageInput::parse(path)?).await?;
//!     result.save_png(format!("{path}.png"))?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with GPU acceleration support
//! - `cli` (default): command-line interface
//! - `webp-support` (default): WebP output encoding

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod inference;
pub mod input;
pub mod models;
pub mod preprocessing;
pub mod processor;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;

// Public API exports
pub use backends::*;
pub use cache::{format_size, CachedModelInfo, ModelCache};
pub use config::{ExecutionProvider, OutputFormat, RemovalConfig, RemovalConfigBuilder};
pub use download::{parse_huggingface_url, validate_model_url, ModelDownloader};
pub use error::{BgStripError, Result};
pub use inference::InferenceBackend;
pub use input::ImageInput;
pub use models::{ModelInfo, ModelManager, ModelSource, ModelSpec, PreprocessingConfig};
pub use preprocessing::ImagePreprocessor;
pub use processor::{BackendFactory, BackgroundRemover, DefaultBackendFactory};
pub use types::{ProcessingTimings, RemovalResult, SegmentationMask};

#[cfg(feature = "cli")]
pub use tracing_config::{TracingConfig, TracingFormat};

/// Remove the background from a single image input
///
/// Convenience wrapper that builds a [`BackgroundRemover`] for one call.
/// The model is loaded fresh each time; use [`BackgroundRemover`] directly
/// when processing multiple images.
pub async fn remove_background(
    input: ImageInput,
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    let mut remover = BackgroundRemover::new(config.clone())?;
    remover.process(input).await
}

/// Remove the background from encoded image bytes
///
/// Suitable for web servers and other memory-based processing where no
/// file is available.
pub async fn remove_background_from_bytes(
    image_bytes: &[u8],
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    let mut remover = BackgroundRemover::new(config.clone())?;
    remover.process_bytes(image_bytes)
}
