//! Background removal command-line interface
//!
//! Thin frontend over [`BackgroundRemover`]: parses arguments, manages the
//! model cache, then runs the pipeline on the given input.

use crate::cache::{format_size, ModelCache};
use crate::config::{ExecutionProvider, OutputFormat, RemovalConfig};
use crate::download::ModelDownloader;
use crate::input::ImageInput;
use crate::models::{ModelSource, ModelSpec, DEFAULT_MODEL_URL};
use crate::processor::BackgroundRemover;
use crate::tracing_config::{TracingConfig, TracingFormat};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};

/// Background removal CLI tool
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgstrip")]
pub struct Cli {
    /// Input image file or URL
    #[arg(value_name = "INPUT", required_unless_present_any = &["only_download", "list_models", "clear_cache", "show_cache_dir"])]
    pub input: Option<String>,

    /// Output file [default: <input stem>.png]
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = CliOutputFormat::Png)]
    pub format: CliOutputFormat,

    /// Execution provider
    #[arg(short, long, value_enum, default_value_t = CliProvider::Auto)]
    pub execution_provider: CliProvider,

    /// JPEG quality (0-100)
    #[arg(long, default_value_t = 90)]
    pub jpeg_quality: u8,

    /// Number of threads (0 = auto-detect optimal threading)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Model URL, cached model ID, or path to a model folder [default: BiRefNet]
    #[arg(short, long)]
    pub model: Option<String>,

    /// Model variant (fp16, fp32) [default: auto-selected by provider]
    #[arg(long)]
    pub variant: Option<String>,

    /// Download the model but don't process any images
    #[arg(long)]
    pub only_download: bool,

    /// List cached models and exit
    #[arg(long)]
    pub list_models: bool,

    /// Clear cached models (combine with --model to clear a specific model)
    #[arg(long)]
    pub clear_cache: bool,

    /// Show current cache directory and exit
    #[arg(long)]
    pub show_cache_dir: bool,

    /// Use custom cache directory
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliOutputFormat {
    Png,
    Jpeg,
    Webp,
    Rgba8,
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(format: CliOutputFormat) -> Self {
        match format {
            CliOutputFormat::Png => Self::Png,
            CliOutputFormat::Jpeg => Self::Jpeg,
            CliOutputFormat::Webp => Self::WebP,
            CliOutputFormat::Rgba8 => Self::Rgba8,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliProvider {
    Auto,
    Cpu,
    Cuda,
    Coreml,
}

impl From<CliProvider> for ExecutionProvider {
    fn from(provider: CliProvider) -> Self {
        match provider {
            CliProvider::Auto => Self::Auto,
            CliProvider::Cpu => Self::Cpu,
            CliProvider::Cuda => Self::Cuda,
            CliProvider::Coreml => Self::CoreMl,
        }
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose).context("Failed to initialize tracing")?;

    // Propagate a custom cache dir to every cache consumer, including the
    // model manager inside the processor
    if let Some(dir) = &cli.cache_dir {
        std::env::set_var("BGSTRIP_CACHE_DIR", dir);
    }

    if cli.show_cache_dir {
        return show_current_cache_dir(&cli);
    }

    if cli.list_models {
        return list_cached_models(&cli);
    }

    if cli.clear_cache {
        return clear_cache_models(&cli);
    }

    if cli.only_download {
        return download_model_only(&cli).await;
    }

    let input = cli
        .input
        .as_deref()
        .context("An input image file or URL is required")?;
    let input = ImageInput::parse(input)?;

    let model_spec = build_model_spec(&cli)?;
    ensure_model_available(&cli, &model_spec)
        .await
        .context("Failed to ensure model is available")?;

    let config = RemovalConfig::builder()
        .execution_provider(cli.execution_provider.into())
        .output_format(cli.format.into())
        .jpeg_quality(cli.jpeg_quality)
        .intra_threads(cli.threads)
        .debug(cli.verbose > 0)
        .model_spec(model_spec)
        .build()
        .context("Invalid configuration")?;

    let output_path = resolve_output_path(&cli, &input);

    let mut remover =
        BackgroundRemover::new(config).context("Failed to create background remover")?;
    let result = remover.process(input).await.context("Processing failed")?;

    result
        .save(&output_path, cli.format.into(), cli.jpeg_quality)
        .with_context(|| format!("Failed to save output to {}", output_path.display()))?;

    tracing::info!(
        output = %output_path.display(),
        width = result.original_dimensions.0,
        height = result.original_dimensions.1,
        total_ms = result.timings.total_ms,
        inference_ms = result.timings.inference_ms,
        "Background removed"
    );

    Ok(())
}

/// Initialize tracing based on verbosity level
fn init_tracing(verbose_count: u8) -> Result<()> {
    TracingConfig::new()
        .with_verbosity(verbose_count)
        .with_format(TracingFormat::Console)
        .init()
        .context("Failed to initialize tracing subscriber")
}

fn open_cache(cli: &Cli) -> Result<ModelCache> {
    match &cli.cache_dir {
        Some(dir) => {
            ModelCache::with_custom_cache_dir(dir).context("Failed to open custom model cache")
        },
        None => ModelCache::new().context("Failed to open model cache"),
    }
}

/// Map the --model argument onto a model source
///
/// URLs resolve to their cached model ID, existing directories become
/// external sources, anything else is treated as a cached model ID.
fn build_model_spec(cli: &Cli) -> Result<ModelSpec> {
    let source = match cli.model.as_deref() {
        None => ModelSource::Registry(ModelCache::url_to_model_id(DEFAULT_MODEL_URL)),
        Some(model) if model.starts_with("http://") || model.starts_with("https://") => {
            ModelSource::Registry(ModelCache::url_to_model_id(model))
        },
        Some(model) if Path::new(model).is_dir() => {
            ModelSource::External(PathBuf::from(model))
        },
        Some(model) => ModelSource::Registry(model.to_string()),
    };

    Ok(ModelSpec {
        source,
        variant: cli.variant.clone(),
    })
}

/// Auto-download the model when it is missing from the cache
async fn ensure_model_available(cli: &Cli, model_spec: &ModelSpec) -> Result<()> {
    let ModelSource::Registry(model_id) = &model_spec.source else {
        return Ok(());
    };

    let cache = open_cache(cli)?;
    if cache.is_model_cached(model_id) {
        return Ok(());
    }

    let url = match cli.model.as_deref() {
        Some(model) if model.starts_with("http://") || model.starts_with("https://") => model,
        None => DEFAULT_MODEL_URL,
        Some(model) => anyhow::bail!(
            "Model '{model}' not found in cache. Pass a URL to download it, or use --list-models to see cached models."
        ),
    };

    println!("Model not cached, downloading from {url}");
    let downloader = ModelDownloader::with_cache(cache).context("Failed to create downloader")?;
    let downloaded_id = downloader
        .download_model(url, true)
        .await
        .context("Failed to download model")?;
    tracing::info!(model_id = %downloaded_id, "Model downloaded");

    Ok(())
}

async fn download_model_only(cli: &Cli) -> Result<()> {
    let url = cli.model.as_deref().unwrap_or(DEFAULT_MODEL_URL);
    let cache = open_cache(cli)?;
    let downloader = ModelDownloader::with_cache(cache).context("Failed to create downloader")?;
    let model_id = downloader
        .download_model(url, true)
        .await
        .context("Failed to download model")?;
    println!("Model '{model_id}' is available in the cache");
    Ok(())
}

fn list_cached_models(cli: &Cli) -> Result<()> {
    let cache = open_cache(cli)?;
    let models = cache
        .scan_cached_models()
        .context("Failed to list cached models")?;

    if models.is_empty() {
        println!("No cached models. Use --only-download to fetch one.");
        return Ok(());
    }

    println!("Cached models in {}:", cache.get_current_cache_dir().display());
    for model in models {
        println!(
            "  {} ({}) variants: {}",
            model.model_id,
            format_size(model.size_bytes),
            model.variants.join(", ")
        );
    }
    Ok(())
}

fn clear_cache_models(cli: &Cli) -> Result<()> {
    let cache = open_cache(cli)?;

    if let Some(model) = cli.model.as_deref() {
        let model_id = if model.starts_with("http://") || model.starts_with("https://") {
            ModelCache::url_to_model_id(model)
        } else {
            model.to_string()
        };
        if cache
            .clear_specific_model(&model_id)
            .context("Failed to clear model")?
        {
            println!("Removed model '{model_id}'");
        } else {
            println!("Model '{model_id}' was not cached");
        }
    } else {
        let removed = cache.clear_all_models().context("Failed to clear cache")?;
        println!("Removed {} cached model(s)", removed.len());
    }
    Ok(())
}

fn show_current_cache_dir(cli: &Cli) -> Result<()> {
    let cache = open_cache(cli)?;
    println!("{}", cache.get_current_cache_dir().display());
    Ok(())
}

/// Default the output path to the input stem with a format extension
fn resolve_output_path(cli: &Cli, input: &ImageInput) -> PathBuf {
    if let Some(output) = &cli.output {
        return output.clone();
    }

    let extension = match cli.format {
        CliOutputFormat::Png => "png",
        CliOutputFormat::Jpeg => "jpg",
        CliOutputFormat::Webp => "webp",
        CliOutputFormat::Rgba8 => "rgba8",
    };

    let stem = match input {
        ImageInput::Path(path) => path
            .file_stem()
            .map_or_else(|| "output".to_string(), |s| s.to_string_lossy().into_owned()),
        ImageInput::Url(url) => url
            .rsplit('/')
            .next()
            .and_then(|name| name.split('.').next())
            .filter(|name| !name.is_empty())
            .map_or_else(|| "output".to_string(), ToString::to_string),
        ImageInput::Image(_) => "output".to_string(),
    };

    PathBuf::from(format!("{stem}_no_bg.{extension}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_output_defaults_to_input_stem() {
        let cli = Cli::parse_from(["bgstrip", "photo.jpg"]);
        let input = ImageInput::parse("photo.jpg").unwrap();
        assert_eq!(
            resolve_output_path(&cli, &input),
            PathBuf::from("photo_no_bg.png")
        );
    }

    #[test]
    fn test_url_model_maps_to_cached_id() {
        let cli = Cli::parse_from([
            "bgstrip",
            "photo.jpg",
            "--model",
            "https://huggingface.co/ZhengPeng7/BiRefNet",
        ]);
        let spec = build_model_spec(&cli).unwrap();
        assert_eq!(
            spec.source,
            ModelSource::Registry("ZhengPeng7--BiRefNet".to_string())
        );
    }

    #[test]
    fn test_variant_flag_carried_into_spec() {
        let cli = Cli::parse_from(["bgstrip", "photo.jpg", "--variant", "fp32"]);
        let spec = build_model_spec(&cli).unwrap();
        assert_eq!(spec.variant.as_deref(), Some("fp32"));
    }
}
