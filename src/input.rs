//! Pipeline input resolution
//!
//! The pipeline accepts a local path, an HTTP(S) URL, or an already-decoded
//! image. Each variant resolves to a decoded [`DynamicImage`] before
//! processing; anything else is rejected up front as an invalid input.

use crate::error::{BgStripError, Result};
use image::DynamicImage;
use std::path::{Path, PathBuf};

/// A single input to the background removal pipeline
#[derive(Debug, Clone)]
pub enum ImageInput {
    /// Local filesystem path to an encoded image
    Path(PathBuf),
    /// HTTP or HTTPS URL to an encoded image
    Url(String),
    /// Already-decoded in-memory image
    Image(DynamicImage),
}

impl ImageInput {
    /// Classify a string input as a URL or a local path
    ///
    /// `http://` and `https://` prefixes are treated as URLs; any other URI
    /// scheme is rejected; everything else is a filesystem path.
    ///
    /// # Errors
    /// - Empty input string
    /// - Unsupported URI scheme (e.g. `ftp://`)
    pub fn parse(input: &str) -> Result<Self> {
        if input.trim().is_empty() {
            return Err(BgStripError::invalid_input(
                "Input should be an image, a file path, or an HTTP(S) URL; got an empty string",
            ));
        }
        if input.starts_with("http://") || input.starts_with("https://") {
            return Ok(Self::Url(input.to_string()));
        }
        if let Some((scheme, _)) = input.split_once("://") {
            return Err(BgStripError::invalid_input(format!(
                "Unsupported URL scheme '{scheme}'; only http and https are supported"
            )));
        }
        Ok(Self::Path(PathBuf::from(input)))
    }

    /// Short description of the input for tracing
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::Path(path) => format!("path:{}", path.display()),
            Self::Url(url) => format!("url:{url}"),
            Self::Image(image) => format!("image:{}x{}", image.width(), image.height()),
        }
    }

    /// Resolve the input to a decoded image
    ///
    /// URL inputs are fetched over HTTP and decoded; path inputs are read
    /// from disk and decoded; decoded inputs pass through unchanged. RGB
    /// coercion happens later in preprocessing, so grayscale or
    /// alpha-carrying inputs are fine here.
    ///
    /// # Errors
    /// - Network failure fetching a URL (no retry)
    /// - File read failure for a path
    /// - Decode failure for corrupt or non-image payloads
    pub async fn resolve(self, client: &reqwest::Client) -> Result<DynamicImage> {
        match self {
            Self::Image(image) => Ok(image),
            Self::Path(path) => {
                tracing::debug!(path = %path.display(), "Decoding image from disk");
                image::open(&path).map_err(|e| match e {
                    image::ImageError::IoError(io) => {
                        BgStripError::file_io_error("read image file", &path, &io)
                    },
                    other => BgStripError::Image(other),
                })
            },
            Self::Url(url) => {
                tracing::debug!(url = %url, "Fetching image over HTTP");
                let response = client
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| BgStripError::network_error("Failed to fetch image", &e))?;
                if !response.status().is_success() {
                    return Err(BgStripError::Network(format!(
                        "Failed to fetch image '{url}': HTTP {}",
                        response.status()
                    )));
                }
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| BgStripError::network_error("Failed to read image body", &e))?;
                image::load_from_memory(&bytes).map_err(|e| {
                    BgStripError::processing(format!(
                        "Failed to decode image fetched from '{url}': {e}"
                    ))
                })
            },
        }
    }
}

impl From<DynamicImage> for ImageInput {
    fn from(image: DynamicImage) -> Self {
        Self::Image(image)
    }
}

impl From<PathBuf> for ImageInput {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for ImageInput {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_urls() {
        assert!(matches!(
            ImageInput::parse("https://example.com/cat.jpg").unwrap(),
            ImageInput::Url(_)
        ));
        assert!(matches!(
            ImageInput::parse("http://example.com/cat.jpg").unwrap(),
            ImageInput::Url(_)
        ));
    }

    #[test]
    fn test_parse_paths() {
        assert!(matches!(
            ImageInput::parse("photos/cat.jpg").unwrap(),
            ImageInput::Path(_)
        ));
        assert!(matches!(
            ImageInput::parse("/absolute/cat.png").unwrap(),
            ImageInput::Path(_)
        ));
    }

    #[test]
    fn test_parse_rejects_empty() {
        let err = ImageInput::parse("").unwrap_err();
        assert!(matches!(err, BgStripError::InvalidInput(_)));
        let err = ImageInput::parse("   ").unwrap_err();
        assert!(matches!(err, BgStripError::InvalidInput(_)));
    }

    #[test]
    fn test_parse_rejects_unsupported_schemes() {
        let err = ImageInput::parse("ftp://example.com/cat.jpg").unwrap_err();
        assert!(matches!(err, BgStripError::InvalidInput(_)));
        assert!(err.to_string().contains("ftp"));
    }

    #[tokio::test]
    async fn test_resolve_decoded_image_passthrough() {
        let image = DynamicImage::new_rgb8(10, 20);
        let client = reqwest::Client::new();
        let resolved = ImageInput::from(image).resolve(&client).await.unwrap();
        assert_eq!((resolved.width(), resolved.height()), (10, 20));
    }

    #[tokio::test]
    async fn test_resolve_missing_path_errors() {
        let client = reqwest::Client::new();
        let result = ImageInput::parse("/nonexistent/image.png")
            .unwrap()
            .resolve(&client)
            .await;
        assert!(result.is_err());
    }

    async fn serve_once(status_line: &'static str, body: &'static [u8]) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let header = format!(
                "{status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(header.as_bytes()).await.unwrap();
            socket.write_all(body).await.unwrap();
        });
        format!("http://{addr}/payload")
    }

    #[tokio::test]
    async fn test_resolve_url_non_image_body_errors() {
        let url = serve_once("HTTP/1.1 200 OK", b"this is not an image").await;

        let client = reqwest::Client::new();
        let result = ImageInput::parse(&url).unwrap().resolve(&client).await;
        assert!(matches!(result, Err(BgStripError::Processing(_))));
    }

    #[tokio::test]
    async fn test_resolve_url_error_status_is_network_error() {
        let url = serve_once("HTTP/1.1 404 Not Found", b"").await;

        let client = reqwest::Client::new();
        let result = ImageInput::parse(&url).unwrap().resolve(&client).await;
        assert!(matches!(result, Err(BgStripError::Network(_))));
    }

    #[tokio::test]
    async fn test_resolve_url_decodes_valid_image() {
        let mut png = std::io::Cursor::new(Vec::new());
        DynamicImage::new_rgb8(6, 4)
            .write_to(&mut png, image::ImageFormat::Png)
            .unwrap();
        let body: &'static [u8] = png.into_inner().leak();
        let url = serve_once("HTTP/1.1 200 OK", body).await;

        let client = reqwest::Client::new();
        let resolved = ImageInput::parse(&url).unwrap().resolve(&client).await.unwrap();
        assert_eq!((resolved.width(), resolved.height()), (6, 4));
    }

    #[tokio::test]
    async fn test_resolve_non_image_file_errors() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("not-an-image.png");
        std::fs::write(&path, b"definitely not png data").unwrap();

        let client = reqwest::Client::new();
        let result = ImageInput::Path(path).resolve(&client).await;
        assert!(matches!(result, Err(BgStripError::Image(_))));
    }
}
