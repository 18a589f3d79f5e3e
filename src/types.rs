//! Core result types for background removal
//!
//! [`SegmentationMask`] holds the per-pixel alpha values produced from the
//! model's score map, and [`RemovalResult`] bundles the composited RGBA
//! image with the mask and per-stage timings.

use crate::config::OutputFormat;
use crate::error::{BgStripError, Result};
use image::{DynamicImage, GrayImage, ImageFormat, RgbaImage};
use ndarray::Array4;
use std::io::Cursor;
use std::path::Path;

/// Grayscale foreground mask at a fixed resolution
///
/// Values are alpha bytes: 255 is fully foreground, 0 fully background.
#[derive(Debug, Clone)]
pub struct SegmentationMask {
    /// Raw mask bytes in row-major order
    pub data: Vec<u8>,
    /// Mask dimensions as (width, height)
    pub dimensions: (u32, u32),
}

impl SegmentationMask {
    /// Create a mask from raw bytes
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Result<Self> {
        let expected = dimensions.0 as usize * dimensions.1 as usize;
        if data.len() != expected {
            return Err(BgStripError::processing(format!(
                "Mask data length {} does not match dimensions {}x{}",
                data.len(),
                dimensions.0,
                dimensions.1
            )));
        }
        Ok(Self { data, dimensions })
    }

    /// Convert a raw score tensor into an alpha mask
    ///
    /// Takes the first batch entry and channel of a `[1, 1, H, W]` tensor,
    /// applies the sigmoid to map scores into `[0, 1]`, and scales to alpha
    /// bytes.
    pub fn from_tensor(tensor: &Array4<f32>) -> Result<Self> {
        let (batch, channels, height, width) = tensor.dim();
        if batch != 1 || channels != 1 {
            return Err(BgStripError::processing(format!(
                "Expected [1, 1, H, W] score tensor, got [{batch}, {channels}, {height}, {width}]"
            )));
        }

        let mut data = Vec::with_capacity(height * width);
        for y in 0..height {
            for x in 0..width {
                let score = tensor[[0, 0, y, x]];
                let probability = 1.0 / (1.0 + (-score).exp());
                data.push((probability * 255.0).round().clamp(0.0, 255.0) as u8);
            }
        }

        Self::new(data, (width as u32, height as u32))
    }

    /// Resize the mask to new dimensions with bilinear filtering
    pub fn resize(&self, new_dimensions: (u32, u32)) -> Result<Self> {
        if new_dimensions == self.dimensions {
            return Ok(self.clone());
        }

        let image = self.to_image()?;
        let resized = image::imageops::resize(
            &image,
            new_dimensions.0,
            new_dimensions.1,
            image::imageops::FilterType::Triangle,
        );
        Self::new(resized.into_raw(), new_dimensions)
    }

    /// Convert the mask to a grayscale image
    pub fn to_image(&self) -> Result<GrayImage> {
        GrayImage::from_raw(self.dimensions.0, self.dimensions.1, self.data.clone()).ok_or_else(
            || BgStripError::processing("Failed to create grayscale image from mask data"),
        )
    }

    /// Apply the mask as the alpha channel of an image
    ///
    /// Color channels pass through untouched; only alpha is replaced.
    /// The mask must match the image dimensions.
    pub fn apply_to_image(&self, image: &DynamicImage) -> Result<RgbaImage> {
        let (width, height) = (image.width(), image.height());
        if self.dimensions != (width, height) {
            return Err(BgStripError::processing(format!(
                "Mask dimensions {}x{} do not match image dimensions {width}x{height}",
                self.dimensions.0, self.dimensions.1
            )));
        }

        let mut rgba = image.to_rgba8();
        for (pixel, alpha) in rgba.pixels_mut().zip(self.data.iter()) {
            pixel.0[3] = *alpha;
        }
        Ok(rgba)
    }

    /// Fraction of pixels classified as foreground (alpha > 127)
    #[must_use]
    pub fn foreground_ratio(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        let foreground = self.data.iter().filter(|&&alpha| alpha > 127).count();
        foreground as f64 / self.data.len() as f64
    }
}

/// Per-stage timings for one removal, in milliseconds
#[derive(Debug, Clone, Default)]
pub struct ProcessingTimings {
    /// Model load and session creation, present only on first use
    pub model_load_ms: Option<u64>,
    /// Input decode (file read or network fetch included)
    pub decode_ms: u64,
    /// Resize and normalization into the input tensor
    pub preprocessing_ms: u64,
    /// Model forward pass
    pub inference_ms: u64,
    /// Mask conversion, resize and compositing
    pub postprocessing_ms: u64,
    /// End-to-end wall time
    pub total_ms: u64,
}

/// Result of a background removal operation
#[derive(Debug, Clone)]
pub struct RemovalResult {
    /// RGBA image at the original input dimensions
    pub image: RgbaImage,
    /// The mask used for compositing, at the original input dimensions
    pub mask: SegmentationMask,
    /// Dimensions of the input image as (width, height)
    pub original_dimensions: (u32, u32),
    /// Stage timings for this call
    pub timings: ProcessingTimings,
}

impl RemovalResult {
    /// Save the result as a PNG file
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.image.save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }

    /// Save the result in the given format
    ///
    /// JPEG has no alpha channel, so the image is flattened onto a white
    /// background first.
    pub fn save<P: AsRef<Path>>(&self, path: P, format: OutputFormat, quality: u8) -> Result<()> {
        let bytes = self.to_bytes(format, quality)?;
        std::fs::write(path.as_ref(), bytes)
            .map_err(|e| BgStripError::file_io_error("write", path.as_ref(), &e))
    }

    /// Encode the result into the given format
    pub fn to_bytes(&self, format: OutputFormat, quality: u8) -> Result<Vec<u8>> {
        match format {
            OutputFormat::Png => {
                let mut buffer = Cursor::new(Vec::new());
                self.image.write_to(&mut buffer, ImageFormat::Png)?;
                Ok(buffer.into_inner())
            },
            OutputFormat::Jpeg => {
                let flattened = self.flatten_onto_white();
                let mut buffer = Cursor::new(Vec::new());
                let encoder =
                    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
                flattened.write_with_encoder(encoder)?;
                Ok(buffer.into_inner())
            },
            OutputFormat::WebP => {
                #[cfg(feature = "webp-support")]
                {
                    let mut buffer = Cursor::new(Vec::new());
                    self.image.write_to(&mut buffer, ImageFormat::WebP)?;
                    Ok(buffer.into_inner())
                }
                #[cfg(not(feature = "webp-support"))]
                {
                    Err(BgStripError::invalid_config(
                        "WebP output requires the webp-support feature",
                    ))
                }
            },
            OutputFormat::Rgba8 => Ok(self.image.as_raw().clone()),
        }
    }

    fn flatten_onto_white(&self) -> image::RgbImage {
        let mut rgb = image::RgbImage::new(self.image.width(), self.image.height());
        for (target, source) in rgb.pixels_mut().zip(self.image.pixels()) {
            let alpha = f32::from(source.0[3]) / 255.0;
            for channel in 0..3 {
                let value = f32::from(source.0[channel]);
                target.0[channel] = (value * alpha + 255.0 * (1.0 - alpha)).round() as u8;
            }
        }
        rgb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_length_must_match_dimensions() {
        assert!(SegmentationMask::new(vec![0; 10], (4, 4)).is_err());
        assert!(SegmentationMask::new(vec![0; 16], (4, 4)).is_ok());
    }

    #[test]
    fn test_from_tensor_applies_sigmoid() {
        let mut tensor = Array4::zeros((1, 1, 1, 3));
        tensor[[0, 0, 0, 0]] = -20.0;
        tensor[[0, 0, 0, 1]] = 0.0;
        tensor[[0, 0, 0, 2]] = 20.0;

        let mask = SegmentationMask::from_tensor(&tensor).unwrap();
        assert_eq!(mask.data, vec![0, 128, 255]);
    }

    #[test]
    fn test_from_tensor_rejects_multi_channel() {
        let tensor = Array4::zeros((1, 2, 4, 4));
        assert!(SegmentationMask::from_tensor(&tensor).is_err());
    }

    #[test]
    fn test_apply_preserves_color_channels() {
        let mut rgba = RgbaImage::new(2, 1);
        rgba.put_pixel(0, 0, image::Rgba([10, 20, 30, 255]));
        rgba.put_pixel(1, 0, image::Rgba([40, 50, 60, 255]));
        let image = DynamicImage::ImageRgba8(rgba);

        let mask = SegmentationMask::new(vec![255, 0], (2, 1)).unwrap();
        let result = mask.apply_to_image(&image).unwrap();

        assert_eq!(result.get_pixel(0, 0).0, [10, 20, 30, 255]);
        assert_eq!(result.get_pixel(1, 0).0, [40, 50, 60, 0]);
    }

    #[test]
    fn test_apply_rejects_dimension_mismatch() {
        let image = DynamicImage::new_rgb8(4, 4);
        let mask = SegmentationMask::new(vec![0; 4], (2, 2)).unwrap();
        assert!(mask.apply_to_image(&image).is_err());
    }

    #[test]
    fn test_resize_noop_at_same_dimensions() {
        let mask = SegmentationMask::new(vec![128; 16], (4, 4)).unwrap();
        let resized = mask.resize((4, 4)).unwrap();
        assert_eq!(resized.data, mask.data);
    }

    #[test]
    fn test_resize_changes_dimensions() {
        let mask = SegmentationMask::new(vec![255; 16], (4, 4)).unwrap();
        let resized = mask.resize((8, 8)).unwrap();
        assert_eq!(resized.dimensions, (8, 8));
        assert!(resized.data.iter().all(|&alpha| alpha == 255));
    }

    #[test]
    fn test_foreground_ratio() {
        let mask = SegmentationMask::new(vec![255, 255, 0, 0], (2, 2)).unwrap();
        assert!((mask.foreground_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_jpeg_flattens_alpha_onto_white() {
        let mut rgba = RgbaImage::new(1, 1);
        rgba.put_pixel(0, 0, image::Rgba([0, 0, 0, 0]));
        let result = RemovalResult {
            image: rgba,
            mask: SegmentationMask::new(vec![0], (1, 1)).unwrap(),
            original_dimensions: (1, 1),
            timings: ProcessingTimings::default(),
        };

        let bytes = result.to_bytes(OutputFormat::Jpeg, 90).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
        // Fully transparent black flattens to white
        assert!(decoded.get_pixel(0, 0).0.iter().all(|&value| value > 240));
    }
}
