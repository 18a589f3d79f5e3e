//! Image preprocessing for model inference
//!
//! Turns a decoded image into the normalized NCHW tensor the segmentation
//! model expects: RGB coercion, bilinear resize to the model's fixed input
//! resolution (aspect ratio is not preserved, matching the model's training
//! transform), and per-channel mean/std normalization.

use crate::error::{BgStripError, Result};
use crate::models::PreprocessingConfig;
use image::DynamicImage;
use ndarray::Array4;

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Preprocess an image into an inference-ready tensor
    ///
    /// # Errors
    /// - Zero-sized target resolution in the preprocessing config
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<Array4<f32>> {
        let [target_width, target_height] = preprocessing_config.target_size;
        if target_width == 0 || target_height == 0 {
            return Err(BgStripError::invalid_config(
                "Preprocessing target size must be non-zero",
            ));
        }

        // Coerce to RGB; grayscale and alpha-carrying inputs all normalize
        // to three channels here
        let rgb_image = image.to_rgb8();

        let resized = image::imageops::resize(
            &rgb_image,
            target_width,
            target_height,
            image::imageops::FilterType::Triangle,
        );

        let width = target_width as usize;
        let height = target_height as usize;
        let mean = preprocessing_config.normalization_mean;
        let std = preprocessing_config.normalization_std;

        let mut tensor = Array4::<f32>::zeros((1, 3, height, width));

        #[allow(clippy::indexing_slicing)]
        // Tensor dimensions are pre-allocated to match the resized image
        for (y, row) in resized.rows().enumerate() {
            for (x, pixel) in row.enumerate() {
                for channel in 0..3 {
                    let value = f32::from(pixel[channel]) / 255.0;
                    tensor[[0, channel, y, x]] = (value - mean[channel]) / std[channel];
                }
            }
        }

        Ok(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma, Rgb};

    fn test_config() -> PreprocessingConfig {
        PreprocessingConfig {
            target_size: [1024, 1024],
            normalization_mean: [0.485, 0.456, 0.406],
            normalization_std: [0.229, 0.224, 0.225],
        }
    }

    #[test]
    fn test_tensor_shape() {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(100, 50, Rgb([255, 0, 0])));
        let tensor = ImagePreprocessor::preprocess_for_inference(&img, &test_config()).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 1024, 1024]);
    }

    #[test]
    fn test_normalization_values() {
        // A pure white image maps to (1.0 - mean) / std per channel
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(8, 8, Rgb([255, 255, 255])));
        let config = test_config();
        let tensor = ImagePreprocessor::preprocess_for_inference(&img, &config).unwrap();

        for channel in 0..3 {
            let expected =
                (1.0 - config.normalization_mean[channel]) / config.normalization_std[channel];
            let actual = tensor[[0, channel, 0, 0]];
            assert!((actual - expected).abs() < 1e-5, "channel {channel}: {actual} vs {expected}");
        }
    }

    #[test]
    fn test_grayscale_coercion() {
        let img = DynamicImage::ImageLuma8(ImageBuffer::from_pixel(20, 20, Luma([128u8])));
        let tensor = ImagePreprocessor::preprocess_for_inference(&img, &test_config()).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 1024, 1024]);
    }

    #[test]
    fn test_custom_target_size() {
        let img = DynamicImage::new_rgb8(30, 30);
        let config = PreprocessingConfig {
            target_size: [256, 128],
            ..test_config()
        };
        let tensor = ImagePreprocessor::preprocess_for_inference(&img, &config).unwrap();
        // NCHW: height then width
        assert_eq!(tensor.shape(), &[1, 3, 128, 256]);
    }

    #[test]
    fn test_zero_target_size_rejected() {
        let img = DynamicImage::new_rgb8(10, 10);
        let config = PreprocessingConfig {
            target_size: [0, 1024],
            ..test_config()
        };
        assert!(ImagePreprocessor::preprocess_for_inference(&img, &config).is_err());
    }
}
