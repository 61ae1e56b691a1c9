//! Pre-processing half of the inference contract
//!
//! Turns a raw image of any size into the channel-last `[1, H, W, C]` tensor
//! the classifier was trained on.

use burn::prelude::*;
use image::{imageops::FilterType, DynamicImage, ImageBuffer, Pixel};
use serde::{Deserialize, Serialize};

use crate::config::{ImageSize, TrainConfig};
use crate::utils::error::{CelestialError, Result};

/// Bicubic resampling
const RESIZE_FILTER: FilterType = FilterType::CatmullRom;

/// A single pre-processed image with its batch dimension
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInput {
    /// `[1, height, width, channels]`
    pub shape: [usize; 4],
    /// Row-major values in `[0, 1]`
    pub data: Vec<f32>,
}

impl ModelInput {
    /// Build the Burn tensor on `device`
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 4> {
        Tensor::from_data(TensorData::new(self.data.clone(), self.shape), device)
    }
}

/// Resize and scale raw images for the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preprocessor {
    /// Target `(width, height)`
    pub image_size: ImageSize,
    /// Convert to single-channel luma when true, RGB otherwise
    pub grayscale: bool,
}

impl Preprocessor {
    pub fn new(image_size: ImageSize, grayscale: bool) -> Self {
        Self {
            image_size,
            grayscale,
        }
    }

    /// Capture the transform parameters of a training configuration
    pub fn from_config(config: &TrainConfig) -> Self {
        Self::new(config.image_size, config.grayscale)
    }

    pub fn channels(&self) -> usize {
        if self.grayscale {
            1
        } else {
            3
        }
    }

    /// Shape of every [`ModelInput`] this transform produces
    pub fn output_shape(&self) -> [usize; 4] {
        [
            1,
            self.image_size.height as usize,
            self.image_size.width as usize,
            self.channels(),
        ]
    }

    /// Decode encoded image bytes (PNG, JPEG, ...) and pre-process them
    pub fn process_bytes(&self, bytes: &[u8]) -> Result<ModelInput> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| CelestialError::Input(format!("Failed to decode image: {}", e)))?;
        self.process(&image)
    }

    /// Convert, resize, and scale an already decoded image
    pub fn process(&self, image: &DynamicImage) -> Result<ModelInput> {
        let ImageSize { width, height } = self.image_size;
        if width == 0 || height == 0 {
            return Err(CelestialError::Input(format!(
                "Cannot resize to {}",
                self.image_size
            )));
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(CelestialError::Input("Image has no pixels".to_string()));
        }

        let raw = if self.grayscale {
            resize(image.to_luma8(), width, height)
        } else {
            resize(image.to_rgb8(), width, height)
        };

        Ok(ModelInput {
            shape: self.output_shape(),
            data: raw.iter().map(|&p| p as f32 / 255.0).collect(),
        })
    }
}

/// Resize unless the image already has the target size
fn resize<P>(img: ImageBuffer<P, Vec<u8>>, width: u32, height: u32) -> Vec<u8>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    if img.dimensions() == (width, height) {
        img.into_raw()
    } else {
        image::imageops::resize(&img, width, height, RESIZE_FILTER).into_raw()
    }
}
