//! Configuration record for a training run.
//!
//! The parameter file is the `params.yaml` shared with the dataset preparation
//! stage. Only two sections matter here:
//!
//! ```yaml
//! prepare:
//!   image_size: [32, 32]
//!   grayscale: true
//! train:
//!   seed: 77
//!   lr: 0.0001
//!   epochs: 5
//!   conv_size: 32
//!   dense_size: 64
//!   output_classes: 11
//! ```
//!
//! Any other keys (`prepare.seed`, `prepare.split`, ...) are ignored.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::utils::error::{CelestialError, Result};

/// Default location of the parameter file, relative to the working directory
pub const DEFAULT_PARAMS_FILE: &str = "params.yaml";

/// Target image size as `(width, height)` in pixels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Raw contents of the parameter file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Params {
    pub prepare: PrepareParams,
    pub train: TrainParams,
}

/// `prepare` section: how the dataset images were shaped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareParams {
    /// `[width, height]`
    pub image_size: [u32; 2],
    pub grayscale: bool,
}

/// `train` section: model and optimizer hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainParams {
    pub seed: u64,
    pub lr: f64,
    pub epochs: usize,
    pub conv_size: usize,
    pub dense_size: usize,
    pub output_classes: usize,
}

/// Validated, flat configuration consumed by every pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainConfig {
    /// Image size the model is trained on
    pub image_size: ImageSize,
    /// Single-channel input when true, RGB otherwise
    pub grayscale: bool,
    /// Seed for weight initialization and batch shuffling
    pub seed: u64,
    /// Adam learning rate
    pub learning_rate: f64,
    /// Number of full passes over the training split
    pub epochs: usize,
    /// Filters of the convolution layer
    pub conv_filters: usize,
    /// Units of the hidden dense layer
    pub dense_units: usize,
    /// Width of the logits layer
    pub output_classes: usize,
}

impl TrainConfig {
    /// Number of image channels implied by `grayscale`
    pub fn channels(&self) -> usize {
        if self.grayscale {
            1
        } else {
            3
        }
    }

    /// Model input shape as `(height, width, channels)`
    pub fn image_shape(&self) -> [usize; 3] {
        [
            self.image_size.height as usize,
            self.image_size.width as usize,
            self.channels(),
        ]
    }

    /// Check that every field is positive and finite
    pub fn validate(&self) -> Result<()> {
        if self.image_size.width == 0 || self.image_size.height == 0 {
            return Err(CelestialError::Config(format!(
                "prepare.image_size must be positive, got {}",
                self.image_size
            )));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(CelestialError::Config(format!(
                "train.lr must be a positive number, got {}",
                self.learning_rate
            )));
        }

        let positive = [
            ("train.epochs", self.epochs),
            ("train.conv_size", self.conv_filters),
            ("train.dense_size", self.dense_units),
            ("train.output_classes", self.output_classes),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(CelestialError::Config(format!("{name} must be positive")));
            }
        }

        Ok(())
    }
}

impl TryFrom<Params> for TrainConfig {
    type Error = CelestialError;

    fn try_from(params: Params) -> Result<Self> {
        let [width, height] = params.prepare.image_size;
        let config = Self {
            image_size: ImageSize::new(width, height),
            grayscale: params.prepare.grayscale,
            seed: params.train.seed,
            learning_rate: params.train.lr,
            epochs: params.train.epochs,
            conv_filters: params.train.conv_size,
            dense_units: params.train.dense_size,
            output_classes: params.train.output_classes,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Parse and validate parameters from YAML text
pub fn parse_params(content: &str) -> Result<TrainConfig> {
    let params: Params = serde_yaml::from_str(content)
        .map_err(|e| CelestialError::Config(format!("Failed to parse parameters: {e}")))?;
    TrainConfig::try_from(params)
}

/// Read, parse, and validate the parameter file
pub fn load_params(path: &Path) -> Result<TrainConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| CelestialError::Config(format!("Failed to read {}: {e}", path.display())))?;

    parse_params(&content).map_err(|e| match e {
        CelestialError::Config(msg) => {
            CelestialError::Config(format!("{} ({})", msg, path.display()))
        }
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: &str = r#"
prepare:
  seed: 77
  split: 0.2
  image_size: [32, 48]
  grayscale: true
train:
  seed: 77
  lr: 0.0001
  epochs: 5
  conv_size: 32
  dense_size: 64
  output_classes: 11
"#;

    #[test]
    fn test_parse_params() {
        let config = parse_params(PARAMS).unwrap();
        assert_eq!(config.image_size, ImageSize::new(32, 48));
        assert!(config.grayscale);
        assert_eq!(config.seed, 77);
        assert_eq!(config.epochs, 5);
        assert_eq!(config.conv_filters, 32);
        assert_eq!(config.dense_units, 64);
        assert_eq!(config.output_classes, 11);
    }

    #[test]
    fn test_image_shape_is_height_width_channels() {
        let config = parse_params(PARAMS).unwrap();
        assert_eq!(config.image_shape(), [48, 32, 1]);

        let rgb = TrainConfig {
            grayscale: false,
            ..config
        };
        assert_eq!(rgb.image_shape(), [48, 32, 3]);
    }

    #[test]
    fn test_missing_section_is_config_error() {
        let err = parse_params("prepare:\n  image_size: [8, 8]\n  grayscale: false\n").unwrap_err();
        assert!(matches!(err, CelestialError::Config(_)));
        assert!(err.to_string().contains("train"));
    }

    #[test]
    fn test_missing_field_is_config_error() {
        let content = PARAMS.replace("  dense_size: 64\n", "");
        let err = parse_params(&content).unwrap_err();
        assert!(err.to_string().contains("dense_size"));
    }

    #[test]
    fn test_non_positive_values_rejected() {
        let zero_epochs = PARAMS.replace("epochs: 5", "epochs: 0");
        assert!(matches!(
            parse_params(&zero_epochs),
            Err(CelestialError::Config(_))
        ));

        let negative_lr = PARAMS.replace("lr: 0.0001", "lr: -0.1");
        assert!(matches!(
            parse_params(&negative_lr),
            Err(CelestialError::Config(_))
        ));

        let negative_filters = PARAMS.replace("conv_size: 32", "conv_size: -3");
        assert!(matches!(
            parse_params(&negative_filters),
            Err(CelestialError::Config(_))
        ));
    }

    #[test]
    fn test_load_params_missing_file() {
        let err = load_params(Path::new("/definitely/not/here/params.yaml")).unwrap_err();
        assert!(matches!(err, CelestialError::Config(_)));
    }
}
