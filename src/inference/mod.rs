//! Inference contract shipped with the trained model
//!
//! This module provides:
//! - Pre-processing: raw image bytes to a `[1, H, W, C]` model input
//! - Post-processing: logits to a label and per-label probabilities
//!
//! Both halves are plain data, serialized into the artifact manifest so a
//! serving process can rebuild them without the training configuration.

pub mod postprocess;
pub mod preprocess;

// Re-export main types for convenience
pub use postprocess::{Postprocessor, Prediction, Probabilities};
pub use preprocess::{ModelInput, Preprocessor};

use serde::{Deserialize, Serialize};

use crate::config::TrainConfig;

/// Paired pre- and post-processing transforms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceContract {
    pub preprocess: Preprocessor,
    pub postprocess: Postprocessor,
}

impl InferenceContract {
    /// Capture the image parameters of `config` and the dataset's labels
    pub fn new(config: &TrainConfig, labels: Vec<String>) -> Self {
        Self {
            preprocess: Preprocessor::from_config(config),
            postprocess: Postprocessor::new(labels),
        }
    }
}
