//! Model definitions for celestial bodies classification
//!
//! A single small CNN operating on channel-last images.

pub mod cnn;

pub use cnn::{build_model, weight_norm, CelestialClassifier, CelestialClassifierConfig};
