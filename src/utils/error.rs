//! Error Handling Module
//!
//! Defines the error taxonomy of the training and packaging pipeline.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the celestial bodies pipeline
#[derive(Error, Debug)]
pub enum CelestialError {
    /// Missing or invalid parameter file or fields
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing dataset directory, malformed labels, or bad examples
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// A raw image could not be decoded or resized
    #[error("Input error: {0}")]
    Input(String),

    /// Tensor or vector dimensions do not line up
    #[error("Shape error: {0}")]
    Shape(String),

    /// Artifact store or export destination failure
    #[error("Packaging error: {0}")]
    Packaging(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CelestialError {
    fn from(err: serde_json::Error) -> Self {
        CelestialError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for CelestialError {
    fn from(err: serde_yaml::Error) -> Self {
        CelestialError::Serialization(err.to_string())
    }
}

/// Convenience Result type for pipeline operations
pub type Result<T> = std::result::Result<T, CelestialError>;

/// Extension trait for attaching a packaging context to foreign errors
pub trait ResultExt<T> {
    /// Map any error into [`CelestialError::Packaging`] with a message prefix
    fn packaging(self, msg: &str) -> Result<T>;

    /// Map any error into [`CelestialError::Dataset`] with a lazily built prefix
    fn dataset_with<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    fn packaging(self, msg: &str) -> Result<T> {
        self.map_err(|e| CelestialError::Packaging(format!("{}: {}", msg, e)))
    }

    fn dataset_with<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| CelestialError::Dataset(format!("{}: {}", f(), e)))
    }
}
