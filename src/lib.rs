//! # Celestial Bodies Classifier
//!
//! Trains a small convolutional classifier for celestial body images with the
//! Burn framework and packages it, together with its inference contract, as a
//! versioned artifact.
//!
//! ## Modules
//!
//! - `config`: The `params.yaml` training configuration
//! - `dataset`: Loading the prepared train/test splits and label list
//! - `model`: CNN architecture built with Burn
//! - `training`: Training loop and per-epoch history
//! - `inference`: Pre- and post-processing shipped with the model
//! - `artifact`: Model store, export, and history persistence
//! - `pipeline`: The end-to-end run used by the `celestial-train` binary
//! - `utils`: Logging, errors, and helper functions
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use celestial_bodies::artifact::ArtifactStore;
//! use celestial_bodies::backend::{default_device, TrainingBackend};
//! use celestial_bodies::config::load_params;
//!
//! let config = load_params("params.yaml".as_ref())?;
//! let store = ArtifactStore::from_env()?;
//! let summary = celestial_bodies::pipeline::run::<TrainingBackend>(
//!     &config,
//!     "data/prepared".as_ref(),
//!     "model".as_ref(),
//!     &store,
//!     &default_device(),
//! )?;
//! ```

pub mod artifact;
pub mod backend;
pub mod config;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod pipeline;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use artifact::{ArtifactManifest, ArtifactStore, ArtifactTag};
pub use config::TrainConfig;
pub use dataset::PreparedDataset;
pub use inference::{InferenceContract, Postprocessor, Prediction, Preprocessor};
pub use model::{CelestialClassifier, CelestialClassifierConfig};
pub use pipeline::{run, RunStage, RunSummary};
pub use training::{TrainedModel, TrainingHistory};
pub use utils::error::{CelestialError, Result};

/// Name the model is registered under in the store
pub const MODEL_NAME: &str = "celestial_bodies_classifier_model";

/// Exported artifact file inside the model folder
pub const ARTIFACT_FILE: &str = "celestial_bodies_classifier_model.bentomodel";

/// Training history file inside the model folder
pub const HISTORY_FILE: &str = "history.npy";

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
