//! Training module
//!
//! Contains the supervised training loop and the per-epoch history it records.

pub mod history;
pub mod trainer;

pub use history::{EpochRecord, TrainingHistory};
pub use trainer::{train, TrainedModel};
