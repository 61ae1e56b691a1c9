//! Dataset module for prepared celestial bodies data
//!
//! This module provides functionality for:
//! - Loading the train/test splits and label list written by the preparation stage
//! - Exposing decoded examples through Burn's `Dataset` and `Batcher` traits
//!
//! The on-disk layout is an explicit manifest per split, so the trainer never
//! depends on the storage format of whatever tool prepared the images.

pub mod burn_dataset;
pub mod loader;

// Re-export main types for convenience
pub use burn_dataset::{CelestialBatch, CelestialBatcher, CelestialItem, DatasetSplit};
pub use loader::{load_labels, load_split, PreparedDataset, SampleEntry, SplitManifest};

/// Label list file at the dataset root
pub const LABELS_FILE: &str = "labels.json";

/// Per-split manifest file
pub const MANIFEST_FILE: &str = "manifest.json";

/// Directory name of the training split
pub const TRAIN_SPLIT: &str = "train";

/// Directory name of the validation/test split
pub const TEST_SPLIT: &str = "test";
