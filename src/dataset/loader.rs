//! Prepared Dataset Loader
//!
//! Loads the output of the dataset preparation stage:
//!
//! ```text
//! <dataset>/
//!   labels.json              ["planet", "star", ...]
//!   train/manifest.json      {"image_shape": [H, W, C], "batch_size": 32,
//!                             "samples": [{"file": "0001.png", "label": 1}, ...]}
//!   train/0001.png ...
//!   test/manifest.json
//!   test/...
//! ```
//!
//! Image files are resolved relative to their split directory and must already
//! be `W x H` pixels.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::burn_dataset::{CelestialItem, DatasetSplit};
use super::{LABELS_FILE, MANIFEST_FILE, TEST_SPLIT, TRAIN_SPLIT};
use crate::utils::error::{CelestialError, Result, ResultExt};

/// One entry of a split manifest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SampleEntry {
    /// Image file relative to the split directory
    pub file: PathBuf,
    /// Class index into `labels.json`
    pub label: usize,
}

/// Metadata and example list of one prepared split
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SplitManifest {
    /// Element shape `[H, W, C]`
    pub image_shape: [usize; 3],
    /// Mini-batch size for iteration
    pub batch_size: usize,
    pub samples: Vec<SampleEntry>,
}

impl SplitManifest {
    /// Read `manifest.json` from a split directory
    pub fn read(split_dir: &Path) -> Result<Self> {
        let path = split_dir.join(MANIFEST_FILE);
        let content = fs::read_to_string(&path)
            .dataset_with(|| format!("Failed to read {}", path.display()))?;
        let manifest: SplitManifest = serde_json::from_str(&content)
            .dataset_with(|| format!("Failed to parse {}", path.display()))?;

        if manifest.batch_size == 0 {
            return Err(CelestialError::Dataset(format!(
                "{}: batch_size must be positive",
                path.display()
            )));
        }
        if manifest.image_shape.contains(&0) {
            return Err(CelestialError::Dataset(format!(
                "{}: image_shape {:?} has a zero dimension",
                path.display(),
                manifest.image_shape
            )));
        }

        Ok(manifest)
    }

    /// Write `manifest.json` into a split directory, creating it if needed
    pub fn write(&self, split_dir: &Path) -> Result<()> {
        fs::create_dir_all(split_dir)?;
        let json = serde_json::to_string_pretty(self)?;
        fs::write(split_dir.join(MANIFEST_FILE), json)?;
        Ok(())
    }
}

/// Train/test splits plus the ordered label list
#[derive(Debug, Clone)]
pub struct PreparedDataset {
    pub train: DatasetSplit,
    pub test: DatasetSplit,
    /// `labels[i]` is the human-readable name of class `i`
    pub labels: Vec<String>,
}

impl PreparedDataset {
    /// Load both splits and the label list from a prepared dataset directory
    pub fn load(dataset_dir: &Path) -> Result<Self> {
        if !dataset_dir.is_dir() {
            return Err(CelestialError::Dataset(format!(
                "Missing dataset directory {}",
                dataset_dir.display()
            )));
        }

        let labels = load_labels(&dataset_dir.join(LABELS_FILE))?;
        info!("Loaded {} labels: {:?}", labels.len(), labels);

        let train = load_split(&dataset_dir.join(TRAIN_SPLIT), TRAIN_SPLIT, labels.len())?;
        let test = load_split(&dataset_dir.join(TEST_SPLIT), TEST_SPLIT, labels.len())?;

        if train.image_shape != test.image_shape {
            return Err(CelestialError::Dataset(format!(
                "train and test splits disagree on image shape: {:?} vs {:?}",
                train.image_shape, test.image_shape
            )));
        }

        Ok(Self {
            train,
            test,
            labels,
        })
    }

    /// Element shape shared by both splits
    pub fn image_shape(&self) -> [usize; 3] {
        self.train.image_shape
    }
}

/// Read `labels.json`: a non-empty JSON array of strings
pub fn load_labels(path: &Path) -> Result<Vec<String>> {
    let content =
        fs::read_to_string(path).dataset_with(|| format!("Failed to read {}", path.display()))?;
    let labels: Vec<String> = serde_json::from_str(&content)
        .dataset_with(|| format!("Malformed labels file {}", path.display()))?;

    if labels.is_empty() {
        return Err(CelestialError::Dataset(format!(
            "{} contains no labels",
            path.display()
        )));
    }

    Ok(labels)
}

/// Load one split directory, decoding every image in parallel
pub fn load_split(split_dir: &Path, name: &str, num_labels: usize) -> Result<DatasetSplit> {
    if !split_dir.is_dir() {
        return Err(CelestialError::Dataset(format!(
            "Missing {} split directory {}",
            name,
            split_dir.display()
        )));
    }

    let manifest = SplitManifest::read(split_dir)?;

    // Labels are validated before any decoding work
    if let Some(bad) = manifest.samples.iter().find(|s| s.label >= num_labels) {
        return Err(CelestialError::Dataset(format!(
            "{} split: class index {} of {} is out of range for {} labels",
            name,
            bad.label,
            bad.file.display(),
            num_labels
        )));
    }

    let total = manifest.samples.len();
    debug!("Decoding {} {} images from {}", total, name, split_dir.display());

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let loaded = AtomicUsize::new(0);
    let image_shape = manifest.image_shape;

    // collect() keeps manifest order regardless of which thread decoded what
    let items = manifest
        .samples
        .par_iter()
        .map(|sample| {
            let item = CelestialItem::from_path(&split_dir.join(&sample.file), sample.label, image_shape);
            let count = loaded.fetch_add(1, Ordering::Relaxed) + 1;
            if count % 100 == 0 || count == total {
                pb.set_position(count as u64);
            }
            item
        })
        .collect::<Result<Vec<_>>>()?;

    pb.finish_and_clear();
    info!(
        "Loaded {} split: {} examples, shape {:?}, batch size {}",
        name,
        items.len(),
        image_shape,
        manifest.batch_size
    );

    Ok(DatasetSplit::from_items(
        name,
        image_shape,
        manifest.batch_size,
        items,
    ))
}
