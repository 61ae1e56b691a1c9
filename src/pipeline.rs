//! End-to-end training run
//!
//! Loads the prepared dataset, builds and trains the classifier, registers it
//! in the model store with its inference contract, then exports the artifact
//! and the training history into the model folder.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use burn::{module::AutodiffModule, module::Module, tensor::backend::AutodiffBackend};
use tracing::{debug, info, warn};

use crate::artifact::{export_model, save_history, ArtifactStore, ArtifactTag};
use crate::config::TrainConfig;
use crate::dataset::PreparedDataset;
use crate::inference::InferenceContract;
use crate::model::{build_model, CelestialClassifierConfig};
use crate::training::{train, TrainingHistory};
use crate::utils::error::{CelestialError, Result, ResultExt};
use crate::{ARTIFACT_FILE, HISTORY_FILE, MODEL_NAME};

/// Lifecycle of a single run; stages only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunStage {
    Configured,
    Built,
    Training,
    Trained,
    Packaged,
    Exported,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStage::Configured => "configured",
            RunStage::Built => "built",
            RunStage::Training => "training",
            RunStage::Trained => "trained",
            RunStage::Packaged => "packaged",
            RunStage::Exported => "exported",
        };
        f.write_str(name)
    }
}

/// Current stage plus transition logging
#[derive(Debug)]
struct StageTracker {
    stage: RunStage,
}

impl StageTracker {
    fn new() -> Self {
        info!("Run stage: {}", RunStage::Configured);
        Self {
            stage: RunStage::Configured,
        }
    }

    fn advance(&mut self, next: RunStage) {
        debug_assert!(next > self.stage, "stage {} after {}", next, self.stage);
        info!("Run stage: {} -> {}", self.stage, next);
        self.stage = next;
    }
}

/// What a successful run produced
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Store tag the model was registered under
    pub tag: ArtifactTag,
    /// Exported archive inside the model folder
    pub artifact_path: PathBuf,
    /// `history.npy` inside the model folder
    pub history_path: PathBuf,
    pub history: TrainingHistory,
    /// Trainable parameters of the model
    pub num_params: usize,
    /// Wall-clock duration of the whole run
    pub elapsed: Duration,
}

/// Run the whole pipeline for one configuration
///
/// # Type Parameters
/// * `B` - The autodiff backend to train on
///
/// # Arguments
/// * `config` - Validated training configuration
/// * `dataset_dir` - Output folder of the dataset preparation stage
/// * `model_dir` - Folder receiving the exported artifact and history
/// * `store` - Model store the trained model is registered in
/// * `device` - Device to train on
pub fn run<B: AutodiffBackend>(
    config: &TrainConfig,
    dataset_dir: &Path,
    model_dir: &Path,
    store: &ArtifactStore,
    device: &B::Device,
) -> Result<RunSummary> {
    let start = Instant::now();
    let mut stage = StageTracker::new();
    debug!("Configuration: {:?}", config);

    let dataset = PreparedDataset::load(dataset_dir)?;
    if dataset.image_shape() != config.image_shape() {
        return Err(CelestialError::Dataset(format!(
            "Dataset images have shape {:?} but the configuration expects {:?} \
             (image_size {}, grayscale {})",
            dataset.image_shape(),
            config.image_shape(),
            config.image_size,
            config.grayscale
        )));
    }
    if dataset.labels.len() != config.output_classes {
        warn!(
            "{} labels but output_classes is {}",
            dataset.labels.len(),
            config.output_classes
        );
    }
    debug!(
        "Train class distribution: {:?}",
        dataset.train.class_distribution(dataset.labels.len())
    );

    let architecture = CelestialClassifierConfig::from_train_config(config);
    let model = build_model::<B>(&architecture, config.seed, device)?;
    let num_params = model.num_params();
    info!("Model summary:\n{}", architecture.summary()?);
    stage.advance(RunStage::Built);

    stage.advance(RunStage::Training);
    let trained = train(model, config, &dataset.train, &dataset.test, device)?;
    stage.advance(RunStage::Trained);

    fs::create_dir_all(model_dir)
        .packaging(&format!("Failed to create {}", model_dir.display()))?;

    let contract = InferenceContract::new(config, dataset.labels.clone());
    let tag = store.save_model(
        MODEL_NAME,
        &trained.model.valid(),
        &architecture,
        Some(&trained.optimizer_state),
        &contract,
    )?;
    stage.advance(RunStage::Packaged);

    let artifact_path = model_dir.join(ARTIFACT_FILE);
    export_model(
        store,
        &ArtifactTag::latest(MODEL_NAME).to_string(),
        &artifact_path,
    )?;
    stage.advance(RunStage::Exported);

    let history_path = model_dir.join(HISTORY_FILE);
    save_history(&trained.history, &history_path)?;
    info!("History written to {}", history_path.display());

    Ok(RunSummary {
        tag,
        artifact_path,
        history_path,
        history: trained.history,
        num_params,
        elapsed: start.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stages_are_ordered() {
        let stages = [
            RunStage::Configured,
            RunStage::Built,
            RunStage::Training,
            RunStage::Trained,
            RunStage::Packaged,
            RunStage::Exported,
        ];
        assert!(stages.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(RunStage::Packaged.to_string(), "packaged");
    }

    #[test]
    fn test_tracker_advances() {
        let mut tracker = StageTracker::new();
        tracker.advance(RunStage::Built);
        tracker.advance(RunStage::Training);
        assert_eq!(tracker.stage, RunStage::Training);
    }
}
