//! Supervised Training Loop
//!
//! A custom loop over Burn's optimizer API rather than the high-level
//! `LearnerBuilder`: Adam on sparse categorical cross-entropy from logits,
//! one shuffled training pass and one ordered validation pass per epoch.

use burn::{
    data::dataloader::batcher::Batcher,
    data::dataset::Dataset,
    module::{AutodiffModule, Module},
    nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig},
    optim::{AdamConfig, GradientsParams, Optimizer},
    record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use super::history::{EpochRecord, TrainingHistory};
use crate::config::TrainConfig;
use crate::dataset::{CelestialBatch, CelestialBatcher, DatasetSplit};
use crate::model::CelestialClassifier;
use crate::utils::error::{CelestialError, Result};
use crate::utils::logging::TrainingLogger;

/// Adam epsilon matching the Keras default
pub const ADAM_EPSILON: f32 = 1e-7;

/// Output of a completed training run
#[derive(Debug)]
pub struct TrainedModel<B: AutodiffBackend> {
    /// Model with trained weights
    pub model: CelestialClassifier<B>,
    /// Adam state as a named MessagePack record
    pub optimizer_state: Vec<u8>,
    /// One record per epoch
    pub history: TrainingHistory,
}

/// Loss and accuracy accumulated over one pass
#[derive(Debug, Default, Clone, Copy)]
struct PassMetrics {
    loss_sum: f64,
    correct: usize,
    total: usize,
}

impl PassMetrics {
    fn add_batch(&mut self, batch_loss: f64, correct: usize, size: usize) {
        // Batch losses are means, so weight them by batch size
        self.loss_sum += batch_loss * size as f64;
        self.correct += correct;
        self.total += size;
    }

    /// Sample-weighted mean loss; NaN for an empty pass
    fn loss(&self) -> f64 {
        self.loss_sum / self.total as f64
    }

    fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

/// Train `model` for `config.epochs` epochs
///
/// # Type Parameters
/// * `B` - The autodiff backend to use (e.g., `Autodiff<NdArray>` or `Autodiff<Cuda>`)
///
/// # Arguments
/// * `model` - Freshly built classifier
/// * `config` - Learning rate, epoch count and shuffle seed
/// * `train_split` - Examples used for weight updates
/// * `test_split` - Examples evaluated after every epoch
/// * `device` - Device the batches are created on
pub fn train<B: AutodiffBackend>(
    mut model: CelestialClassifier<B>,
    config: &TrainConfig,
    train_split: &DatasetSplit,
    test_split: &DatasetSplit,
    device: &B::Device,
) -> Result<TrainedModel<B>> {
    let input_shape = model.input_shape();
    let num_classes = model.num_classes();

    // Every example is checked before the first batch
    for split in [train_split, test_split] {
        if split.image_shape != input_shape {
            return Err(CelestialError::Dataset(format!(
                "{} split has image shape {:?}, model expects {:?}",
                split.name, split.image_shape, input_shape
            )));
        }
        split.check_examples(num_classes)?;
    }

    let batcher = CelestialBatcher::new(input_shape);
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let mut optimizer = AdamConfig::new().with_epsilon(ADAM_EPSILON).init();

    let batch_size = train_split.batch_size.max(1);
    let num_batches = train_split.len().div_ceil(batch_size);

    info!(
        "Training on {} examples ({} batches of {}), validating on {}",
        train_split.len(),
        num_batches,
        batch_size,
        test_split.len()
    );
    debug!(
        "Adam: lr={}, epsilon={}, seed={}",
        config.learning_rate, ADAM_EPSILON, config.seed
    );

    let mut history = TrainingHistory::new();
    let mut logger = TrainingLogger::new(config.epochs);

    // One RNG for the whole run, so each epoch gets a different order
    let mut epoch_rng = ChaCha8Rng::seed_from_u64(config.seed);

    for epoch in 1..=config.epochs {
        logger.start_epoch(epoch);

        let mut train_metrics = PassMetrics::default();
        let indices = create_shuffled_indices(train_split, &mut epoch_rng);

        for (batch_idx, chunk) in indices.chunks(batch_size).enumerate() {
            let items: Vec<_> = chunk.iter().filter_map(|&i| train_split.get(i)).collect();
            if items.is_empty() {
                continue;
            }

            let batch: CelestialBatch<B> = batcher.batch(items, device);
            let size = batch.targets.dims()[0];

            let output = model.forward(batch.images);
            let loss = loss_fn.forward(output.clone(), batch.targets.clone());

            let loss_value: f64 = loss.clone().into_scalar().elem();
            let correct = count_correct(output, batch.targets);
            train_metrics.add_batch(loss_value, correct, size);

            // Backward pass and update
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optimizer.step(config.learning_rate, model, grads);

            debug!(
                "  batch {:>4}/{}: loss = {:.4}, running acc = {:.4}",
                batch_idx + 1,
                num_batches,
                loss_value,
                train_metrics.accuracy()
            );
        }

        let val_metrics = evaluate(&model.valid(), test_split, &batcher);

        let record = EpochRecord {
            epoch,
            loss: train_metrics.loss(),
            accuracy: train_metrics.accuracy(),
            val_loss: val_metrics.loss(),
            val_accuracy: val_metrics.accuracy(),
        };
        logger.end_epoch(
            record.loss,
            record.accuracy,
            record.val_loss,
            record.val_accuracy,
        );
        history.push(record);
    }

    logger.log_complete(history.last().map_or(0.0, |r| r.val_accuracy));

    let recorder = NamedMpkBytesRecorder::<FullPrecisionSettings>::default();
    let optimizer_state = Recorder::<B>::record(&recorder, optimizer.to_record(), ())
        .map_err(|e| {
            CelestialError::Serialization(format!("Failed to record optimizer state: {}", e))
        })?;

    Ok(TrainedModel {
        model,
        optimizer_state,
        history,
    })
}

/// Shuffled example indices for one epoch
fn create_shuffled_indices(split: &DatasetSplit, rng: &mut ChaCha8Rng) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..split.len()).collect();
    indices.shuffle(rng);
    indices
}

/// Number of rows whose argmax equals the target
fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let predictions: Tensor<B, 1, Int> = logits.argmax(1).flatten(0, 1);
    let correct: i64 = predictions
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem();
    correct as usize
}

/// Evaluate over a split in file order without updating weights
fn evaluate<B: Backend>(
    model: &CelestialClassifier<B>,
    split: &DatasetSplit,
    batcher: &CelestialBatcher,
) -> PassMetrics {
    let mut metrics = PassMetrics::default();
    let Some(device) = model.devices().into_iter().next() else {
        return metrics;
    };
    let loss_fn: CrossEntropyLoss<B> = CrossEntropyLossConfig::new().init(&device);

    let batch_size = split.batch_size.max(1);
    let len = split.len();

    for start in (0..len).step_by(batch_size) {
        let end = (start + batch_size).min(len);
        let items: Vec<_> = (start..end).filter_map(|i| split.get(i)).collect();
        if items.is_empty() {
            continue;
        }

        let batch: CelestialBatch<B> = batcher.batch(items, &device);
        let size = batch.targets.dims()[0];

        let output = model.forward(batch.images);
        let loss: f64 = loss_fn
            .forward(output.clone(), batch.targets.clone())
            .into_scalar()
            .elem();
        let correct = count_correct(output, batch.targets);

        metrics.add_batch(loss, correct, size);
    }

    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SEED_LOCK;
    use crate::config::ImageSize;
    use crate::dataset::CelestialItem;
    use crate::model::{build_model, CelestialClassifierConfig};
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;

    type TestBackend = Autodiff<NdArray>;

    fn config(epochs: usize) -> TrainConfig {
        TrainConfig {
            image_size: ImageSize::new(8, 8),
            grayscale: true,
            seed: 7,
            learning_rate: 0.01,
            epochs,
            conv_filters: 2,
            dense_units: 4,
            output_classes: 2,
        }
    }

    /// Bright images are class 1, dark images class 0
    fn split(name: &str, n: usize) -> DatasetSplit {
        let items = (0..n)
            .map(|i| {
                let label = i % 2;
                let value = if label == 1 { 0.9 } else { 0.1 };
                CelestialItem::from_data(vec![value; 64], label, format!("{name}-{i}"))
            })
            .collect();
        DatasetSplit::from_items(name, [8, 8, 1], 3, items)
    }

    fn run(config: &TrainConfig, train_split: &DatasetSplit) -> TrainedModel<TestBackend> {
        let _guard = SEED_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let device = Default::default();
        let model = build_model::<TestBackend>(
            &CelestialClassifierConfig::from_train_config(config),
            config.seed,
            &device,
        )
        .unwrap();
        train(model, config, train_split, &split("test", 4), &device).unwrap()
    }

    #[test]
    fn test_history_has_one_record_per_epoch() {
        let trained = run(&config(3), &split("train", 10));

        assert_eq!(trained.history.len(), 3);
        let epochs: Vec<usize> = trained.history.records.iter().map(|r| r.epoch).collect();
        assert_eq!(epochs, vec![1, 2, 3]);

        for record in &trained.history.records {
            assert!(record.loss.is_finite());
            assert!((0.0..=1.0).contains(&record.accuracy));
            assert!((0.0..=1.0).contains(&record.val_accuracy));
        }
        assert!(!trained.optimizer_state.is_empty());
    }

    #[test]
    fn test_same_seed_same_history() {
        let a = run(&config(2), &split("train", 10));
        let b = run(&config(2), &split("train", 10));

        for (ra, rb) in a.history.records.iter().zip(&b.history.records) {
            assert!((ra.loss - rb.loss).abs() < 1e-5);
            assert!((ra.val_loss - rb.val_loss).abs() < 1e-5);
            assert_eq!(ra.accuracy, rb.accuracy);
        }
    }

    #[test]
    fn test_label_out_of_range_fails_before_training() {
        let mut train_split = split("train", 4);
        train_split.items[2].label = 5;

        let _guard = SEED_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let device = Default::default();
        let config = config(1);
        let model = build_model::<TestBackend>(
            &CelestialClassifierConfig::from_train_config(&config),
            config.seed,
            &device,
        )
        .unwrap();

        let err = train(model, &config, &train_split, &split("test", 2), &device).unwrap_err();
        assert!(matches!(err, CelestialError::Dataset(_)));
    }

    #[test]
    fn test_empty_validation_split_gives_nan_loss() {
        let _guard = SEED_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let device = Default::default();
        let config = config(1);
        let model = build_model::<TestBackend>(
            &CelestialClassifierConfig::from_train_config(&config),
            config.seed,
            &device,
        )
        .unwrap();

        let empty = DatasetSplit::from_items("test", [8, 8, 1], 3, Vec::new());
        let trained = train(model, &config, &split("train", 4), &empty, &device).unwrap();

        let record = trained.history.last().unwrap();
        assert!(record.val_loss.is_nan());
        assert_eq!(record.val_accuracy, 0.0);
    }

    #[test]
    fn test_pass_metrics_weight_by_batch_size() {
        let mut metrics = PassMetrics::default();
        metrics.add_batch(1.0, 3, 3);
        metrics.add_batch(4.0, 0, 1);
        assert_eq!(metrics.loss(), 7.0 / 4.0);
        assert_eq!(metrics.accuracy(), 0.75);
    }
}
