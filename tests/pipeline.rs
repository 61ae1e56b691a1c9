//! End-to-end training run on a tiny synthetic dataset

use std::fs;
use std::path::{Path, PathBuf};

use burn::backend::Autodiff;
use burn_ndarray::NdArray;
use image::{Rgb, RgbImage};
use tempfile::TempDir;

use celestial_bodies::artifact::{load_model, read_manifest, ArtifactStore, ArtifactTag};
use celestial_bodies::config::{parse_params, TrainConfig};
use celestial_bodies::dataset::{SampleEntry, SplitManifest, LABELS_FILE, TEST_SPLIT, TRAIN_SPLIT};
use celestial_bodies::{CelestialError, ARTIFACT_FILE, HISTORY_FILE, MODEL_NAME};

type Backend = Autodiff<NdArray>;

const PARAMS: &str = r#"
prepare:
  seed: 77
  split: 0.2
  image_size: [64, 64]
  grayscale: false
train:
  seed: 77
  lr: 0.001
  epochs: 1
  conv_size: 4
  dense_size: 8
  output_classes: 2
"#;

/// Stars are bright, planets are dark
fn write_split(dir: &Path, count: usize) {
    fs::create_dir_all(dir).unwrap();
    let samples = (0..count)
        .map(|i| {
            let label = i % 2;
            let shade = if label == 0 { 230 } else { 20 };
            let file = PathBuf::from(format!("{i:03}.png"));
            RgbImage::from_pixel(64, 64, Rgb([shade, shade, shade.saturating_add(i as u8)]))
                .save(dir.join(&file))
                .unwrap();
            SampleEntry { file, label }
        })
        .collect();

    SplitManifest {
        image_shape: [64, 64, 3],
        batch_size: 4,
        samples,
    }
    .write(dir)
    .unwrap();
}

fn write_dataset(root: &Path) {
    fs::create_dir_all(root).unwrap();
    fs::write(root.join(LABELS_FILE), r#"["star", "planet"]"#).unwrap();
    write_split(&root.join(TRAIN_SPLIT), 10);
    write_split(&root.join(TEST_SPLIT), 4);
}

fn config() -> TrainConfig {
    parse_params(PARAMS).unwrap()
}

#[test]
fn test_end_to_end_run() {
    let dir = TempDir::new().unwrap();
    let dataset_dir = dir.path().join("prepared");
    let model_dir = dir.path().join("model");
    write_dataset(&dataset_dir);

    let store = ArtifactStore::new(dir.path().join("store"));
    let summary = celestial_bodies::run::<Backend>(
        &config(),
        &dataset_dir,
        &model_dir,
        &store,
        &Default::default(),
    )
    .unwrap();

    assert_eq!(summary.history.len(), 1);
    assert_eq!(summary.history.records[0].epoch, 1);
    assert!(summary.history.best_val_accuracy().is_some());
    assert_eq!(summary.artifact_path, model_dir.join(ARTIFACT_FILE));
    assert_eq!(summary.history_path, model_dir.join(HISTORY_FILE));
    assert!(fs::metadata(&summary.artifact_path).unwrap().len() > 0);
    assert!(fs::read(&summary.history_path).unwrap().starts_with(b"\x93NUMPY"));

    // The store's latest pointer is the version that was exported
    let latest = store.resolve(&ArtifactTag::latest(MODEL_NAME)).unwrap();
    assert_eq!(latest, summary.tag);

    let manifest = read_manifest(&summary.artifact_path).unwrap();
    assert_eq!(manifest.name, MODEL_NAME);
    assert!(manifest.options.include_optimizer);
    assert_eq!(manifest.custom_objects.postprocess.labels, vec!["star", "planet"]);

    // A serving process only needs the exported file
    let device = Default::default();
    let (model, manifest) = load_model::<NdArray>(&summary.artifact_path, &device).unwrap();
    let contract = manifest.custom_objects;

    let image = image::DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 120, Rgb([240, 240, 240])));
    let input = contract.preprocess.process(&image).unwrap();
    assert_eq!(input.shape, [1, 64, 64, 3]);

    let logits = model.forward(input.to_tensor::<NdArray>(&device));
    let predictions = contract.postprocess.process_batch(&logits).unwrap();
    assert_eq!(predictions.len(), 1);
    assert!(["star", "planet"].contains(&predictions[0].prediction.as_str()));
    assert!((predictions[0].probabilities.sum() - 1.0).abs() < 1e-5);
}

#[test]
fn test_dataset_shape_must_match_configuration() {
    let dir = TempDir::new().unwrap();
    let dataset_dir = dir.path().join("prepared");
    let model_dir = dir.path().join("model");
    write_dataset(&dataset_dir);

    let grayscale = TrainConfig {
        grayscale: true,
        ..config()
    };
    let store = ArtifactStore::new(dir.path().join("store"));
    let err = celestial_bodies::run::<Backend>(
        &grayscale,
        &dataset_dir,
        &model_dir,
        &store,
        &Default::default(),
    )
    .unwrap_err();

    assert!(matches!(err, CelestialError::Dataset(_)));
    assert!(!model_dir.exists());
}

#[test]
fn test_missing_dataset_folder() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path().join("store"));

    let err = celestial_bodies::run::<Backend>(
        &config(),
        &dir.path().join("nowhere"),
        &dir.path().join("model"),
        &store,
        &Default::default(),
    )
    .unwrap_err();

    assert!(matches!(err, CelestialError::Dataset(_)));
    assert!(err.to_string().contains("Missing dataset directory"));
    assert!(!dir.path().join("model").exists());
}
