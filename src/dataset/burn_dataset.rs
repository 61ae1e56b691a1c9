//! Burn Dataset Integration for prepared splits
//!
//! This module implements Burn's Dataset trait and Batcher for the decoded
//! examples of a prepared split. Images are kept channel-last (`H x W x C`)
//! and already scaled to `[0, 1]`, the same layout the inference
//! pre-processing produces.

use std::path::Path;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::ImageReader;
use serde::{Deserialize, Serialize};

use crate::utils::error::{CelestialError, Result};

/// A single decoded example ready for Burn
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CelestialItem {
    /// Image data as flattened HWC float array [H * W * C]
    pub image: Vec<f32>,
    /// Class index into the label list
    pub label: usize,
    /// Image path (for debugging/logging)
    pub path: String,
}

impl CelestialItem {
    /// Decode an image file and check it matches `image_shape` (`[H, W, C]`)
    pub fn from_path(path: &Path, label: usize, image_shape: [usize; 3]) -> Result<Self> {
        let [height, width, channels] = image_shape;

        let img = ImageReader::open(path)
            .map_err(|e| {
                CelestialError::Dataset(format!("Failed to open {}: {}", path.display(), e))
            })?
            .decode()
            .map_err(|e| {
                CelestialError::Dataset(format!("Failed to decode {}: {}", path.display(), e))
            })?;

        if img.width() as usize != width || img.height() as usize != height {
            return Err(CelestialError::Dataset(format!(
                "Malformed example {}: expected {}x{} pixels, found {}x{}",
                path.display(),
                width,
                height,
                img.width(),
                img.height()
            )));
        }

        let pixels = match channels {
            1 => img.to_luma8().into_raw(),
            3 => img.to_rgb8().into_raw(),
            other => {
                return Err(CelestialError::Dataset(format!(
                    "Unsupported channel count {} for {}",
                    other,
                    path.display()
                )))
            }
        };

        // Scale to [0, 1]; raw buffers are already row-major HWC
        let image = pixels.iter().map(|&p| p as f32 / 255.0).collect();

        Ok(Self {
            image,
            label,
            path: path.to_string_lossy().to_string(),
        })
    }

    /// Create from pre-loaded image data
    pub fn from_data(image: Vec<f32>, label: usize, path: String) -> Self {
        Self { image, label, path }
    }
}

/// One decoded split (train or test) implementing Burn's Dataset trait
#[derive(Debug, Clone)]
pub struct DatasetSplit {
    /// Split name, used in log lines
    pub name: String,
    /// Element shape `[H, W, C]`
    pub image_shape: [usize; 3],
    /// Mini-batch size chosen when the split was prepared
    pub batch_size: usize,
    /// Decoded examples in manifest order
    pub items: Vec<CelestialItem>,
}

impl DatasetSplit {
    /// Build a split from already decoded items
    pub fn from_items(
        name: impl Into<String>,
        image_shape: [usize; 3],
        batch_size: usize,
        items: Vec<CelestialItem>,
    ) -> Self {
        Self {
            name: name.into(),
            image_shape,
            batch_size,
            items,
        }
    }

    /// Get samples per class count
    pub fn class_distribution(&self, num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0usize; num_classes];
        for item in &self.items {
            if item.label < num_classes {
                counts[item.label] += 1;
            }
        }
        counts
    }

    /// Fail with a `DatasetError` on the first example whose label is out of range
    /// or whose tensor size does not match the split's element shape
    pub fn check_examples(&self, num_classes: usize) -> Result<()> {
        let expected_len: usize = self.image_shape.iter().product();

        for item in &self.items {
            if item.label >= num_classes {
                return Err(CelestialError::Dataset(format!(
                    "{} split: class index {} of {} is out of range for {} classes",
                    self.name, item.label, item.path, num_classes
                )));
            }
            if item.image.len() != expected_len {
                return Err(CelestialError::Dataset(format!(
                    "{} split: example {} has {} values, expected {} for shape {:?}",
                    self.name,
                    item.path,
                    item.image.len(),
                    expected_len,
                    self.image_shape
                )));
            }
        }

        Ok(())
    }
}

impl Dataset<CelestialItem> for DatasetSplit {
    fn get(&self, index: usize) -> Option<CelestialItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// A batch of images for training or evaluation
#[derive(Clone, Debug)]
pub struct CelestialBatch<B: Backend> {
    /// Batch of images with shape [batch_size, height, width, channels]
    pub images: Tensor<B, 4>,
    /// Batch of class indices with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher stacking decoded items into channel-last tensors
#[derive(Clone, Debug)]
pub struct CelestialBatcher {
    image_shape: [usize; 3],
}

impl CelestialBatcher {
    /// Create a batcher for items of shape `[H, W, C]`
    pub fn new(image_shape: [usize; 3]) -> Self {
        Self { image_shape }
    }
}

impl<B: Backend> Batcher<B, CelestialItem, CelestialBatch<B>> for CelestialBatcher {
    fn batch(&self, items: Vec<CelestialItem>, device: &B::Device) -> CelestialBatch<B> {
        let batch_size = items.len();
        let [height, width, channels] = self.image_shape;

        // Flatten all images into a single vector
        let images_data: Vec<f32> = items
            .iter()
            .flat_map(|item| item.image.iter().copied())
            .collect();

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, height, width, channels]),
            device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        CelestialBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use tempfile::TempDir;

    type TestBackend = NdArray;

    #[test]
    fn test_from_path_scales_rgb_to_unit_range() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("star.png");
        RgbImage::from_pixel(4, 2, Rgb([255, 0, 51])).save(&path).unwrap();

        let item = CelestialItem::from_path(&path, 1, [2, 4, 3]).unwrap();
        assert_eq!(item.label, 1);
        assert_eq!(item.image.len(), 2 * 4 * 3);
        assert_eq!(&item.image[..3], &[1.0, 0.0, 0.2]);
    }

    #[test]
    fn test_from_path_grayscale() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("planet.png");
        GrayImage::from_pixel(3, 3, Luma([0])).save(&path).unwrap();

        let item = CelestialItem::from_path(&path, 0, [3, 3, 1]).unwrap();
        assert_eq!(item.image, vec![0.0; 9]);
    }

    #[test]
    fn test_from_path_rejects_wrong_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("moon.png");
        RgbImage::new(8, 8).save(&path).unwrap();

        let err = CelestialItem::from_path(&path, 0, [4, 4, 3]).unwrap_err();
        assert!(matches!(err, CelestialError::Dataset(_)));
    }

    #[test]
    fn test_check_examples_label_out_of_range() {
        let items = vec![
            CelestialItem::from_data(vec![0.0; 4], 0, "a".into()),
            CelestialItem::from_data(vec![0.0; 4], 2, "b".into()),
        ];
        let split = DatasetSplit::from_items("train", [2, 2, 1], 2, items);

        assert!(split.check_examples(3).is_ok());
        let err = split.check_examples(2).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_class_distribution() {
        let items = (0..5)
            .map(|i| CelestialItem::from_data(vec![0.0], i % 2, format!("{i}")))
            .collect();
        let split = DatasetSplit::from_items("test", [1, 1, 1], 2, items);
        assert_eq!(split.class_distribution(2), vec![3, 2]);
        assert_eq!(split.len(), 5);
    }

    #[test]
    fn test_batcher_shapes() {
        let items = vec![
            CelestialItem::from_data(vec![0.5; 2 * 3 * 3], 1, "a".into()),
            CelestialItem::from_data(vec![0.25; 2 * 3 * 3], 0, "b".into()),
        ];
        let batcher = CelestialBatcher::new([2, 3, 3]);
        let batch: CelestialBatch<TestBackend> = batcher.batch(items, &Default::default());

        assert_eq!(batch.images.dims(), [2, 2, 3, 3]);
        assert_eq!(batch.targets.dims(), [2]);
        let targets: Vec<i64> = batch.targets.into_data().to_vec().unwrap();
        assert_eq!(targets, vec![1, 0]);
    }
}
