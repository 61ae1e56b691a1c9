//! Post-processing half of the inference contract
//!
//! Maps a logits vector to a label and a probability per label.

use std::fmt;

use burn::prelude::*;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::utils::error::{CelestialError, Result};

/// Label -> probability pairs in label order
///
/// Serialized as a map whose key order follows the label list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Probabilities(Vec<(String, f32)>);

impl Probabilities {
    /// Probability assigned to `label`, if it is known
    pub fn get(&self, label: &str) -> Option<f32> {
        self.0.iter().find(|(l, _)| l == label).map(|(_, p)| *p)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.0.iter().map(|(l, p)| (l.as_str(), *p))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn sum(&self) -> f32 {
        self.0.iter().map(|(_, p)| p).sum()
    }
}

impl Serialize for Probabilities {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, p) in &self.0 {
            map.serialize_entry(label, p)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Probabilities {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = Probabilities;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of label to probability")
            }

            fn visit_map<A>(self, mut access: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((label, p)) = access.next_entry::<String, f32>()? {
                    entries.push((label, p));
                }
                Ok(Probabilities(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

/// Result of post-processing one logits vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Label with the highest probability
    pub prediction: String,
    pub probabilities: Probabilities,
}

impl Prediction {
    /// Probability of the predicted label
    pub fn confidence(&self) -> f32 {
        self.probabilities.get(&self.prediction).unwrap_or(0.0)
    }
}

/// Softmax and label lookup over model logits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Postprocessor {
    /// `labels[i]` names logit `i`
    pub labels: Vec<String>,
}

impl Postprocessor {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// Turn one logits vector into a [`Prediction`]
    pub fn process(&self, logits: &[f32]) -> Result<Prediction> {
        if logits.len() != self.labels.len() {
            return Err(CelestialError::Shape(format!(
                "Got {} logits for {} labels",
                logits.len(),
                self.labels.len()
            )));
        }
        if logits.is_empty() {
            return Err(CelestialError::Shape("Empty logits vector".to_string()));
        }

        let probs = softmax(logits);

        // First maximum wins on ties
        let mut best = 0;
        for (i, &p) in probs.iter().enumerate() {
            if p > probs[best] {
                best = i;
            }
        }

        let probabilities = Probabilities(
            self.labels
                .iter()
                .cloned()
                .zip(probs.iter().map(|&p| p as f32))
                .collect(),
        );

        Ok(Prediction {
            prediction: self.labels[best].clone(),
            probabilities,
        })
    }

    /// Post-process every row of a `[batch, num_classes]` model output
    pub fn process_batch<B: Backend>(&self, logits: &Tensor<B, 2>) -> Result<Vec<Prediction>> {
        let [_, width] = logits.dims();
        let values: Vec<f32> = logits
            .clone()
            .into_data()
            .convert::<f32>()
            .to_vec()
            .map_err(|e| CelestialError::Shape(format!("Unreadable logits tensor: {:?}", e)))?;

        if width == 0 {
            return Err(CelestialError::Shape("Empty logits rows".to_string()));
        }

        values.chunks(width).map(|row| self.process(row)).collect()
    }
}

/// Max-subtracted softmax in f64
fn softmax(logits: &[f32]) -> Vec<f64> {
    let max = logits
        .iter()
        .map(|&l| l as f64)
        .fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|&l| (l as f64 - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    fn labels() -> Vec<String> {
        ["galaxy", "moon", "planet", "star"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_scaled_one_hot_predicts_that_label() {
        let post = Postprocessor::new(labels());
        for hot in 0..4 {
            let mut logits = vec![0.0f32; 4];
            logits[hot] = 100.0;

            let prediction = post.process(&logits).unwrap();
            assert_eq!(prediction.prediction, labels()[hot]);
            assert!((prediction.probabilities.sum() - 1.0).abs() < 1e-5);
            assert!(prediction.confidence() > 0.999);
        }
    }

    #[test]
    fn test_large_logits_do_not_overflow() {
        let post = Postprocessor::new(labels());
        let prediction = post.process(&[1000.0, 999.0, -1000.0, 0.0]).unwrap();

        assert_eq!(prediction.prediction, "galaxy");
        assert!(prediction.probabilities.iter().all(|(_, p)| p.is_finite()));
        assert!((prediction.probabilities.sum() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_ties_pick_first_label() {
        let post = Postprocessor::new(labels());
        let prediction = post.process(&[0.5, 2.0, 2.0, 0.5]).unwrap();
        assert_eq!(prediction.prediction, "moon");
    }

    #[test]
    fn test_length_mismatch_is_shape_error() {
        let post = Postprocessor::new(labels()[..3].to_vec());
        let err = post.process(&[0.0, 1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, CelestialError::Shape(_)));
    }

    #[test]
    fn test_probabilities_serialize_in_label_order() {
        let post = Postprocessor::new(vec!["star".to_string(), "planet".to_string()]);
        let prediction = post.process(&[0.0, 0.0]).unwrap();

        let json = serde_json::to_string(&prediction).unwrap();
        assert_eq!(
            json,
            r#"{"prediction":"star","probabilities":{"star":0.5,"planet":0.5}}"#
        );

        let back: Prediction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, prediction);
    }

    #[test]
    fn test_process_batch_rows() {
        let post = Postprocessor::new(vec!["star".to_string(), "planet".to_string()]);
        let logits = Tensor::<NdArray, 2>::from_floats([[5.0, 0.0], [0.0, 5.0]], &Default::default());

        let predictions = post.process_batch(&logits).unwrap();
        let names: Vec<&str> = predictions.iter().map(|p| p.prediction.as_str()).collect();
        assert_eq!(names, vec!["star", "planet"]);
    }
}
