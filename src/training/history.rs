//! Per-epoch training history
//!
//! The history is persisted as a NumPy `.npy` file holding a structured array,
//! one record per epoch, so it can be opened with `numpy.load` directly.

use serde::{Deserialize, Serialize};

use crate::utils::error::{CelestialError, Result};

const NPY_MAGIC: &[u8] = b"\x93NUMPY";
const NPY_ALIGN: usize = 64;

/// Structured dtype of one history row: `(field, numpy type)`
const NPY_FIELDS: [(&str, &str); 5] = [
    ("epoch", "<i8"),
    ("loss", "<f8"),
    ("sparse_categorical_accuracy", "<f8"),
    ("val_loss", "<f8"),
    ("val_sparse_categorical_accuracy", "<f8"),
];

/// Metrics of a single epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// 1-based epoch index
    pub epoch: usize,
    /// Sample-weighted mean training loss
    pub loss: f64,
    /// Training accuracy in `[0, 1]`
    pub accuracy: f64,
    /// Mean validation loss
    pub val_loss: f64,
    /// Validation accuracy in `[0, 1]`
    pub val_accuracy: f64,
}

/// Ordered sequence of epoch records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub records: Vec<EpochRecord>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: EpochRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Metrics of the final epoch
    pub fn last(&self) -> Option<&EpochRecord> {
        self.records.last()
    }

    /// Highest validation accuracy seen, ignoring NaN
    pub fn best_val_accuracy(&self) -> Option<f64> {
        self.records
            .iter()
            .map(|r| r.val_accuracy)
            .filter(|a| !a.is_nan())
            .fold(None, |best, a| Some(best.map_or(a, |b: f64| b.max(a))))
    }

    /// Encode as a NumPy v1.0 `.npy` structured array
    pub fn to_npy_bytes(&self) -> Result<Vec<u8>> {
        let descr = NPY_FIELDS
            .iter()
            .map(|(name, ty)| format!("('{}', '{}')", name, ty))
            .collect::<Vec<_>>()
            .join(", ");
        let dict = format!(
            "{{'descr': [{}], 'fortran_order': False, 'shape': ({},), }}",
            descr,
            self.records.len()
        );

        // magic + version + header length, then the dict padded so the data
        // section starts on a 64-byte boundary; the header ends with '\n'
        let preamble = NPY_MAGIC.len() + 2 + 2;
        let unpadded = preamble + dict.len() + 1;
        let padding = (NPY_ALIGN - unpadded % NPY_ALIGN) % NPY_ALIGN;
        let header_len = dict.len() + padding + 1;

        let header_len = u16::try_from(header_len).map_err(|_| {
            CelestialError::Serialization(format!("npy header too long: {} bytes", header_len))
        })?;

        let row_size = 8 * NPY_FIELDS.len();
        let mut out =
            Vec::with_capacity(preamble + header_len as usize + row_size * self.records.len());
        out.extend_from_slice(NPY_MAGIC);
        out.extend_from_slice(&[1, 0]);
        out.extend_from_slice(&header_len.to_le_bytes());
        out.extend_from_slice(dict.as_bytes());
        out.extend(std::iter::repeat(b' ').take(padding));
        out.push(b'\n');

        for record in &self.records {
            out.extend_from_slice(&(record.epoch as i64).to_le_bytes());
            for value in [
                record.loss,
                record.accuracy,
                record.val_loss,
                record.val_accuracy,
            ] {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }

        Ok(out)
    }
}
