//! Local Model Store
//!
//! Versioned, directory-backed registry of trained models:
//!
//! ```text
//! <root>/
//!   <name>/
//!     latest                 version string of the newest save
//!     <version>/
//!       model.yaml           manifest (architecture, contract, options)
//!       saved_model.mpk      model weights, named MessagePack, full precision
//!       optimizer.mpk        Adam state (when included)
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder},
    tensor::backend::Backend,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::inference::InferenceContract;
use crate::model::{CelestialClassifier, CelestialClassifierConfig};
use crate::utils::error::{CelestialError, Result, ResultExt};

/// Environment variable overriding the store root
pub const MODEL_STORE_ENV: &str = "CELESTIAL_MODEL_STORE";

/// Manifest file inside a version directory
pub const MODEL_MANIFEST_FILE: &str = "model.yaml";

/// Model weights inside a version directory
pub const MODEL_RECORD_FILE: &str = "saved_model.mpk";

/// Optimizer state inside a version directory
pub const OPTIMIZER_RECORD_FILE: &str = "optimizer.mpk";

/// Tag version that resolves through the `latest` pointer
pub const LATEST: &str = "latest";

const VERSION_LEN: usize = 16;

/// Recorder used for every record in the store
pub type ArtifactRecorder = NamedMpkBytesRecorder<FullPrecisionSettings>;

/// `name:version` reference to a stored model
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactTag {
    pub name: String,
    pub version: String,
}

impl ArtifactTag {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// `name:latest`
    pub fn latest(name: impl Into<String>) -> Self {
        Self::new(name, LATEST)
    }

    pub fn is_latest(&self) -> bool {
        self.version == LATEST
    }
}

impl fmt::Display for ArtifactTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

impl FromStr for ArtifactTag {
    type Err = CelestialError;

    /// Parse `name` or `name:version`; a bare name means `name:latest`
    fn from_str(s: &str) -> Result<Self> {
        let (name, version) = match s.split_once(':') {
            Some((name, version)) => (name, version),
            None => (s, LATEST),
        };
        validate_component("model name", name)?;
        validate_component("model version", version)?;
        Ok(Self::new(name, version))
    }
}

/// Save options recorded in the manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveOptions {
    pub include_optimizer: bool,
}

/// Contents of `model.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub name: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
    /// Enough to rebuild the untrained network before loading weights
    pub architecture: CelestialClassifierConfig,
    pub options: SaveOptions,
    /// Pre- and post-processing transforms served with the model
    pub custom_objects: InferenceContract,
}

impl ArtifactManifest {
    pub fn tag(&self) -> ArtifactTag {
        ArtifactTag::new(&self.name, &self.version)
    }
}

/// Directory-backed model store
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Store rooted at `root`; nothing is created until the first save
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store rooted at `$CELESTIAL_MODEL_STORE`, or `~/.celestial/models`
    pub fn from_env() -> Result<Self> {
        if let Some(root) = std::env::var_os(MODEL_STORE_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::new(root));
        }

        let base = directories::BaseDirs::new().ok_or_else(|| {
            CelestialError::Packaging(format!(
                "No home directory found; set {} to choose a model store",
                MODEL_STORE_ENV
            ))
        })?;
        Ok(Self::new(base.home_dir().join(".celestial").join("models")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of one concrete version
    pub fn version_dir(&self, tag: &ArtifactTag) -> PathBuf {
        self.root.join(&tag.name).join(&tag.version)
    }

    fn latest_file(&self, name: &str) -> PathBuf {
        self.root.join(name).join(LATEST)
    }

    /// Register a trained model under a fresh version and make it `latest`
    ///
    /// The optimizer state is stored only when given. Concurrent saves of the
    /// same name race on the `latest` pointer; the last writer wins.
    pub fn save_model<B: Backend>(
        &self,
        name: &str,
        model: &CelestialClassifier<B>,
        architecture: &CelestialClassifierConfig,
        optimizer_state: Option<&[u8]>,
        contract: &InferenceContract,
    ) -> Result<ArtifactTag> {
        validate_component("model name", name)?;

        let version: String = Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(VERSION_LEN)
            .collect();
        let tag = ArtifactTag::new(name, version);
        let dir = self.version_dir(&tag);

        fs::create_dir_all(&dir)
            .packaging(&format!("Failed to create {}", dir.display()))?;
        debug!("Saving {} to {}", tag, dir.display());

        let recorder = ArtifactRecorder::default();
        let weights = Recorder::<B>::record(&recorder, model.clone().into_record(), ())
            .packaging("Failed to record model weights")?;
        fs::write(dir.join(MODEL_RECORD_FILE), weights)
            .packaging("Failed to write model weights")?;

        if let Some(state) = optimizer_state {
            fs::write(dir.join(OPTIMIZER_RECORD_FILE), state)
                .packaging("Failed to write optimizer state")?;
        }

        let manifest = ArtifactManifest {
            name: tag.name.clone(),
            version: tag.version.clone(),
            created_at: Utc::now(),
            architecture: architecture.clone(),
            options: SaveOptions {
                include_optimizer: optimizer_state.is_some(),
            },
            custom_objects: contract.clone(),
        };
        let yaml = serde_yaml::to_string(&manifest).packaging("Failed to encode manifest")?;
        fs::write(dir.join(MODEL_MANIFEST_FILE), yaml)
            .packaging("Failed to write manifest")?;

        fs::write(self.latest_file(name), &tag.version)
            .packaging("Failed to update latest pointer")?;

        info!("Model registered as {}", tag);
        Ok(tag)
    }

    /// Replace `name:latest` with the concrete version it points to
    pub fn resolve(&self, tag: &ArtifactTag) -> Result<ArtifactTag> {
        let resolved = if tag.is_latest() {
            let pointer = self.latest_file(&tag.name);
            let version = fs::read_to_string(&pointer).map_err(|_| {
                CelestialError::Packaging(format!("No model named {} in the store", tag.name))
            })?;
            ArtifactTag::new(&tag.name, version.trim())
        } else {
            tag.clone()
        };

        if !self.version_dir(&resolved).is_dir() {
            return Err(CelestialError::Packaging(format!(
                "Model {} not found in {}",
                resolved,
                self.root.display()
            )));
        }
        Ok(resolved)
    }

    /// Read the manifest of a stored model
    pub fn read_manifest(&self, tag: &ArtifactTag) -> Result<ArtifactManifest> {
        let tag = self.resolve(tag)?;
        let path = self.version_dir(&tag).join(MODEL_MANIFEST_FILE);
        let content = fs::read_to_string(&path)
            .packaging(&format!("Failed to read {}", path.display()))?;
        Ok(serde_yaml::from_str(&content)?)
    }
}

fn validate_component(what: &str, value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && value != "."
        && value != "..";

    if valid {
        Ok(())
    } else {
        Err(CelestialError::Packaging(format!(
            "Invalid {} {:?}",
            what, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SEED_LOCK;
    use crate::config::ImageSize;
    use crate::inference::{Postprocessor, Preprocessor};
    use crate::model::build_model;
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    fn fixture() -> (CelestialClassifier<TestBackend>, CelestialClassifierConfig, InferenceContract) {
        let config = CelestialClassifierConfig::new([8, 8, 1], 2, 4, 2);
        let model = {
            let _guard = SEED_LOCK.lock().unwrap_or_else(|e| e.into_inner());
            build_model::<TestBackend>(&config, 0, &Default::default()).unwrap()
        };
        let contract = InferenceContract {
            preprocess: Preprocessor::new(ImageSize::new(8, 8), true),
            postprocess: Postprocessor::new(vec!["star".into(), "planet".into()]),
        };
        (model, config, contract)
    }

    #[test]
    fn test_tag_parsing() {
        let tag: ArtifactTag = "celestial:abc123".parse().unwrap();
        assert_eq!(tag, ArtifactTag::new("celestial", "abc123"));
        assert_eq!(tag.to_string(), "celestial:abc123");

        let latest: ArtifactTag = "celestial".parse().unwrap();
        assert!(latest.is_latest());

        assert!("../escape:latest".parse::<ArtifactTag>().is_err());
        assert!(":v1".parse::<ArtifactTag>().is_err());
    }

    #[test]
    fn test_save_writes_version_directory() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let (model, config, contract) = fixture();

        let tag = store
            .save_model("celestial", &model, &config, Some(&[1, 2, 3]), &contract)
            .unwrap();

        let version_dir = store.version_dir(&tag);
        assert!(version_dir.join(MODEL_MANIFEST_FILE).is_file());
        assert!(version_dir.join(MODEL_RECORD_FILE).is_file());
        assert_eq!(fs::read(version_dir.join(OPTIMIZER_RECORD_FILE)).unwrap(), vec![1, 2, 3]);
        assert_eq!(tag.version.len(), VERSION_LEN);

        let manifest = store.read_manifest(&tag).unwrap();
        assert_eq!(manifest.tag(), tag);
        assert!(manifest.options.include_optimizer);
        assert_eq!(manifest.custom_objects, contract);
        assert_eq!(manifest.architecture.image_shape, [8, 8, 1]);
    }

    #[test]
    fn test_latest_wins() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let (model, config, contract) = fixture();

        let first = store
            .save_model("celestial", &model, &config, None, &contract)
            .unwrap();
        let second = store
            .save_model("celestial", &model, &config, None, &contract)
            .unwrap();
        assert_ne!(first, second);

        let resolved = store.resolve(&ArtifactTag::latest("celestial")).unwrap();
        assert_eq!(resolved, second);
        assert!(store.version_dir(&first).is_dir());
        assert!(!store.read_manifest(&first).unwrap().options.include_optimizer);
    }

    #[test]
    fn test_resolve_unknown_model() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());

        let err = store.resolve(&ArtifactTag::latest("nothing")).unwrap_err();
        assert!(matches!(err, CelestialError::Packaging(_)));
    }

    #[test]
    fn test_unwritable_store_is_packaging_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "file").unwrap();

        let store = ArtifactStore::new(&blocker);
        let (model, config, contract) = fixture();
        let err = store
            .save_model("celestial", &model, &config, None, &contract)
            .unwrap_err();
        assert!(matches!(err, CelestialError::Packaging(_)));
    }
}
