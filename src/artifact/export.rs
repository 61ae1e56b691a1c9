//! Artifact export and re-import
//!
//! An exported artifact is a single zip archive holding the files of one
//! stored version: `model.yaml`, `saved_model.mpk`, and optionally
//! `optimizer.mpk`.

use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use burn::{module::Module, record::Recorder, tensor::backend::Backend};
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::store::{
    ArtifactManifest, ArtifactRecorder, ArtifactStore, ArtifactTag, MODEL_MANIFEST_FILE,
    MODEL_RECORD_FILE,
};
use crate::model::CelestialClassifier;
use crate::training::TrainingHistory;
use crate::utils::error::{CelestialError, Result, ResultExt};

/// Write a stored model to `dest` as a single archive
///
/// `tag` is `name:version` or `name:latest`. Parent directories of `dest` are
/// created. Returns the concrete tag that was exported.
pub fn export_model(store: &ArtifactStore, tag: &str, dest: &Path) -> Result<ArtifactTag> {
    let tag = store.resolve(&tag.parse()?)?;
    let source = store.version_dir(&tag);

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .packaging(&format!("Failed to create {}", parent.display()))?;
    }

    let file = File::create(dest).packaging(&format!("Failed to create {}", dest.display()))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut entries: Vec<PathBuf> = fs::read_dir(&source)
        .packaging(&format!("Failed to read {}", source.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    entries.sort();

    for path in &entries {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let bytes = fs::read(path).packaging(&format!("Failed to read {}", path.display()))?;

        zip.start_file(name.as_str(), options)
            .packaging("Failed to add archive entry")?;
        zip.write_all(&bytes)
            .packaging("Failed to write archive entry")?;
    }

    zip.finish().packaging("Failed to finalize archive")?;

    info!("Exported {} to {}", tag, dest.display());
    Ok(tag)
}

fn open_archive(exported: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(exported).map_err(|e| match e.kind() {
        ErrorKind::NotFound => CelestialError::PathNotFound(exported.to_path_buf()),
        _ => CelestialError::Io(e),
    })?;
    ZipArchive::new(file).packaging(&format!("Invalid artifact {}", exported.display()))
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Result<Vec<u8>> {
    let mut entry = archive
        .by_name(name)
        .packaging(&format!("Artifact has no {}", name))?;
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Read the manifest of an exported artifact
pub fn read_manifest(exported: &Path) -> Result<ArtifactManifest> {
    let mut archive = open_archive(exported)?;
    let bytes = read_entry(&mut archive, MODEL_MANIFEST_FILE)?;
    Ok(serde_yaml::from_slice(&bytes)?)
}

/// Rebuild the trained classifier from an exported artifact
pub fn load_model<B: Backend>(
    exported: &Path,
    device: &B::Device,
) -> Result<(CelestialClassifier<B>, ArtifactManifest)> {
    let mut archive = open_archive(exported)?;
    let manifest: ArtifactManifest =
        serde_yaml::from_slice(&read_entry(&mut archive, MODEL_MANIFEST_FILE)?)?;
    let weights = read_entry(&mut archive, MODEL_RECORD_FILE)?;

    let recorder = ArtifactRecorder::default();
    let record: <CelestialClassifier<B> as Module<B>>::Record =
        Recorder::<B>::load(&recorder, weights, device)
            .packaging("Failed to decode model weights")?;

    let model = manifest.architecture.init::<B>(device)?.load_record(record);
    Ok((model, manifest))
}

/// Write the training history as `.npy`, creating parent directories
pub fn save_history(history: &TrainingHistory, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .packaging(&format!("Failed to create {}", parent.display()))?;
    }
    let bytes = history.to_npy_bytes()?;
    fs::write(path, bytes).packaging(&format!("Failed to write {}", path.display()))
}
