//! Artifact packaging
//!
//! This module provides:
//! - A local, versioned model store with a `latest` pointer per model name
//! - Export of a stored version to a single archive file
//! - Re-import of exported archives for serving and verification
//! - The `.npy` training history writer

pub mod export;
pub mod store;

// Re-export main types for convenience
pub use export::{export_model, load_model, read_manifest, save_history};
pub use store::{
    ArtifactManifest, ArtifactStore, ArtifactTag, SaveOptions, MODEL_STORE_ENV,
};
