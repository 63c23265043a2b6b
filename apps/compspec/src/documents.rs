//! # Document Loading
//!
//! Reading the YAML/JSON documents the commands take as input, plus the path
//! checks shared by every command that touches the filesystem.

use compspec_core::primitives::MAX_DOCUMENT_SIZE;
use compspec_core::{CompatibilityArtifact, CompspecError, Manifest};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

// =============================================================================
// PATH VALIDATION
// =============================================================================

/// Validate file size before reading.
pub fn validate_file_size(path: &Path, max_size: u64) -> Result<(), CompspecError> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        CompspecError::Io(format!(
            "Cannot read file metadata for {}: {}",
            path.display(),
            e
        ))
    })?;

    if metadata.len() > max_size {
        return Err(CompspecError::Deserialization(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve `path` to an existing regular file.
pub fn validate_file_path(path: &Path) -> Result<PathBuf, CompspecError> {
    let canonical = path.canonicalize().map_err(|e| {
        CompspecError::Io(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(CompspecError::Io(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Resolve an output path whose parent directory must already exist.
pub fn validate_output_path(path: &Path) -> Result<PathBuf, CompspecError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        CompspecError::Io(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(CompspecError::Io(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| CompspecError::Io("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

// =============================================================================
// DOCUMENTS
// =============================================================================

/// Read and decode a YAML (or JSON) document.
pub fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, CompspecError> {
    let path = validate_file_path(path)?;
    validate_file_size(&path, MAX_DOCUMENT_SIZE)?;
    let bytes = std::fs::read(&path)?;
    serde_yaml::from_slice(&bytes).map_err(|e| {
        CompspecError::Deserialization(format!("{}: {}", path.display(), e))
    })
}

/// Load an image manifest (`images: [{name, artifact}]`).
pub fn load_manifest(path: &Path) -> Result<Manifest, CompspecError> {
    let manifest: Manifest = load_yaml(path)?;
    for pair in &manifest.images {
        if pair.name.trim().is_empty() || pair.artifact.trim().is_empty() {
            return Err(CompspecError::Config(format!(
                "manifest {} has an image without a name or artifact",
                path.display()
            )));
        }
    }
    Ok(manifest)
}

/// Load a compatibility request: an artifact whose attribute values are
/// extractor field references.
pub fn load_request(path: &Path) -> Result<CompatibilityArtifact, CompspecError> {
    load_yaml(path)
}

/// Serialize `value` as pretty JSON to `path`, or to stdout when `path` is `None`.
pub fn write_json<T: serde::Serialize>(
    value: &T,
    path: Option<&Path>,
) -> Result<(), CompspecError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CompspecError::Serialization(e.to_string()))?;

    match path {
        Some(path) => {
            let path = validate_output_path(path)?;
            std::fs::write(&path, format!("{}\n", text))?;
            tracing::info!("Wrote {}", path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_from_yaml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("manifest.yaml");
        std::fs::write(
            &path,
            "images:\n  - name: ghcr.io/rse-ops/lammps:intel\n    artifact: ghcr.io/rse-ops/lammps:intel-compspec\n",
        )
        .expect("write");

        let manifest = load_manifest(&path).expect("load");
        assert_eq!(manifest.images.len(), 1);
        assert_eq!(manifest.images[0].artifact, "ghcr.io/rse-ops/lammps:intel-compspec");
    }

    #[test]
    fn manifest_entry_without_artifact_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("manifest.yaml");
        std::fs::write(&path, "images:\n  - name: app\n    artifact: \"\"\n").expect("write");
        assert!(load_manifest(&path).is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_manifest(Path::new("/definitely/not/here.yaml")).expect_err("missing");
        assert!(matches!(err, CompspecError::Io(_)));
    }

    #[test]
    fn output_path_needs_existing_parent() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(validate_output_path(&dir.path().join("out.yaml")).is_ok());
        assert!(validate_output_path(&dir.path().join("nope/out.yaml")).is_err());
    }
}
