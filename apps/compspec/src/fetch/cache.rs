//! # Artifact Cache
//!
//! One JSON file per artifact URI in a user supplied directory. Entries are
//! created once and never overwritten.
//!
//! The file name is the URI with `/` and `:` replaced by `-`, plus `.json`:
//! `ghcr.io/rse-ops/lammps:intel-compspec` is stored as
//! `ghcr.io-rse-ops-lammps-intel-compspec.json`.

use crate::documents::validate_file_size;
use compspec_core::primitives::MAX_DOCUMENT_SIZE;
use compspec_core::{CompatibilityArtifact, CompspecError};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Directory of cached artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    dir: PathBuf,
}

impl ArtifactCache {
    /// Use `dir` as the cache. The directory must already exist.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CompspecError> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(CompspecError::CacheDirMissing(dir.display().to_string()));
        }
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache file name for an artifact URI.
    #[must_use]
    pub fn filename(uri: &str) -> String {
        format!("{}.json", uri.replace(['/', ':'], "-"))
    }

    #[must_use]
    pub fn path_for(&self, uri: &str) -> PathBuf {
        self.dir.join(Self::filename(uri))
    }

    /// Read the cached artifact for `uri`.
    ///
    /// A missing file, or an entry without a `kind`, is a miss.
    pub fn load(&self, uri: &str) -> Result<Option<CompatibilityArtifact>, CompspecError> {
        let path = self.path_for(uri);
        if !path.is_file() {
            return Ok(None);
        }

        validate_file_size(&path, MAX_DOCUMENT_SIZE)?;
        let bytes = std::fs::read(&path)?;
        let artifact: CompatibilityArtifact = serde_json::from_slice(&bytes).map_err(|e| {
            CompspecError::Deserialization(format!("{}: {}", path.display(), e))
        })?;

        if artifact.kind.is_empty() {
            return Ok(None);
        }
        Ok(Some(artifact))
    }

    /// Write `artifact` for `uri` unless an entry exists.
    ///
    /// Returns whether this call created the entry.
    pub fn store(&self, uri: &str, artifact: &CompatibilityArtifact) -> Result<bool, CompspecError> {
        let path = self.path_for(uri);
        if path.exists() {
            return Ok(false);
        }

        let bytes = serde_json::to_vec_pretty(artifact)
            .map_err(|e| CompspecError::Serialization(e.to_string()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;

        match tmp.persist_noclobber(&path) {
            Ok(_) => Ok(true),
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(CompspecError::Io(format!(
                "Cannot write cache entry {}: {}",
                path.display(),
                e.error
            ))),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
