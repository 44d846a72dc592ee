use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use evoke_core::errors::{BatchError, ErrorInfo};
use evoke_core::{SubjectId, Unit};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::key::{ArtifactKey, GroupKey};

fn io_error(code: &str, path: &Path, err: impl ToString) -> BatchError {
    BatchError::Io(
        ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()),
    )
}

/// Filesystem-backed artifact store rooted at the derivatives directory.
///
/// The existence of a file at a key's path is the only record that a unit of
/// work completed. Writes go to a sibling temporary file that is renamed into
/// place, so a reader never observes a partially written artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Creates a store over the provided derivatives root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Derivatives root of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Starts a key for `subject` in `derivative` under this store's root.
    pub fn key(&self, derivative: &str, subject: SubjectId) -> ArtifactKey {
        ArtifactKey::new(&self.root, derivative, subject)
    }

    /// Starts a key carrying the unit's entities under this store's root.
    pub fn unit_key(&self, derivative: &str, unit: &Unit) -> ArtifactKey {
        ArtifactKey::for_unit(&self.root, derivative, unit)
    }

    /// Group key under this store's root.
    pub fn group_key(
        &self,
        derivative: &str,
        description: &str,
        suffix: &str,
        extension: &str,
    ) -> GroupKey {
        GroupKey::new(&self.root, derivative, description, suffix, extension)
    }

    /// Pure path computation, no I/O.
    pub fn path_for(&self, key: &ArtifactKey) -> PathBuf {
        key.path()
    }

    /// Whether a completed artifact exists at the key.
    pub fn exists(&self, key: &ArtifactKey) -> bool {
        key.path().is_file()
    }

    /// Writes the payload at the key.
    ///
    /// Fails with [`BatchError::AlreadyExists`] when `overwrite` is false and
    /// the key is occupied.
    pub fn write(
        &self,
        key: &ArtifactKey,
        payload: &[u8],
        overwrite: bool,
    ) -> Result<PathBuf, BatchError> {
        let path = key.path();
        write_atomic(&path, payload, overwrite)?;
        debug!(path = %path.display(), bytes = payload.len(), "artifact written");
        Ok(path)
    }

    /// Writes a group-level payload, replacing prior content.
    pub fn write_group(&self, key: &GroupKey, payload: &[u8]) -> Result<PathBuf, BatchError> {
        let path = key.path();
        write_atomic(&path, payload, true)?;
        debug!(path = %path.display(), bytes = payload.len(), "group artifact written");
        Ok(path)
    }

    /// Reads the artifact stored at the key.
    pub fn read(&self, key: &ArtifactKey) -> Result<Vec<u8>, BatchError> {
        let path = key.path();
        fs::read(&path).map_err(|err| io_error("artifact_read", &path, err))
    }
}

fn already_exists(path: &Path) -> BatchError {
    BatchError::AlreadyExists(
        ErrorInfo::new("artifact_exists", "artifact already exists and overwrite is off")
            .with_context("path", path.display().to_string())
            .with_hint("the completion filter should have skipped this unit"),
    )
}

fn write_atomic(path: &Path, payload: &[u8], overwrite: bool) -> Result<(), BatchError> {
    if !overwrite && path.exists() {
        return Err(already_exists(path));
    }
    let parent = path
        .parent()
        .ok_or_else(|| io_error("artifact_parent", path, "artifact path has no parent"))?;
    fs::create_dir_all(parent).map_err(|err| io_error("artifact_dir", parent, err))?;
    let mut staged =
        NamedTempFile::new_in(parent).map_err(|err| io_error("artifact_stage", parent, err))?;
    staged
        .write_all(payload)
        .map_err(|err| io_error("artifact_stage_write", staged.path(), err))?;
    staged
        .as_file()
        .sync_all()
        .map_err(|err| io_error("artifact_sync", staged.path(), err))?;
    if overwrite {
        staged
            .persist(path)
            .map_err(|err| io_error("artifact_rename", path, err.error))?;
    } else {
        staged.persist_noclobber(path).map_err(|err| {
            if err.error.kind() == ErrorKind::AlreadyExists {
                already_exists(path)
            } else {
                io_error("artifact_rename", path, err.error)
            }
        })?;
    }
    Ok(())
}
