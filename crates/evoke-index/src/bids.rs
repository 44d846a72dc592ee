use std::path::{Path, PathBuf};

use evoke_core::errors::{BatchError, ErrorInfo};
use evoke_store::ArtifactKey;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

/// Raw recording entry as found on disk, before validation into a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingEntry {
    /// Path of the recording file.
    pub path: PathBuf,
    /// `sub` entity exactly as written in the file name.
    pub subject: String,
    /// `task` entity, if present.
    pub task: Option<String>,
    /// `run` entity, if present.
    pub run: Option<String>,
}

/// Read-only view over a dataset and its derivative tree.
pub trait DatasetIndex {
    /// Every raw recording known to the dataset.
    fn recordings(&self) -> Result<Vec<RecordingEntry>, BatchError>;

    /// Derivative files of `derivative` with the given `desc` entity and
    /// suffix, ordered by subject then run.
    fn derivative_keys(
        &self,
        derivative: &str,
        description: &str,
        suffix: &str,
    ) -> Result<Vec<ArtifactKey>, BatchError>;
}

/// Filesystem index over a BIDS dataset laid out as `sub-*/eeg/*_eeg.<ext>`.
#[derive(Debug, Clone)]
pub struct BidsIndex {
    bids_root: PathBuf,
    derivatives_root: PathBuf,
    extension: String,
}

impl BidsIndex {
    /// Creates an index; `extension` selects raw recordings (`json`, `vhdr`, ...).
    pub fn new(
        bids_root: impl Into<PathBuf>,
        derivatives_root: impl Into<PathBuf>,
        extension: impl Into<String>,
    ) -> Self {
        let extension = extension.into();
        Self {
            bids_root: bids_root.into(),
            derivatives_root: derivatives_root.into(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    /// Root of the raw dataset.
    pub fn bids_root(&self) -> &Path {
        &self.bids_root
    }

    /// Root of the derivative tree.
    pub fn derivatives_root(&self) -> &Path {
        &self.derivatives_root
    }

    fn parse_recording(&self, path: &Path) -> Option<RecordingEntry> {
        let file_name = path.file_name()?.to_str()?;
        let stem = file_name.strip_suffix(&format!("_eeg.{}", self.extension))?;
        let mut entry = RecordingEntry {
            path: path.to_path_buf(),
            subject: String::new(),
            task: None,
            run: None,
        };
        for part in stem.split('_') {
            let (key, value) = part.split_once('-').unwrap_or((part, ""));
            match key {
                "sub" => entry.subject = value.to_string(),
                "task" => entry.task = Some(value.to_string()),
                "run" => entry.run = Some(value.to_string()),
                _ => {}
            }
        }
        Some(entry)
    }
}

fn scan_error(root: &Path, err: impl ToString) -> BatchError {
    BatchError::Io(
        ErrorInfo::new("index_scan", err.to_string())
            .with_context("root", root.display().to_string()),
    )
}

impl DatasetIndex for BidsIndex {
    fn recordings(&self) -> Result<Vec<RecordingEntry>, BatchError> {
        if !self.bids_root.is_dir() {
            return Err(scan_error(&self.bids_root, "dataset root is not a directory"));
        }
        let mut entries = Vec::new();
        let walker = WalkDir::new(&self.bids_root)
            .min_depth(1)
            .max_depth(3)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() != 1
                    || entry.file_name().to_string_lossy().starts_with("sub-")
            });
        for entry in walker {
            let entry = entry.map_err(|err| scan_error(&self.bids_root, err))?;
            if !entry.file_type().is_file() || entry.depth() != 3 {
                continue;
            }
            let in_eeg_dir = entry
                .path()
                .parent()
                .and_then(|parent| parent.file_name())
                .map(|name| name == "eeg")
                .unwrap_or(false);
            if !in_eeg_dir {
                continue;
            }
            if let Some(recording) = self.parse_recording(entry.path()) {
                entries.push(recording);
            }
        }
        Ok(entries)
    }

    fn derivative_keys(
        &self,
        derivative: &str,
        description: &str,
        suffix: &str,
    ) -> Result<Vec<ArtifactKey>, BatchError> {
        let tree = self.derivatives_root.join(derivative);
        if !tree.is_dir() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in WalkDir::new(&tree).min_depth(2).max_depth(2) {
            let entry = entry.map_err(|err| scan_error(&tree, err))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(key) = ArtifactKey::parse(&self.derivatives_root, derivative, entry.path())
            else {
                continue;
            };
            if key.description == description && key.suffix == suffix {
                keys.push(key);
            }
        }
        keys.sort_by(|a, b| {
            a.subject
                .cmp(&b.subject)
                .then_with(|| a.run.cmp(&b.run))
                .then_with(|| a.file_name().cmp(&b.file_name()))
        });
        Ok(keys)
    }
}
