use std::path::{Path, PathBuf};

use evoke_core::{RunId, SubjectId, Unit};
use serde::{Deserialize, Serialize};

/// Structured identifier of one per-subject derivative file.
///
/// [`ArtifactKey::path`] is a pure function of the fields; two keys with equal
/// fields always name the same file, which is what makes existence checks a
/// sound completion ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
    /// Derivatives root (`<bids_root>/derivatives`).
    pub root: PathBuf,
    /// Name of the derivative subtree, e.g. `erp`.
    pub derivative: String,
    /// Subject label.
    pub subject: SubjectId,
    /// Optional task entity.
    #[serde(default)]
    pub task: Option<String>,
    /// Optional run entity.
    #[serde(default)]
    pub run: Option<RunId>,
    /// `desc` entity.
    pub description: String,
    /// BIDS suffix, e.g. `epo`.
    pub suffix: String,
    /// Extension without the leading dot, e.g. `bin` or `fif.gz`.
    pub extension: String,
}

impl ArtifactKey {
    /// Starts a key for a subject inside a derivative subtree.
    pub fn new(root: impl Into<PathBuf>, derivative: impl Into<String>, subject: SubjectId) -> Self {
        Self {
            root: root.into(),
            derivative: derivative.into(),
            subject,
            task: None,
            run: None,
            description: String::new(),
            suffix: String::new(),
            extension: String::new(),
        }
    }

    /// Starts a key carrying the unit's subject, task and run.
    pub fn for_unit(root: impl Into<PathBuf>, derivative: impl Into<String>, unit: &Unit) -> Self {
        let mut key = Self::new(root, derivative, unit.subject.clone()).task(unit.task.clone());
        key.run = unit.run.clone();
        key
    }

    /// Sets the task entity.
    pub fn task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Sets the run entity.
    pub fn run(mut self, run: RunId) -> Self {
        self.run = Some(run);
        self
    }

    /// Sets the `desc` entity.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the suffix.
    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Sets the extension; a leading dot is dropped.
    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    /// Directory holding every artifact of this subject in the derivative.
    pub fn subject_dir(&self) -> PathBuf {
        self.root
            .join(&self.derivative)
            .join(format!("sub-{}", self.subject))
    }

    /// File name encoding every entity of the key.
    pub fn file_name(&self) -> String {
        let mut name = format!("sub-{}", self.subject);
        if let Some(task) = &self.task {
            name.push_str(&format!("_task-{task}"));
        }
        if let Some(run) = &self.run {
            name.push_str(&format!("_run-{run}"));
        }
        name.push_str(&format!("_desc-{}_{}", self.description, self.suffix));
        if !self.extension.is_empty() {
            name.push('.');
            name.push_str(&self.extension);
        }
        name
    }

    /// Canonical path of the artifact.
    pub fn path(&self) -> PathBuf {
        self.subject_dir().join(self.file_name())
    }

    /// Inverse of [`ArtifactKey::path`] for files inside `root/derivative`.
    ///
    /// Returns `None` for anything that is not a per-subject derivative file
    /// with a `desc` entity.
    pub fn parse(root: &Path, derivative: &str, path: &Path) -> Option<Self> {
        let relative = path.strip_prefix(root.join(derivative)).ok()?;
        let mut components = relative.components();
        let subject_dir = components.next()?.as_os_str().to_str()?;
        let file_name = components.next()?.as_os_str().to_str()?;
        if components.next().is_some() {
            return None;
        }
        let (stem, extension) = match file_name.split_once('.') {
            Some((stem, extension)) => (stem, extension),
            None => (file_name, ""),
        };
        let mut parts: Vec<&str> = stem.split('_').collect();
        let suffix = parts.pop()?;
        if suffix.contains('-') {
            return None;
        }
        let mut entities = parts.into_iter().map(|part| part.split_once('-'));
        let (sub_key, sub_value) = entities.next()??;
        if sub_key != "sub" || subject_dir != format!("sub-{sub_value}") {
            return None;
        }
        let mut key = Self::new(root, derivative, SubjectId::new(sub_value).ok()?)
            .suffix(suffix)
            .extension(extension);
        let mut saw_description = false;
        for entity in entities {
            match entity? {
                ("task", value) if key.task.is_none() => key.task = Some(value.to_string()),
                ("run", value) if key.run.is_none() => key.run = Some(RunId::new(value).ok()?),
                ("desc", value) if !saw_description => {
                    key.description = value.to_string();
                    saw_description = true;
                }
                _ => return None,
            }
        }
        saw_description.then_some(key)
    }
}

/// Identifier of a group-level derivative file spanning many subjects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    /// Derivatives root.
    pub root: PathBuf,
    /// Name of the derivative subtree.
    pub derivative: String,
    /// `desc` entity.
    pub description: String,
    /// Suffix of the file.
    pub suffix: String,
    /// Extension without the leading dot.
    pub extension: String,
}

impl GroupKey {
    /// Builds a group key; a leading dot in `extension` is dropped.
    pub fn new(
        root: impl Into<PathBuf>,
        derivative: impl Into<String>,
        description: impl Into<String>,
        suffix: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        let extension = extension.into();
        Self {
            root: root.into(),
            derivative: derivative.into(),
            description: description.into(),
            suffix: suffix.into(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    /// Canonical path of the group artifact.
    pub fn path(&self) -> PathBuf {
        self.root.join(&self.derivative).join(format!(
            "group_desc-{}_{}.{}",
            self.description, self.suffix, self.extension
        ))
    }
}
