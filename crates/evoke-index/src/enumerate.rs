//! Unit enumeration.
//!
//! Enumeration only answers "what work exists"; it never consults the
//! outputs of the pipeline it feeds.

use std::collections::BTreeSet;

use evoke_core::errors::{BatchError, ErrorInfo};
use evoke_core::{RunId, SubjectId, Unit};
use tracing::warn;

use crate::bids::{DatasetIndex, RecordingEntry};

/// Outcome of one enumeration pass.
#[derive(Debug, Clone, Default)]
pub struct Enumeration {
    /// Valid units, deduplicated, ascending by numeric subject then run.
    pub units: Vec<Unit>,
    /// Entries rejected as [`BatchError::MalformedUnit`].
    pub malformed: Vec<BatchError>,
}

fn malformed(code: &str, message: &str, entry: &RecordingEntry) -> BatchError {
    BatchError::MalformedUnit(
        ErrorInfo::new(code, message)
            .with_context("path", entry.path.display().to_string())
            .with_context("subject", entry.subject.clone())
            .with_context("run", entry.run.clone().unwrap_or_default()),
    )
}

fn unit_from_entry(entry: &RecordingEntry, task: &str) -> Result<Unit, BatchError> {
    let subject = SubjectId::new(entry.subject.clone())
        .map_err(|_| malformed("unit_subject", "subject label cannot be parsed", entry))?;
    let run = entry
        .run
        .as_deref()
        .ok_or_else(|| malformed("unit_run_missing", "recording has no run entity", entry))?;
    let run = RunId::new(run)
        .ok()
        .filter(|run| run.sort_key().is_some())
        .ok_or_else(|| malformed("unit_run", "run number cannot be parsed", entry))?;
    Ok(Unit::per_run(subject, task, run))
}

/// Lists every per-run unit of `task` known to the dataset.
///
/// Recordings of other tasks are ignored. Recordings whose metadata cannot
/// be turned into a unit are reported in [`Enumeration::malformed`] and
/// logged; they never abort the enumeration.
pub fn list_units(index: &dyn DatasetIndex, task: &str) -> Result<Enumeration, BatchError> {
    let mut units = BTreeSet::new();
    let mut rejected = Vec::new();
    for entry in index.recordings()? {
        if entry.task.as_deref() != Some(task) {
            continue;
        }
        match unit_from_entry(&entry, task) {
            Ok(unit) => {
                units.insert(unit);
            }
            Err(err) => {
                warn!(path = %entry.path.display(), error = %err, "excluding malformed unit");
                rejected.push(err);
            }
        }
    }
    Ok(Enumeration {
        units: units.into_iter().collect(),
        malformed: rejected,
    })
}

/// Lists per-subject units for subjects holding at least one upstream
/// derivative (`derivative`/`description`/`suffix`) of `task`.
pub fn list_subject_units(
    index: &dyn DatasetIndex,
    task: &str,
    derivative: &str,
    description: &str,
    suffix: &str,
) -> Result<Enumeration, BatchError> {
    let subjects: BTreeSet<SubjectId> = index
        .derivative_keys(derivative, description, suffix)?
        .into_iter()
        .filter(|key| key.task.as_deref() == Some(task))
        .map(|key| key.subject)
        .collect();
    Ok(Enumeration {
        units: subjects
            .into_iter()
            .map(|subject| Unit::per_subject(subject, task))
            .collect(),
        malformed: Vec::new(),
    })
}

/// Locates the raw recording of a per-run unit.
pub fn recording_for(index: &dyn DatasetIndex, unit: &Unit) -> Result<RecordingEntry, BatchError> {
    let run = unit.run.as_ref().map(RunId::as_str);
    index
        .recordings()?
        .into_iter()
        .find(|entry| {
            entry.subject == unit.subject.as_str()
                && entry.task.as_deref() == Some(unit.task.as_str())
                && entry.run.as_deref() == run
        })
        .ok_or_else(|| {
            BatchError::Io(
                ErrorInfo::new("recording_missing", "no raw recording for unit")
                    .with_context("unit", unit.to_string()),
            )
        })
}
