use std::fs;
use std::path::Path;

use evoke_core::errors::{BatchError, ErrorInfo};
use evoke_core::{BatchConfig, Unit};
use evoke_index::DatasetIndex;
use evoke_pipeline::PipelineKind;
use evoke_store::serde::to_canonical_json_bytes;
use evoke_store::ArtifactStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::{Backend, JobCommand, JobHandle};
use crate::filter::{CompletionFilter, Decision, FilterSpec, SkipReason};

/// A unit handed to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchedUnit {
    /// Unit submitted.
    pub unit: Unit,
    /// Handle returned by the backend.
    pub job: JobHandle,
    /// Whether the job will replace an existing terminal artifact.
    pub overwrite: bool,
}

/// A unit the completion filter held back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedUnit {
    /// Unit skipped.
    pub unit: Unit,
    /// Policy row that applied.
    pub reason: SkipReason,
}

/// A unit whose submission the backend rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedUnit {
    /// Unit whose submission failed.
    pub unit: Unit,
    /// Submission error.
    pub error: BatchError,
}

/// Outcome of one dispatcher pass, in enumeration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Pipeline the pass ran for.
    pub pipeline: Option<PipelineKind>,
    /// Units submitted.
    pub dispatched: Vec<DispatchedUnit>,
    /// Units held back by the completion filter.
    pub skipped: Vec<SkippedUnit>,
    /// Units whose submission failed.
    pub failed: Vec<FailedUnit>,
    /// Dataset entries that could not become units.
    pub malformed: Vec<BatchError>,
}

impl BatchReport {
    /// One-line summary for the terminal.
    pub fn summary(&self) -> String {
        format!(
            "dispatched={} skipped={} failed={} malformed={}",
            self.dispatched.len(),
            self.skipped.len(),
            self.failed.len(),
            self.malformed.len()
        )
    }

    /// Units dispatched, in submission order.
    pub fn dispatched_units(&self) -> Vec<&Unit> {
        self.dispatched.iter().map(|d| &d.unit).collect()
    }

    /// Writes the report as canonical JSON.
    pub fn write_json(&self, path: &Path) -> Result<(), BatchError> {
        let bytes = to_canonical_json_bytes(self)?;
        fs::write(path, bytes).map_err(|err| {
            BatchError::Io(
                ErrorInfo::new("batch_report_write", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }
}

fn log_skip(unit: &Unit, reason: SkipReason) {
    match reason {
        SkipReason::BadList | SkipReason::SkipList => {
            warn!(unit = %unit, reason = reason.describe(), "skipping unit");
        }
        SkipReason::NotIncluded => {
            debug!(unit = %unit, reason = reason.describe(), "skipping unit");
        }
        SkipReason::AlreadyDone => {
            info!(unit = %unit, reason = reason.describe(), "skipping unit");
        }
    }
}

/// Enumerates, filters and submits every unit of `pipeline`.
///
/// Only configuration errors, including an include list combined with a skip
/// list, abort the pass, and they do so before enumeration. Malformed
/// entries and submission failures are collected and the pass continues.
pub fn run_batch(
    pipeline: PipelineKind,
    config: &BatchConfig,
    filters: &FilterSpec,
    index: &dyn DatasetIndex,
    store: &ArtifactStore,
    backend: &dyn Backend,
) -> Result<BatchReport, BatchError> {
    let filter = CompletionFilter::new(filters, &config.bad_subjects)?;
    let enumeration = pipeline.enumerate(config, index)?;
    info!(
        pipeline = pipeline.name(),
        units = enumeration.units.len(),
        malformed = enumeration.malformed.len(),
        "enumerated units"
    );

    let mut report = BatchReport {
        pipeline: Some(pipeline),
        malformed: enumeration.malformed,
        ..BatchReport::default()
    };
    for unit in enumeration.units {
        let key = pipeline.terminal_key(config, store, &unit);
        match filter.decide(&unit, || store.exists(&key)) {
            Decision::Skip(reason) => {
                log_skip(&unit, reason);
                report.skipped.push(SkippedUnit { unit, reason });
            }
            Decision::Dispatch(overwrite) => {
                let job = JobCommand::new(pipeline, unit);
                match backend.submit(&job) {
                    Ok(handle) => {
                        info!(unit = %job.unit, job = %handle, overwrite, "dispatched unit");
                        report.dispatched.push(DispatchedUnit {
                            unit: job.unit,
                            job: handle,
                            overwrite,
                        });
                    }
                    Err(err) => {
                        warn!(unit = %job.unit, error = %err, "submission failed");
                        report.failed.push(FailedUnit {
                            unit: job.unit,
                            error: err,
                        });
                    }
                }
            }
        }
    }
    info!(pipeline = pipeline.name(), summary = %report.summary(), "batch finished");
    Ok(report)
}

/// Completion state of a unit as seen from the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitState {
    /// The terminal artifact exists.
    Done,
    /// Would be dispatched by a default pass.
    Pending,
    /// Held back by the bad, skip or include lists.
    Excluded,
}

/// One row of `evoke status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitStatus {
    /// Enumerated unit.
    pub unit: Unit,
    /// Its completion state.
    pub state: UnitState,
}

/// Classifies every enumerated unit without dispatching anything.
pub fn unit_status(
    pipeline: PipelineKind,
    config: &BatchConfig,
    filters: &FilterSpec,
    index: &dyn DatasetIndex,
    store: &ArtifactStore,
) -> Result<Vec<UnitStatus>, BatchError> {
    let filter = CompletionFilter::new(
        &FilterSpec {
            force: false,
            ..filters.clone()
        },
        &config.bad_subjects,
    )?;
    let enumeration = pipeline.enumerate(config, index)?;
    Ok(enumeration
        .units
        .into_iter()
        .map(|unit| {
            let key = pipeline.terminal_key(config, store, &unit);
            let state = match filter.decide(&unit, || store.exists(&key)) {
                Decision::Dispatch(_) => UnitState::Pending,
                Decision::Skip(SkipReason::AlreadyDone) => UnitState::Done,
                Decision::Skip(_) => UnitState::Excluded,
            };
            UnitStatus { unit, state }
        })
        .collect())
}
