use std::fmt::{self, Display};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use evoke_core::errors::{BatchError, ErrorInfo};
use evoke_core::{BatchConfig, Unit};
use evoke_index::{list_subject_units, list_units, DatasetIndex, Enumeration};
use evoke_store::{ArtifactKey, ArtifactStore};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

/// Named pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// Read the raw recording.
    Load,
    /// Bipolar EOG derivations.
    Rereference,
    /// Noisy channel interpolation and average reference.
    Denoise,
    /// Band-pass filter.
    BandPass,
    /// Event-locked epoching and resampling.
    Epoch,
    /// Component decomposition and ocular removal.
    Decompose,
    /// Auxiliary channel drop and baseline correction.
    Finalize,
    /// Peak-to-peak rejection.
    Reject,
    /// Read every upstream epoch set of a subject.
    LoadEpochs,
    /// Merge runs and keep EEG channels.
    Concatenate,
    /// Global field power peak extraction.
    Peaks,
    /// Microstate class fitting.
    Fit,
    /// Backfitting onto the fitted classes.
    Segment,
    /// Terminal artifact write.
    Persist,
}

impl Stage {
    /// Stage order of the ERP pipeline.
    pub const ERP: [Stage; 9] = [
        Stage::Load,
        Stage::Rereference,
        Stage::Denoise,
        Stage::BandPass,
        Stage::Epoch,
        Stage::Decompose,
        Stage::Finalize,
        Stage::Reject,
        Stage::Persist,
    ];

    /// Stage order of the microstate pipeline.
    pub const MICROSTATES: [Stage; 6] = [
        Stage::LoadEpochs,
        Stage::Concatenate,
        Stage::Peaks,
        Stage::Fit,
        Stage::Segment,
        Stage::Persist,
    ];

    /// Stable stage name used in logs and error context.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Rereference => "rereference",
            Stage::Denoise => "denoise",
            Stage::BandPass => "band-pass",
            Stage::Epoch => "epoch",
            Stage::Decompose => "decompose",
            Stage::Finalize => "finalize",
            Stage::Reject => "reject",
            Stage::LoadEpochs => "load-epochs",
            Stage::Concatenate => "concatenate",
            Stage::Peaks => "peaks",
            Stage::Fit => "fit",
            Stage::Segment => "segment",
            Stage::Persist => "persist",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stage raised for one unit; the remaining stages were not run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("stage {stage} failed for {unit}: {error}")]
pub struct StageFailure {
    /// Stage that raised.
    pub stage: Stage,
    /// Unit being executed.
    pub unit: Unit,
    /// Underlying error.
    pub error: BatchError,
}

impl From<StageFailure> for BatchError {
    fn from(failure: StageFailure) -> Self {
        BatchError::Stage(
            ErrorInfo::new("stage_failed", failure.error.to_string())
                .with_context("stage", failure.stage.as_str())
                .with_context("unit", failure.unit.to_string())
                .with_context("cause", failure.error.code()),
        )
    }
}

/// Runs one stage body, logging its timing and tagging its error.
pub(crate) fn run_stage<T>(
    unit: &Unit,
    stage: Stage,
    body: impl FnOnce() -> Result<T, BatchError>,
) -> Result<T, StageFailure> {
    let started = Instant::now();
    debug!(unit = %unit, stage = stage.as_str(), "stage started");
    match body() {
        Ok(value) => {
            info!(
                unit = %unit,
                stage = stage.as_str(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "stage finished"
            );
            Ok(value)
        }
        Err(err) => {
            error!(unit = %unit, stage = stage.as_str(), error = %err, "stage failed");
            Err(StageFailure {
                stage,
                unit: unit.clone(),
                error: err,
            })
        }
    }
}

/// Output certifying that a unit's pipeline completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalArtifact {
    /// Unit the artifact belongs to.
    pub unit: Unit,
    /// Location of the terminal artifact.
    pub path: PathBuf,
    /// SHA-256 of the terminal artifact bytes.
    pub content_hash: String,
    /// Location of the accompanying report, when it could be written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<PathBuf>,
}

/// The per-unit pipelines known to the batch driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    /// Per-run cleaning into ERP epochs.
    Erp,
    /// Per-subject microstate clustering over the ERP epochs.
    Microstates,
}

impl PipelineKind {
    /// Name used on the command line and in worker commands.
    pub fn name(self) -> &'static str {
        match self {
            PipelineKind::Erp => "erp",
            PipelineKind::Microstates => "microstates",
        }
    }

    /// Units this pipeline could run on, ignoring completion.
    pub fn enumerate(
        self,
        config: &BatchConfig,
        index: &dyn DatasetIndex,
    ) -> Result<Enumeration, BatchError> {
        match self {
            PipelineKind::Erp => list_units(index, &config.task),
            PipelineKind::Microstates => list_subject_units(
                index,
                &config.task,
                &config.microstates.source_derivative,
                &config.microstates.source_description,
                &config.erp.suffix,
            ),
        }
    }

    /// Key whose existence certifies the unit is done.
    pub fn terminal_key(self, config: &BatchConfig, store: &ArtifactStore, unit: &Unit) -> ArtifactKey {
        match self {
            PipelineKind::Erp => store
                .unit_key(&config.erp.derivative, unit)
                .description(&config.erp.description)
                .suffix(&config.erp.suffix)
                .extension(&config.erp.extension),
            PipelineKind::Microstates => store
                .unit_key(&config.microstates.derivative, unit)
                .description(&config.microstates.description)
                .suffix(&config.microstates.suffix)
                .extension(&config.microstates.extension),
        }
    }

    /// Key of the report written next to the terminal artifact.
    pub fn report_key(self, config: &BatchConfig, store: &ArtifactStore, unit: &Unit) -> ArtifactKey {
        self.terminal_key(config, store, unit)
            .suffix("report")
            .extension("json")
    }
}

impl Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PipelineKind {
    type Err = BatchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "erp" => Ok(PipelineKind::Erp),
            "microstates" => Ok(PipelineKind::Microstates),
            other => Err(BatchError::Configuration(
                ErrorInfo::new("pipeline_unknown", "unknown pipeline")
                    .with_context("pipeline", other)
                    .with_hint("expected `erp` or `microstates`"),
            )),
        }
    }
}

/// One unit's pipeline, executed in-process.
pub trait PipelineExecutor {
    /// Pipeline this executor runs.
    fn kind(&self) -> PipelineKind;

    /// Runs every stage for `unit`, ending with the terminal write.
    fn execute(&self, unit: &Unit) -> Result<TerminalArtifact, StageFailure>;
}
