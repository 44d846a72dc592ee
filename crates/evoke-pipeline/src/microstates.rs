use evoke_core::errors::{BatchError, ErrorInfo};
use evoke_core::{BatchConfig, Unit};
use evoke_index::DatasetIndex;
use evoke_store::serde::{from_bincode_slice, to_canonical_json_bytes};
use evoke_store::{content_hash, ArtifactKey, ArtifactStore};
use tracing::info;

use crate::epochs::EpochSet;
use crate::ops::SignalOps;
use crate::report::{provenance, write_report, MicrostateArtifact, MicrostateReport};
use crate::stage::{run_stage, PipelineExecutor, PipelineKind, Stage, StageFailure, TerminalArtifact};

/// Per-subject microstate clustering over every cleaned run of the subject.
pub struct MicrostatePipeline<'a> {
    config: &'a BatchConfig,
    index: &'a dyn DatasetIndex,
    store: &'a ArtifactStore,
    ops: &'a dyn SignalOps,
    overwrite: bool,
}

impl<'a> MicrostatePipeline<'a> {
    /// Creates a pipeline that overwrites its terminal artifact.
    pub fn new(
        config: &'a BatchConfig,
        index: &'a dyn DatasetIndex,
        store: &'a ArtifactStore,
        ops: &'a dyn SignalOps,
    ) -> Self {
        Self {
            config,
            index,
            store,
            ops,
            overwrite: true,
        }
    }

    /// Sets whether an existing terminal artifact may be replaced.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    fn upstream_keys(&self, unit: &Unit) -> Result<Vec<ArtifactKey>, BatchError> {
        let params = &self.config.microstates;
        let keys: Vec<ArtifactKey> = self
            .index
            .derivative_keys(
                &params.source_derivative,
                &params.source_description,
                &self.config.erp.suffix,
            )?
            .into_iter()
            .filter(|key| key.subject == unit.subject && key.task.as_deref() == Some(unit.task.as_str()))
            .collect();
        if keys.is_empty() {
            return Err(BatchError::Io(
                ErrorInfo::new("upstream_missing", "subject has no upstream epochs")
                    .with_context("unit", unit.to_string())
                    .with_context("derivative", params.source_derivative.clone()),
            ));
        }
        Ok(keys)
    }
}

impl PipelineExecutor for MicrostatePipeline<'_> {
    fn kind(&self) -> PipelineKind {
        PipelineKind::Microstates
    }

    fn execute(&self, unit: &Unit) -> Result<TerminalArtifact, StageFailure> {
        let params = &self.config.microstates;

        let (sources, runs) = run_stage(unit, Stage::LoadEpochs, || {
            let keys = self.upstream_keys(unit)?;
            let mut runs = Vec::with_capacity(keys.len());
            for key in &keys {
                let bytes = self.store.read(key)?;
                runs.push(from_bincode_slice::<EpochSet>(&bytes)?);
            }
            let sources: Vec<String> = keys.iter().map(ArtifactKey::file_name).collect();
            Ok((sources, runs))
        })?;
        let epochs = run_stage(unit, Stage::Concatenate, || {
            EpochSet::concatenate(runs).map(EpochSet::pick_eeg)
        })?;
        let peaks = run_stage(unit, Stage::Peaks, || self.ops.peaks(&epochs))?;
        let solution = run_stage(unit, Stage::Fit, || self.ops.fit(&peaks, params))?;
        let segmentation = run_stage(unit, Stage::Segment, || self.ops.segment(&epochs, &solution))?;

        let gev = solution.gev;
        let iterations = solution.iterations;
        let artifact = MicrostateArtifact {
            unit: unit.clone(),
            solution,
            segmentation,
        };
        let key = PipelineKind::Microstates.terminal_key(self.config, self.store, unit);
        let (path, hash) = run_stage(unit, Stage::Persist, || {
            let bytes = to_canonical_json_bytes(&artifact)?;
            let path = self.store.write(&key, &bytes, self.overwrite)?;
            Ok((path, content_hash(&bytes)))
        })?;
        info!(unit = %unit, path = %path.display(), gev, "microstate solution written");

        let report = MicrostateReport {
            unit: unit.clone(),
            sources,
            n_epochs: epochs.epochs.len(),
            n_peaks: peaks.maps.len(),
            gev,
            iterations,
            artifact_hash: hash.clone(),
            provenance: provenance(self.config, params.seed),
        };
        let report_key = PipelineKind::Microstates.report_key(self.config, self.store, unit);
        let report = write_report(self.store, &report_key, &report);

        Ok(TerminalArtifact {
            unit: unit.clone(),
            path,
            content_hash: hash,
            report,
        })
    }
}
