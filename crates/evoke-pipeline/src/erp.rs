use evoke_core::{subject_seed, BatchConfig, Unit};
use evoke_index::{recording_for, DatasetIndex};
use evoke_store::serde::to_bincode_bytes;
use evoke_store::{content_hash, ArtifactStore};
use tracing::info;

use crate::ops::SignalOps;
use crate::report::{provenance, write_report, ErpReport};
use crate::stage::{run_stage, PipelineExecutor, PipelineKind, Stage, StageFailure, TerminalArtifact};

/// Per-run cleaning pipeline producing ERP epochs.
///
/// Stages run strictly in [`Stage::ERP`] order, each consuming the previous
/// stage's value. The epoch write is the last stage, so a failure anywhere
/// leaves the terminal key untouched.
pub struct ErpPipeline<'a> {
    config: &'a BatchConfig,
    index: &'a dyn DatasetIndex,
    store: &'a ArtifactStore,
    ops: &'a dyn SignalOps,
    overwrite: bool,
}

impl<'a> ErpPipeline<'a> {
    /// Workers overwrite by default; the completion filter decides upstream
    /// whether the unit needs running at all.
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
}

impl PipelineExecutor for ErpPipeline<'_> {
    fn kind(&self) -> PipelineKind {
        PipelineKind::Erp
    }

    fn execute(&self, unit: &Unit) -> Result<TerminalArtifact, StageFailure> {
        let params = &self.config.erp;
        let seed = subject_seed(&unit.subject);

        let loaded = run_stage(unit, Stage::Load, || {
            let entry = recording_for(self.index, unit)?;
            self.ops.load(unit, &entry.path)
        })?;
        let referenced = run_stage(unit, Stage::Rereference, || {
            self.ops.rereference(loaded, &params.eog_pairs)
        })?;
        let cleaned = run_stage(unit, Stage::Denoise, || {
            self.ops.denoise(referenced, seed, params)
        })?;
        let noisy_channels = cleaned.noisy_channels.clone();
        let filtered = run_stage(unit, Stage::BandPass, || {
            self.ops.band_pass(cleaned, params.passband)
        })?;
        let epochs = run_stage(unit, Stage::Epoch, || self.ops.epoch(filtered, params))?;
        let decomposed = run_stage(unit, Stage::Decompose, || self.ops.decompose(epochs, params))?;
        if decomposed.flagged_components.is_empty() {
            info!(unit = %unit, "no ocular components flagged");
        }
        let flagged_components = decomposed.flagged_components.clone();
        let component_scores = decomposed.component_scores.clone();
        let epochs_before = decomposed.epochs.epochs.len();
        let corrected = run_stage(unit, Stage::Finalize, || self.ops.finalize(decomposed))?;
        let rejected = run_stage(unit, Stage::Reject, || {
            self.ops.reject(corrected, params.rejection_k)
        })?;

        let key = PipelineKind::Erp.terminal_key(self.config, self.store, unit);
        let (path, hash) = run_stage(unit, Stage::Persist, || {
            let bytes = to_bincode_bytes(&rejected.epochs)?;
            let path = self.store.write(&key, &bytes, self.overwrite)?;
            Ok((path, content_hash(&bytes)))
        })?;
        info!(
            unit = %unit,
            path = %path.display(),
            kept = rejected.epochs.epochs.len(),
            dropped = rejected.dropped.len(),
            "epochs written"
        );

        let report = ErpReport {
            unit: unit.clone(),
            noisy_channels,
            flagged_components,
            component_scores,
            epochs_before,
            epochs_after: rejected.epochs.epochs.len(),
            rejection_threshold: rejected.threshold,
            artifact_hash: hash.clone(),
            provenance: provenance(self.config, seed),
        };
        let report_key = PipelineKind::Erp.report_key(self.config, self.store, unit);
        let report = write_report(self.store, &report_key, &report);

        Ok(TerminalArtifact {
            unit: unit.clone(),
            path,
            content_hash: hash,
            report,
        })
    }
}
