use std::path::PathBuf;

use chrono::Utc;
use evoke_core::{BatchConfig, RunProvenance, Unit};
use evoke_store::serde::to_canonical_json_bytes;
use evoke_store::{stable_hash_string, ArtifactKey, ArtifactStore};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::epochs::{MicrostateSolution, Segmentation};

/// Summary written next to a unit's cleaned epochs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErpReport {
    /// Unit the epochs belong to.
    pub unit: Unit,
    /// Channels flagged as noisy and interpolated.
    pub noisy_channels: Vec<String>,
    /// Ocular components removed; omitted when nothing was flagged.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flagged_components: Vec<usize>,
    /// Ocular score of every fitted component.
    pub component_scores: Vec<f64>,
    /// Epochs before rejection.
    pub epochs_before: usize,
    /// Epochs kept after rejection.
    pub epochs_after: usize,
    /// Peak-to-peak threshold of the rejection stage.
    pub rejection_threshold: f64,
    /// Content hash of the terminal epoch artifact.
    pub artifact_hash: String,
    /// Provenance of the run.
    pub provenance: RunProvenance,
}

/// Summary written next to a subject's microstate solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicrostateReport {
    /// Per-subject unit.
    pub unit: Unit,
    /// Upstream epoch files merged, in run order.
    pub sources: Vec<String>,
    /// Epochs after concatenation.
    pub n_epochs: usize,
    /// Peak maps the classes were fitted on.
    pub n_peaks: usize,
    /// Explained variance over the peaks.
    pub gev: f64,
    /// Refinement iterations performed.
    pub iterations: usize,
    /// Content hash of the terminal solution artifact.
    pub artifact_hash: String,
    /// Provenance of the run.
    pub provenance: RunProvenance,
}

/// Terminal artifact of the microstate pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicrostateArtifact {
    /// Per-subject unit.
    pub unit: Unit,
    /// Fitted classes.
    pub solution: MicrostateSolution,
    /// Backfitted statistics over every epoch sample.
    pub segmentation: Segmentation,
}

pub(crate) fn provenance(config: &BatchConfig, seed: u64) -> RunProvenance {
    RunProvenance::new(
        stable_hash_string(config).unwrap_or_default(),
        seed,
        Utc::now().to_rfc3339(),
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
    )
}

/// Writes a report after the terminal artifact; failures only warn.
pub(crate) fn write_report<T: Serialize>(
    store: &ArtifactStore,
    key: &ArtifactKey,
    report: &T,
) -> Option<PathBuf> {
    match to_canonical_json_bytes(report).and_then(|bytes| store.write(key, &bytes, true)) {
        Ok(path) => Some(path),
        Err(err) => {
            warn!(path = %key.path().display(), error = %err, "report write failed");
            None
        }
    }
}
