//! Immutable batch configuration loaded from YAML.
//!
//! Every field has a serde default, so an empty document is a complete
//! configuration and `BatchConfig::default()` is exactly what parsing `{}`
//! produces.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{BatchError, ErrorInfo};

fn config_error(code: &str, message: impl Into<String>) -> BatchError {
    BatchError::Configuration(ErrorInfo::new(code, message))
}

/// One bipolar re-reference: `target := partner - target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPair {
    /// Channel overwritten with the difference signal.
    pub target: String,
    /// Channel subtracted from.
    pub partner: String,
}

impl ChannelPair {
    /// Convenience constructor.
    pub fn new(target: impl Into<String>, partner: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            partner: partner.into(),
        }
    }
}

/// Parameters of the per-run ERP cleaning pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErpParams {
    /// Derivative subtree the epochs are written to.
    pub derivative: String,
    /// Descriptor of the terminal epoch artifact.
    pub description: String,
    /// BIDS suffix of the terminal epoch artifact.
    pub suffix: String,
    /// Extension of the terminal epoch artifact.
    pub extension: String,
    /// Band-pass edges in Hz, low then high.
    pub passband: (f64, f64),
    /// Epoch start relative to the event onset, in seconds.
    pub tmin: f64,
    /// Epoch end relative to the event onset, in seconds.
    pub tmax: f64,
    /// Sampling rate after epoching.
    pub resample_hz: f64,
    /// Upper bound on decomposition components.
    pub n_components: usize,
    /// z-score above which a component counts as ocular.
    pub eog_threshold: f64,
    /// Channel pairs turned into bipolar EOG derivations.
    pub eog_pairs: Vec<ChannelPair>,
    /// Robust z-score above which an EEG channel is considered noisy.
    pub bad_channel_z: f64,
    /// Fraction of samples drawn when estimating channel deviation.
    pub ransac_fraction: f64,
    /// MAD multiplier of the data-driven rejection threshold.
    pub rejection_k: f64,
}

impl Default for ErpParams {
    fn default() -> Self {
        Self {
            derivative: "erp".to_string(),
            description: "forERP".to_string(),
            suffix: "epo".to_string(),
            extension: "bin".to_string(),
            passband: (0.1, 40.0),
            tmin: -0.3,
            tmax: 0.3,
            resample_hz: 1000.0,
            n_components: 15,
            eog_threshold: 1.96,
            eog_pairs: vec![
                ChannelPair::new("leog", "Fp2"),
                ChannelPair::new("reog", "Fp1"),
            ],
            bad_channel_z: 3.0,
            ransac_fraction: 0.25,
            rejection_k: 3.0,
        }
    }
}

/// Parameters of the per-subject microstate clustering pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MicrostateParams {
    /// Derivative subtree the clustering solution is written to.
    pub derivative: String,
    /// Descriptor of the terminal solution artifact.
    pub description: String,
    /// BIDS suffix of the terminal solution artifact.
    pub suffix: String,
    /// Extension of the terminal solution artifact.
    pub extension: String,
    /// Derivative holding the upstream epochs.
    pub source_derivative: String,
    /// Descriptor of the upstream epochs.
    pub source_description: String,
    /// Number of microstate classes.
    pub n_clusters: usize,
    /// Seed of the clustering initialisation.
    pub seed: u64,
    /// Iteration cap of the k-means refinement.
    pub max_iterations: usize,
    /// Relative change in explained variance treated as converged.
    pub tolerance: f64,
}

impl Default for MicrostateParams {
    fn default() -> Self {
        Self {
            derivative: "microstates".to_string(),
            description: "microstates".to_string(),
            suffix: "ModKMeans".to_string(),
            extension: "json".to_string(),
            source_derivative: "erp".to_string(),
            source_description: "forERP".to_string(),
            n_clusters: 4,
            seed: 0,
            max_iterations: 100,
            tolerance: 1e-6,
        }
    }
}

/// Parameters of the group-level evoked average.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateParams {
    /// Channels averaged per condition.
    pub channels: Vec<String>,
    /// When set, epoch files with a different channel count are skipped.
    pub expected_channels: Option<usize>,
    /// Descriptor of the group output.
    pub description: String,
}

impl Default for AggregateParams {
    fn default() -> Self {
        Self {
            channels: ["Cz", "Fz", "FCz", "CPz", "Pz"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            expected_channels: None,
            description: "evokeds".to_string(),
        }
    }
}

/// Command template of the external execution backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSpec {
    /// Submission program, e.g. `sbatch`.
    pub program: String,
    /// Worker entry point handed to the submission program.
    pub worker: String,
    /// Arguments placed between the worker and the pipeline name.
    pub args: Vec<String>,
    /// Hand the worker command line to the program as one
    /// `--wrap '<command>'` argument instead of as separate arguments.
    /// `sbatch` only accepts scripts otherwise.
    pub wrap: bool,
}

impl Default for BackendSpec {
    fn default() -> Self {
        Self {
            program: "sbatch".to_string(),
            worker: "evoke".to_string(),
            args: vec!["run".to_string()],
            wrap: true,
        }
    }
}

/// Complete immutable configuration of a batch invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Root of the raw BIDS dataset.
    pub bids_root: PathBuf,
    /// Root of the derivative tree, `<bids_root>/derivatives` when omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derivatives_root: Option<PathBuf>,
    /// BIDS task label.
    pub task: String,
    /// Extension of raw recordings inside `sub-*/eeg/`.
    pub recording_extension: String,
    /// Known-defective subjects, never dispatched.
    pub bad_subjects: Vec<String>,
    /// ERP pipeline parameters.
    pub erp: ErpParams,
    /// Microstate pipeline parameters.
    pub microstates: MicrostateParams,
    /// Group aggregate parameters.
    pub aggregate: AggregateParams,
    /// External execution backend.
    pub backend: BackendSpec,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            bids_root: PathBuf::from("data/bids"),
            derivatives_root: None,
            task: "pitch".to_string(),
            recording_extension: "json".to_string(),
            bad_subjects: Vec::new(),
            erp: ErpParams::default(),
            microstates: MicrostateParams::default(),
            aggregate: AggregateParams::default(),
            backend: BackendSpec::default(),
        }
    }
}

impl BatchConfig {
    /// Configuration rooted at the provided dataset, defaults elsewhere.
    pub fn with_root(bids_root: impl Into<PathBuf>) -> Self {
        Self {
            bids_root: bids_root.into(),
            ..Self::default()
        }
    }

    /// Resolved root of the derivative tree.
    pub fn derivatives_root(&self) -> PathBuf {
        match &self.derivatives_root {
            Some(path) => path.clone(),
            None => self.bids_root.join("derivatives"),
        }
    }

    /// Copy with absolute dataset and derivative roots, so a worker started
    /// from another directory resolves the same artifact keys.
    pub fn resolved(&self) -> Result<BatchConfig, BatchError> {
        let cwd = std::env::current_dir().map_err(|err| {
            BatchError::Io(ErrorInfo::new("config_cwd", err.to_string()))
        })?;
        let bids_root = cwd.join(&self.bids_root);
        let derivatives_root = cwd.join(self.derivatives_root());
        Ok(BatchConfig {
            derivatives_root: Some(derivatives_root),
            bids_root,
            ..self.clone()
        })
    }

    /// YAML document that [`parse_config`] reads back into `self`.
    pub fn to_yaml(&self) -> Result<String, BatchError> {
        serde_yaml::to_string(self)
            .map_err(|err| BatchError::Serde(ErrorInfo::new("config_encode", err.to_string())))
    }

    /// Rejects values no pipeline can run with.
    pub fn validate(&self) -> Result<(), BatchError> {
        let (low, high) = self.erp.passband;
        if !(low > 0.0 && low < high) {
            return Err(config_error(
                "config_passband",
                format!("passband ({low}, {high}) is empty"),
            ));
        }
        if self.erp.tmin >= self.erp.tmax {
            return Err(config_error(
                "config_epoch_window",
                format!(
                    "epoch window tmin={} must precede tmax={}",
                    self.erp.tmin, self.erp.tmax
                ),
            ));
        }
        if self.erp.resample_hz <= 0.0 {
            return Err(config_error(
                "config_resample",
                "resample rate must be positive",
            ));
        }
        if !(self.erp.ransac_fraction > 0.0 && self.erp.ransac_fraction <= 1.0) {
            return Err(config_error(
                "config_ransac_fraction",
                "ransac fraction must lie in (0, 1]",
            ));
        }
        if self.microstates.n_clusters == 0 {
            return Err(config_error(
                "config_clusters",
                "microstate cluster count must be positive",
            ));
        }
        for descriptor in [
            self.task.as_str(),
            self.erp.description.as_str(),
            self.erp.suffix.as_str(),
            self.microstates.suffix.as_str(),
            self.microstates.description.as_str(),
            self.microstates.source_description.as_str(),
            self.aggregate.description.as_str(),
        ] {
            validate_descriptor(descriptor)?;
        }
        Ok(())
    }
}

fn validate_descriptor(descriptor: &str) -> Result<(), BatchError> {
    if descriptor.is_empty() || descriptor.contains(['_', '-', '/']) {
        return Err(BatchError::Configuration(
            ErrorInfo::new("config_descriptor", "descriptor is not a valid BIDS label")
                .with_context("descriptor", descriptor)
                .with_hint("descriptors must be non-empty and free of '_', '-' and '/'"),
        ));
    }
    Ok(())
}

/// Loads and validates a configuration from a YAML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<BatchConfig, BatchError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|err| {
        BatchError::Io(
            ErrorInfo::new("config_read", err.to_string())
                .with_context("path", path.display().to_string()),
        )
    })?;
    let config = parse_config(&bytes)?;
    Ok(config)
}

/// Parses and validates a configuration from YAML bytes.
pub fn parse_config(bytes: &[u8]) -> Result<BatchConfig, BatchError> {
    let config: BatchConfig = if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        BatchConfig::default()
    } else {
        serde_yaml::from_slice(bytes)
            .map_err(|err| BatchError::Serde(ErrorInfo::new("config_parse", err.to_string())))?
    };
    config.validate()?;
    Ok(config)
}
