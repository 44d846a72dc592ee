//! Epoched data and the values produced after epoching.

use evoke_core::errors::{BatchError, ErrorInfo};
use serde::{Deserialize, Serialize};

use crate::recording::ChannelKind;

/// Name and type of an epoched channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Channel label.
    pub name: String,
    /// Channel type.
    pub kind: ChannelKind,
}

/// One event-locked window, `data[channel][sample]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Epoch {
    /// Condition label of the locking event.
    pub label: String,
    /// Samples per channel.
    pub data: Vec<Vec<f64>>,
}

/// Event-locked windows sharing one channel layout and time axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochSet {
    /// Sampling rate of the windows in Hz.
    pub sfreq: f64,
    /// Time of the first sample relative to the event, in seconds.
    pub tmin: f64,
    /// Channel layout shared by every epoch.
    pub channels: Vec<ChannelInfo>,
    /// Windows in event order.
    pub epochs: Vec<Epoch>,
}

impl EpochSet {
    /// Samples per epoch.
    pub fn n_times(&self) -> usize {
        self.epochs
            .first()
            .and_then(|epoch| epoch.data.first())
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Time of sample `k` in seconds.
    pub fn time_at(&self, k: usize) -> f64 {
        self.tmin + k as f64 / self.sfreq
    }

    /// Position of the named channel.
    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.name == name)
    }

    /// Positions of every channel of the given kind.
    pub fn indices_of(&self, kind: ChannelKind) -> Vec<usize> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind == kind)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Keeps only the channels at `indices`, in that order.
    pub fn pick(mut self, indices: &[usize]) -> Self {
        self.channels = indices.iter().map(|&i| self.channels[i].clone()).collect();
        for epoch in &mut self.epochs {
            epoch.data = indices.iter().map(|&i| epoch.data[i].clone()).collect();
        }
        self
    }

    /// Keeps only EEG channels.
    pub fn pick_eeg(self) -> Self {
        let indices = self.indices_of(ChannelKind::Eeg);
        self.pick(&indices)
    }

    /// Channel names in layout order.
    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name.clone()).collect()
    }

    /// Appends the epochs of several sets, which must share a layout.
    pub fn concatenate(sets: Vec<EpochSet>) -> Result<EpochSet, BatchError> {
        let mut iter = sets.into_iter();
        let mut merged = iter.next().ok_or_else(|| {
            BatchError::Signal(ErrorInfo::new("concat_empty", "no epoch sets to concatenate"))
        })?;
        for set in iter {
            if set.channels != merged.channels {
                return Err(BatchError::Signal(
                    ErrorInfo::new("concat_layout", "epoch sets differ in channel layout")
                        .with_context("expected", merged.channels.len().to_string())
                        .with_context("found", set.channels.len().to_string()),
                ));
            }
            if set.sfreq != merged.sfreq || set.n_times() != merged.n_times() {
                return Err(BatchError::Signal(ErrorInfo::new(
                    "concat_time_axis",
                    "epoch sets differ in time axis",
                )));
            }
            merged.epochs.extend(set.epochs);
        }
        Ok(merged)
    }
}

/// Stage 6 output: epochs with the component decomposition applied.
#[derive(Debug, Clone, PartialEq)]
pub struct DecomposedEpochs {
    /// Epochs, still carrying auxiliary channels.
    pub epochs: EpochSet,
    /// Indices of components flagged as ocular and projected out.
    pub flagged_components: Vec<usize>,
    /// Ocular correlation score of every fitted component.
    pub component_scores: Vec<f64>,
}

/// Stage 7 output: auxiliary channels dropped, baseline subtracted.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectedEpochs {
    /// Baseline corrected EEG epochs.
    pub epochs: EpochSet,
}

/// Stage 8 output: epochs surviving peak-to-peak rejection.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedEpochs {
    /// Surviving epochs.
    pub epochs: EpochSet,
    /// Peak-to-peak threshold that was applied.
    pub threshold: f64,
    /// Indices of the dropped epochs in the pre-rejection order.
    pub dropped: Vec<usize>,
}

/// Topographies sampled at global field power peaks.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakMaps {
    /// Channel layout of every map.
    pub channels: Vec<String>,
    /// One map per peak.
    pub maps: Vec<Vec<f64>>,
    /// Global field power at each peak.
    pub gfp: Vec<f64>,
}

/// Fitted microstate classes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicrostateSolution {
    /// Channel layout of the class maps.
    pub channels: Vec<String>,
    /// Class names, `A`, `B`, ...
    pub names: Vec<String>,
    /// Unit-norm class maps.
    pub maps: Vec<Vec<f64>>,
    /// Global explained variance over the fitted peaks.
    pub gev: f64,
    /// Refinement iterations performed.
    pub iterations: usize,
    /// Seed of the initialisation.
    pub seed: u64,
}

/// Per-class statistics of a backfitted segmentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassStats {
    /// Class name.
    pub name: String,
    /// Share of the explained variance attributed to the class.
    pub gev: f64,
    /// Fraction of labelled samples assigned to the class.
    pub timecov: f64,
}

/// Segmentation of epoched data onto a microstate solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segmentation {
    /// Per-class statistics, in class order.
    pub classes: Vec<ClassStats>,
    /// Samples that received a label.
    pub labelled_samples: usize,
    /// Samples left unlabelled because their field power was zero.
    pub unlabelled_samples: usize,
}
