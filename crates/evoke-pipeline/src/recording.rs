//! Continuous recordings and the typed values handed between the early
//! stages of the ERP pipeline.

use std::fs;
use std::path::Path;

use evoke_core::errors::{BatchError, ErrorInfo};
use evoke_core::Unit;
use serde::{Deserialize, Serialize};

/// Channel type as declared by the recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Scalp EEG.
    Eeg,
    /// Ocular reference channel.
    Eog,
    /// Trigger channel.
    Stim,
    /// Anything else.
    Misc,
}

/// One sampled channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel label.
    pub name: String,
    /// Channel type.
    pub kind: ChannelKind,
    /// Samples in volts.
    pub data: Vec<f64>,
}

/// Annotated event onset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Onset as a sample index.
    pub onset: usize,
    /// Condition label.
    pub label: String,
}

/// Continuous multi-channel recording with its event annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecording {
    /// Sampling rate in Hz.
    pub sfreq: f64,
    /// Mains frequency, when known.
    #[serde(default)]
    pub line_freq: Option<f64>,
    /// Channels in acquisition order.
    pub channels: Vec<Channel>,
    /// Event annotations.
    #[serde(default)]
    pub events: Vec<Event>,
}

impl RawRecording {
    /// Reads a JSON encoded recording.
    pub fn from_path(path: &Path) -> Result<Self, BatchError> {
        let bytes = fs::read(path).map_err(|err| {
            BatchError::Io(
                ErrorInfo::new("recording_read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        let recording: RawRecording = serde_json::from_slice(&bytes).map_err(|err| {
            BatchError::Serde(
                ErrorInfo::new("recording_parse", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        recording.validate()?;
        Ok(recording)
    }

    /// Checks that every channel has the same length and the rate is positive.
    pub fn validate(&self) -> Result<(), BatchError> {
        if !(self.sfreq > 0.0) {
            return Err(BatchError::Signal(ErrorInfo::new(
                "recording_sfreq",
                "sampling rate must be positive",
            )));
        }
        let expected = self.n_samples();
        if let Some(channel) = self.channels.iter().find(|c| c.data.len() != expected) {
            return Err(BatchError::Signal(
                ErrorInfo::new("recording_ragged", "channels differ in length")
                    .with_context("channel", channel.name.clone()),
            ));
        }
        Ok(())
    }

    /// Number of samples per channel.
    pub fn n_samples(&self) -> usize {
        self.channels.first().map(|c| c.data.len()).unwrap_or(0)
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
}

/// Stage 1 output: the recording as loaded for a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedRecording {
    /// Unit the recording belongs to.
    pub unit: Unit,
    /// Recording as read from disk.
    pub recording: RawRecording,
}

/// Stage 2 output: bipolar EOG derivations in place.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferencedRecording {
    /// Re-referenced recording.
    pub recording: RawRecording,
}

/// Stage 3 output: noisy channels interpolated, average reference applied.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedRecording {
    /// Cleaned recording.
    pub recording: RawRecording,
    /// Channels detected as noisy and interpolated.
    pub noisy_channels: Vec<String>,
}

/// Stage 4 output: band-pass filtered recording.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredRecording {
    /// Filtered recording.
    pub recording: RawRecording,
}
