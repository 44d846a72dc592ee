//! Deterministic synthetic BIDS datasets for tests and demos.

use std::f64::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};

use evoke_core::errors::{BatchError, ErrorInfo};
use evoke_core::{derive_substream_seed, BatchConfig, RngHandle};
use rand::Rng;

use crate::recording::{Channel, ChannelKind, Event, RawRecording};

/// Scalp channels of the synthetic montage.
pub const EEG_CHANNELS: [&str; 10] = ["Fp1", "Fp2", "Fz", "FCz", "Cz", "CPz", "Pz", "Oz", "C3", "C4"];

const SFREQ: f64 = 250.0;
const SECONDS: usize = 20;

/// Raw recording of `seed`: alpha rhythm, blinks, an evoked bump after each
/// event and seeded noise. Identical seeds give identical recordings.
pub fn recording(seed: u64) -> RawRecording {
    let n = SECONDS * SFREQ as usize;
    let mut rng = RngHandle::from_seed(seed);
    let blinks: Vec<f64> = (0..SECONDS / 3).map(|i| 1.7 + 3.1 * i as f64).collect();
    let onsets: Vec<usize> = (1..SECONDS).map(|s| s * SFREQ as usize).collect();

    let mut channels = Vec::new();
    for (c, name) in EEG_CHANNELS.iter().chain(["leog", "reog"].iter()).enumerate() {
        let frontal = matches!(*name, "Fp1" | "Fp2" | "leog" | "reog");
        let blink_gain = if frontal { 80.0e-6 } else { 4.0e-6 };
        let evoked_gain = 6.0e-6 / (1.0 + (c as f64 - 4.0).abs());
        let phase = c as f64 * 0.4;
        let data = (0..n)
            .map(|i| {
                let t = i as f64 / SFREQ;
                let alpha = 10.0e-6 * (2.0 * PI * 10.0 * t + phase).sin();
                let blink: f64 = blinks
                    .iter()
                    .map(|b| blink_gain * (-((t - b) / 0.08).powi(2)).exp())
                    .sum();
                let evoked: f64 = onsets
                    .iter()
                    .map(|&o| evoked_gain * (-((t - o as f64 / SFREQ - 0.1) / 0.03).powi(2)).exp())
                    .sum();
                alpha + blink + evoked + rng.gen_range(-2.0e-6..2.0e-6)
            })
            .collect();
        channels.push(Channel {
            name: name.to_string(),
            kind: ChannelKind::Eeg,
            data,
        });
    }

    let events = onsets
        .iter()
        .enumerate()
        .map(|(i, &onset)| Event {
            onset,
            label: if i % 2 == 0 { "standard" } else { "deviant" }.to_string(),
        })
        .collect();
    RawRecording {
        sfreq: SFREQ,
        line_freq: Some(50.0),
        channels,
        events,
    }
}

fn io_error(code: &str, path: &Path, err: impl ToString) -> BatchError {
    BatchError::Io(
        ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()),
    )
}

/// Writes `sub-<subject>/eeg/sub-<subject>_task-<task>_run-<run>_eeg.json`.
pub fn write_recording(
    bids_root: &Path,
    subject: &str,
    task: &str,
    run: &str,
    recording: &RawRecording,
) -> Result<PathBuf, BatchError> {
    let dir = bids_root.join(format!("sub-{subject}")).join("eeg");
    fs::create_dir_all(&dir).map_err(|err| io_error("synthetic_dir", &dir, err))?;
    let path = dir.join(format!("sub-{subject}_task-{task}_run-{run}_eeg.json"));
    let bytes = serde_json::to_vec(recording).map_err(|err| io_error("synthetic_encode", &path, err))?;
    fs::write(&path, bytes).map_err(|err| io_error("synthetic_write", &path, err))?;
    Ok(path)
}

/// Writes one recording per `(subject, run)` pair, seeded from both labels
/// so that the content of a unit never depends on its neighbours.
pub fn write_dataset(
    bids_root: &Path,
    task: &str,
    units: &[(&str, &str)],
) -> Result<Vec<PathBuf>, BatchError> {
    units
        .iter()
        .map(|(subject, run)| {
            let seed = derive_substream_seed(
                subject.parse().unwrap_or_default(),
                run.parse().unwrap_or_default(),
            );
            write_recording(bids_root, subject, task, run, &recording(seed))
        })
        .collect()
}

/// Configuration matched to the synthetic montage and sampling rate.
pub fn config(bids_root: &Path) -> BatchConfig {
    let mut config = BatchConfig::with_root(bids_root);
    config.erp.resample_hz = SFREQ;
    config.erp.passband = (0.5, 40.0);
    config.aggregate.channels = vec!["Cz".to_string(), "Pz".to_string()];
    config
}
