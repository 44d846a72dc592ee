//! Deterministic reference numerics used by [`ReferenceOps`](crate::ReferenceOps).
//!
//! First-order filters, Gram-Schmidt components and a polarity-invariant
//! modified k-means. The contract is determinism for a fixed input and seed,
//! not parity with any particular toolbox.

use std::f64::consts::PI;

use evoke_core::errors::{BatchError, ErrorInfo};
use evoke_core::{ChannelPair, ErpParams, MicrostateParams, RngHandle};
use rand::seq::index::sample;

use crate::epochs::{
    ChannelInfo, ClassStats, CorrectedEpochs, DecomposedEpochs, Epoch, EpochSet,
    MicrostateSolution, PeakMaps, RejectedEpochs, Segmentation,
};
use crate::recording::{
    ChannelKind, CleanedRecording, FilteredRecording, LoadedRecording, ReferencedRecording,
};

// Scales a median absolute deviation to a standard deviation under normality.
const MAD_TO_SIGMA: f64 = 0.6745;
const POWER_ITERATIONS: usize = 32;

fn signal_error(code: &str, message: impl Into<String>) -> BatchError {
    BatchError::Signal(ErrorInfo::new(code, message))
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn median_abs_deviation(values: &[f64], center: f64) -> f64 {
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

fn std_dev(values: &[f64]) -> f64 {
    let m = mean(values);
    mean(&values.iter().map(|v| (v - m).powi(2)).collect::<Vec<_>>()).sqrt()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let (ma, mb) = (mean(a), mean(b));
    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for (x, y) in a.iter().zip(b) {
        cov += (x - ma) * (y - mb);
        va += (x - ma).powi(2);
        vb += (y - mb).powi(2);
    }
    let denom = (va * vb).sqrt();
    if denom > 0.0 {
        cov / denom
    } else {
        0.0
    }
}

fn normalized(mut values: Vec<f64>) -> Option<Vec<f64>> {
    let norm = dot(&values, &values).sqrt();
    if norm <= f64::EPSILON {
        return None;
    }
    values.iter_mut().for_each(|v| *v /= norm);
    Some(values)
}

fn centered(values: &[f64]) -> Vec<f64> {
    let m = mean(values);
    values.iter().map(|v| v - m).collect()
}

/// Writes `partner - target` into each target channel and marks it as EOG.
pub fn rereference(
    loaded: LoadedRecording,
    pairs: &[ChannelPair],
) -> Result<ReferencedRecording, BatchError> {
    let mut recording = loaded.recording;
    for pair in pairs {
        let missing = |name: &str| {
            BatchError::Signal(
                ErrorInfo::new("reref_channel_missing", "re-reference channel not found")
                    .with_context("channel", name.to_string()),
            )
        };
        let target = recording
            .channel_index(&pair.target)
            .ok_or_else(|| missing(&pair.target))?;
        let partner = recording
            .channel_index(&pair.partner)
            .ok_or_else(|| missing(&pair.partner))?;
        let reference = recording.channels[partner].data.clone();
        let channel = &mut recording.channels[target];
        for (value, partner_value) in channel.data.iter_mut().zip(&reference) {
            *value = partner_value - *value;
        }
        channel.kind = ChannelKind::Eog;
    }
    Ok(ReferencedRecording { recording })
}

/// Flags EEG channels whose deviation on a seeded sample subset is a robust
/// outlier, replaces them with the mean of the good channels and applies a
/// common average reference.
pub fn denoise(
    referenced: ReferencedRecording,
    seed: u64,
    params: &ErpParams,
) -> Result<CleanedRecording, BatchError> {
    let mut recording = referenced.recording;
    let eeg = recording.indices_of(ChannelKind::Eeg);
    if eeg.len() < 3 {
        return Err(signal_error(
            "denoise_channels",
            "noisy channel detection needs at least three EEG channels",
        ));
    }
    let n = recording.n_samples();
    if n == 0 {
        return Err(signal_error("denoise_empty", "recording has no samples"));
    }
    let amount = ((n as f64 * params.ransac_fraction).ceil() as usize).clamp(1, n);
    let mut rng = RngHandle::from_seed(seed);
    let mut picks = sample(rng.inner_mut(), n, amount).into_vec();
    picks.sort_unstable();

    let deviations: Vec<f64> = eeg
        .iter()
        .map(|&c| {
            let data = &recording.channels[c].data;
            let subset: Vec<f64> = picks.iter().map(|&i| data[i]).collect();
            std_dev(&subset)
        })
        .collect();
    let center = median(&deviations);
    let spread = median_abs_deviation(&deviations, center);
    let noisy: Vec<usize> = eeg
        .iter()
        .zip(&deviations)
        .filter(|(_, &dev)| {
            dev == 0.0
                || (spread > 0.0 && (MAD_TO_SIGMA * (dev - center) / spread).abs() > params.bad_channel_z)
        })
        .map(|(&c, _)| c)
        .collect();
    let good: Vec<usize> = eeg.iter().copied().filter(|c| !noisy.contains(c)).collect();
    if good.is_empty() {
        return Err(signal_error(
            "denoise_all_noisy",
            "every EEG channel was flagged as noisy",
        ));
    }

    if !noisy.is_empty() {
        let fill: Vec<f64> = (0..n)
            .map(|i| good.iter().map(|&c| recording.channels[c].data[i]).sum::<f64>() / good.len() as f64)
            .collect();
        for &c in &noisy {
            recording.channels[c].data = fill.clone();
        }
    }

    let average: Vec<f64> = (0..n)
        .map(|i| eeg.iter().map(|&c| recording.channels[c].data[i]).sum::<f64>() / eeg.len() as f64)
        .collect();
    for &c in &eeg {
        for (value, reference) in recording.channels[c].data.iter_mut().zip(&average) {
            *value -= reference;
        }
    }

    let noisy_channels = noisy
        .iter()
        .map(|&c| recording.channels[c].name.clone())
        .collect();
    Ok(CleanedRecording {
        recording,
        noisy_channels,
    })
}

fn high_pass(data: &mut [f64], alpha: f64) {
    let Some(&first) = data.first() else {
        return;
    };
    let mut previous_in = first;
    let mut previous_out = 0.0;
    data[0] = 0.0;
    for value in data.iter_mut().skip(1) {
        let input = *value;
        previous_out = alpha * (previous_out + input - previous_in);
        previous_in = input;
        *value = previous_out;
    }
}

fn low_pass(data: &mut [f64], alpha: f64) {
    let Some(&first) = data.first() else {
        return;
    };
    let mut state = first;
    for value in data.iter_mut().skip(1) {
        state += alpha * (*value - state);
        *value = state;
    }
}

/// First-order high-pass then low-pass on every non-trigger channel.
pub fn band_pass(
    cleaned: CleanedRecording,
    passband: (f64, f64),
) -> Result<FilteredRecording, BatchError> {
    let mut recording = cleaned.recording;
    let (low, high) = passband;
    let nyquist = recording.sfreq / 2.0;
    if high >= nyquist {
        return Err(BatchError::Signal(
            ErrorInfo::new("filter_nyquist", "upper band edge must lie below Nyquist")
                .with_context("high", high.to_string())
                .with_context("nyquist", nyquist.to_string()),
        ));
    }
    let dt = 1.0 / recording.sfreq;
    let hp_rc = 1.0 / (2.0 * PI * low);
    let lp_rc = 1.0 / (2.0 * PI * high);
    let hp_alpha = hp_rc / (hp_rc + dt);
    let lp_alpha = dt / (lp_rc + dt);
    for channel in recording
        .channels
        .iter_mut()
        .filter(|c| c.kind != ChannelKind::Stim)
    {
        high_pass(&mut channel.data, hp_alpha);
        low_pass(&mut channel.data, lp_alpha);
    }
    Ok(FilteredRecording { recording })
}

fn resample(window: &[f64], from_hz: f64, to_hz: f64, n_out: usize) -> Vec<f64> {
    let last = window.len().saturating_sub(1);
    (0..n_out)
        .map(|k| {
            let position = k as f64 * from_hz / to_hz;
            let lower = position.floor() as usize;
            if lower >= last {
                return window[last];
            }
            let frac = position - lower as f64;
            window[lower] * (1.0 - frac) + window[lower + 1] * frac
        })
        .collect()
}

/// Cuts `[onset + tmin, onset + tmax]` around every event and resamples the
/// windows to `resample_hz`. Windows that leave the recording are dropped.
pub fn epoch(filtered: FilteredRecording, params: &ErpParams) -> Result<EpochSet, BatchError> {
    let recording = filtered.recording;
    let sfreq = recording.sfreq;
    let n = recording.n_samples() as i64;
    let start = (params.tmin * sfreq).round() as i64;
    let stop = (params.tmax * sfreq).round() as i64;
    let n_out = ((params.tmax - params.tmin) * params.resample_hz).round() as usize + 1;
    let keep: Vec<usize> = recording
        .channels
        .iter()
        .enumerate()
        .filter(|(_, c)| c.kind != ChannelKind::Stim)
        .map(|(idx, _)| idx)
        .collect();

    let mut epochs = Vec::new();
    for event in &recording.events {
        let first = event.onset as i64 + start;
        let last = event.onset as i64 + stop;
        if first < 0 || last >= n {
            continue;
        }
        let (first, last) = (first as usize, last as usize);
        let data = keep
            .iter()
            .map(|&c| {
                resample(
                    &recording.channels[c].data[first..=last],
                    sfreq,
                    params.resample_hz,
                    n_out,
                )
            })
            .collect();
        epochs.push(Epoch {
            label: event.label.clone(),
            data,
        });
    }
    if epochs.is_empty() {
        return Err(signal_error(
            "epoch_none",
            "no event window fits inside the recording",
        ));
    }
    let channels = keep
        .iter()
        .map(|&c| ChannelInfo {
            name: recording.channels[c].name.clone(),
            kind: recording.channels[c].kind,
        })
        .collect();
    Ok(EpochSet {
        sfreq: params.resample_hz,
        tmin: params.tmin,
        channels,
        epochs,
    })
}

fn concatenated(set: &EpochSet, channel: usize) -> Vec<f64> {
    set.epochs
        .iter()
        .flat_map(|epoch| epoch.data[channel].iter().copied())
        .collect()
}

/// Orthogonal components of the EEG channels, scored against the EOG
/// channels. Components whose score z-value exceeds `eog_threshold` are
/// projected out of the EEG data.
pub fn decompose(mut set: EpochSet, params: &ErpParams) -> Result<DecomposedEpochs, BatchError> {
    let eeg = set.indices_of(ChannelKind::Eeg);
    let eog = set.indices_of(ChannelKind::Eog);
    if eeg.is_empty() {
        return Err(signal_error("decompose_no_eeg", "epochs carry no EEG channel"));
    }
    if eog.is_empty() {
        return Err(signal_error(
            "decompose_no_eog",
            "epochs carry no EOG channel to score components against",
        ));
    }
    let mut signals: Vec<Vec<f64>> = eeg.iter().map(|&c| concatenated(&set, c)).collect();
    let references: Vec<Vec<f64>> = eog.iter().map(|&c| concatenated(&set, c)).collect();

    let limit = params.n_components.min(eeg.len());
    let mut components: Vec<Vec<f64>> = Vec::with_capacity(limit);
    for signal in &signals {
        if components.len() == limit {
            break;
        }
        let mut residual = centered(signal);
        let original = dot(&residual, &residual).sqrt();
        for component in &components {
            let weight = dot(&residual, component);
            for (r, c) in residual.iter_mut().zip(component) {
                *r -= weight * c;
            }
        }
        let norm = dot(&residual, &residual).sqrt();
        if original == 0.0 || norm <= 1e-9 * original {
            continue;
        }
        residual.iter_mut().for_each(|r| *r /= norm);
        components.push(residual);
    }

    let component_scores: Vec<f64> = components
        .iter()
        .map(|component| {
            references
                .iter()
                .map(|reference| pearson(component, reference).abs())
                .fold(0.0, f64::max)
        })
        .collect();
    let (score_mean, score_std) = (mean(&component_scores), std_dev(&component_scores));
    let flagged_components: Vec<usize> = if score_std > 0.0 {
        component_scores
            .iter()
            .enumerate()
            .filter(|(_, &score)| (score - score_mean) / score_std > params.eog_threshold)
            .map(|(idx, _)| idx)
            .collect()
    } else {
        Vec::new()
    };

    if !flagged_components.is_empty() {
        let n_times = set.n_times();
        for (signal, &channel) in signals.iter_mut().zip(&eeg) {
            for &k in &flagged_components {
                let weight = dot(signal, &components[k]);
                for (value, c) in signal.iter_mut().zip(&components[k]) {
                    *value -= weight * c;
                }
            }
            for (epoch, chunk) in set.epochs.iter_mut().zip(signal.chunks(n_times)) {
                epoch.data[channel].copy_from_slice(chunk);
            }
        }
    }

    Ok(DecomposedEpochs {
        epochs: set,
        flagged_components,
        component_scores,
    })
}

/// Drops EOG channels and subtracts the pre-onset mean of every channel.
pub fn finalize(decomposed: DecomposedEpochs) -> Result<CorrectedEpochs, BatchError> {
    let set = decomposed.epochs;
    let keep: Vec<usize> = set
        .channels
        .iter()
        .enumerate()
        .filter(|(_, c)| c.kind != ChannelKind::Eog)
        .map(|(idx, _)| idx)
        .collect();
    let mut set = set.pick(&keep);
    let baseline: Vec<usize> = (0..set.n_times())
        .filter(|&k| set.time_at(k) <= 0.0)
        .collect();
    if !baseline.is_empty() {
        for epoch in &mut set.epochs {
            for row in &mut epoch.data {
                let offset = baseline.iter().map(|&k| row[k]).sum::<f64>() / baseline.len() as f64;
                row.iter_mut().for_each(|v| *v -= offset);
            }
        }
    }
    Ok(CorrectedEpochs { epochs: set })
}

fn peak_to_peak(epoch: &Epoch) -> f64 {
    epoch
        .data
        .iter()
        .map(|row| {
            let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let min = row.iter().copied().fold(f64::INFINITY, f64::min);
            if row.is_empty() {
                0.0
            } else {
                max - min
            }
        })
        .fold(0.0, f64::max)
}

/// Drops epochs whose peak-to-peak amplitude exceeds `median + k * MAD`.
pub fn reject(corrected: CorrectedEpochs, rejection_k: f64) -> Result<RejectedEpochs, BatchError> {
    let EpochSet {
        sfreq,
        tmin,
        channels,
        epochs,
    } = corrected.epochs;
    let amplitudes: Vec<f64> = epochs.iter().map(peak_to_peak).collect();
    let center = median(&amplitudes);
    let threshold = center + rejection_k * median_abs_deviation(&amplitudes, center);
    let mut kept = Vec::with_capacity(epochs.len());
    let mut dropped = Vec::new();
    for (idx, (epoch, amplitude)) in epochs.into_iter().zip(&amplitudes).enumerate() {
        if *amplitude > threshold {
            dropped.push(idx);
        } else {
            kept.push(epoch);
        }
    }
    Ok(RejectedEpochs {
        epochs: EpochSet {
            sfreq,
            tmin,
            channels,
            epochs: kept,
        },
        threshold,
        dropped,
    })
}

fn column(epoch: &Epoch, k: usize) -> Vec<f64> {
    epoch.data.iter().map(|row| row[k]).collect()
}

/// Topographies at local maxima of the global field power.
pub fn gfp_peaks(set: &EpochSet) -> Result<PeakMaps, BatchError> {
    let mut maps = Vec::new();
    let mut gfp = Vec::new();
    let n_times = set.n_times();
    for epoch in &set.epochs {
        let field: Vec<f64> = (0..n_times).map(|k| std_dev(&column(epoch, k))).collect();
        for k in 1..n_times.saturating_sub(1) {
            if field[k] > field[k - 1] && field[k] > field[k + 1] {
                maps.push(column(epoch, k));
                gfp.push(field[k]);
            }
        }
    }
    if maps.is_empty() {
        return Err(signal_error(
            "microstate_no_peaks",
            "global field power has no local maximum",
        ));
    }
    Ok(PeakMaps {
        channels: set.channel_names(),
        maps,
        gfp,
    })
}

fn best_class(map: &[f64], classes: &[Vec<f64>]) -> (usize, f64) {
    let mut best = (0, 0.0);
    for (idx, class) in classes.iter().enumerate() {
        let corr = dot(map, class).abs();
        if corr > best.1 {
            best = (idx, corr);
        }
    }
    best
}

fn principal_direction(members: &[&Vec<f64>], start: &[f64]) -> Vec<f64> {
    let mut direction = start.to_vec();
    for _ in 0..POWER_ITERATIONS {
        let mut next = vec![0.0; direction.len()];
        for member in members {
            let weight = dot(member, &direction);
            for (n, m) in next.iter_mut().zip(member.iter()) {
                *n += weight * m;
            }
        }
        match normalized(next) {
            Some(unit) => direction = unit,
            None => break,
        }
    }
    direction
}

fn explained_variance(maps: &[Vec<f64>], gfp: &[f64], classes: &[Vec<f64>]) -> f64 {
    let total: f64 = gfp.iter().map(|g| g * g).sum();
    if total == 0.0 {
        return 0.0;
    }
    maps.iter()
        .zip(gfp)
        .map(|(map, g)| {
            let (_, corr) = best_class(map, classes);
            g * g * corr * corr
        })
        .sum::<f64>()
        / total
}

fn class_name(idx: usize) -> String {
    if idx < 26 {
        char::from(b'A' + idx as u8).to_string()
    } else {
        format!("K{idx}")
    }
}

/// Polarity-invariant modified k-means over the peak maps.
pub fn fit_microstates(
    peaks: &PeakMaps,
    params: &MicrostateParams,
) -> Result<MicrostateSolution, BatchError> {
    let k = params.n_clusters;
    let (maps, gfp): (Vec<Vec<f64>>, Vec<f64>) = peaks
        .maps
        .iter()
        .zip(&peaks.gfp)
        .filter_map(|(map, &g)| normalized(centered(map)).map(|unit| (unit, g)))
        .unzip();
    if maps.len() < k {
        return Err(BatchError::Signal(
            ErrorInfo::new("microstate_too_few_peaks", "fewer peak maps than classes")
                .with_context("peaks", maps.len().to_string())
                .with_context("classes", k.to_string()),
        ));
    }
    let mut rng = RngHandle::from_seed(params.seed);
    let mut classes: Vec<Vec<f64>> = sample(rng.inner_mut(), maps.len(), k)
        .into_iter()
        .map(|idx| maps[idx].clone())
        .collect();

    let mut gev = 0.0;
    let mut iterations = 0;
    for iteration in 1..=params.max_iterations.max(1) {
        iterations = iteration;
        let labels: Vec<usize> = maps.iter().map(|map| best_class(map, &classes).0).collect();
        for (idx, class) in classes.iter_mut().enumerate() {
            let members: Vec<&Vec<f64>> = maps
                .iter()
                .zip(&labels)
                .filter(|(_, &label)| label == idx)
                .map(|(map, _)| map)
                .collect();
            if !members.is_empty() {
                *class = principal_direction(&members, class);
            }
        }
        let next = explained_variance(&maps, &gfp, &classes);
        let converged = (next - gev).abs() <= params.tolerance * next.abs();
        gev = next;
        if converged {
            break;
        }
    }

    Ok(MicrostateSolution {
        channels: peaks.channels.clone(),
        names: (0..k).map(class_name).collect(),
        maps: classes,
        gev,
        iterations,
        seed: params.seed,
    })
}

/// Backfits every sample onto the solution and summarises explained
/// variance and time coverage per class.
pub fn segment(set: &EpochSet, solution: &MicrostateSolution) -> Result<Segmentation, BatchError> {
    if set.channel_names() != solution.channels {
        return Err(signal_error(
            "segment_layout",
            "epoch channels differ from the solution's channels",
        ));
    }
    let k = solution.maps.len();
    let mut explained = vec![0.0; k];
    let mut counts = vec![0usize; k];
    let mut total = 0.0;
    let mut labelled = 0;
    let mut unlabelled = 0;
    for epoch in &set.epochs {
        for t in 0..set.n_times() {
            let values = column(epoch, t);
            let field = std_dev(&values);
            let Some(map) = normalized(centered(&values)).filter(|_| field > 0.0) else {
                unlabelled += 1;
                continue;
            };
            let (class, corr) = best_class(&map, &solution.maps);
            explained[class] += field * field * corr * corr;
            counts[class] += 1;
            total += field * field;
            labelled += 1;
        }
    }
    let classes = (0..k)
        .map(|idx| ClassStats {
            name: solution.names[idx].clone(),
            gev: if total > 0.0 { explained[idx] / total } else { 0.0 },
            timecov: if labelled > 0 {
                counts[idx] as f64 / labelled as f64
            } else {
                0.0
            },
        })
        .collect();
    Ok(Segmentation {
        classes,
        labelled_samples: labelled,
        unlabelled_samples: unlabelled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_handles_even_and_odd_lengths() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn resample_interpolates_linearly() {
        let window = [0.0, 2.0, 4.0];
        assert_eq!(resample(&window, 1.0, 2.0, 5), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn low_pass_keeps_constant_signal() {
        let mut data = vec![1.5; 16];
        low_pass(&mut data, 0.3);
        assert!(data.iter().all(|v| (v - 1.5).abs() < 1e-12));
    }

    #[test]
    fn class_names_are_letters() {
        assert_eq!(class_name(0), "A");
        assert_eq!(class_name(3), "D");
    }
}
