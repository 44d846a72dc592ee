use std::path::Path;

use evoke_core::errors::BatchError;
use evoke_core::{ChannelPair, ErpParams, MicrostateParams, Unit};

use crate::epochs::{
    CorrectedEpochs, DecomposedEpochs, EpochSet, MicrostateSolution, PeakMaps, RejectedEpochs,
    Segmentation,
};
use crate::recording::{
    CleanedRecording, FilteredRecording, LoadedRecording, RawRecording, ReferencedRecording,
};
use crate::reference;

/// Signal transforms behind the pipeline stages.
///
/// Every method has a deterministic default. Implementors override single
/// stages, e.g. to inject failures in tests or to call out to a heavier
/// toolbox, and inherit the rest.
pub trait SignalOps: Send + Sync {
    /// Stage 1: read the raw recording of a unit.
    fn load(&self, unit: &Unit, path: &Path) -> Result<LoadedRecording, BatchError> {
        Ok(LoadedRecording {
            unit: unit.clone(),
            recording: RawRecording::from_path(path)?,
        })
    }

    /// Stage 2: bipolar EOG derivations.
    fn rereference(
        &self,
        loaded: LoadedRecording,
        pairs: &[ChannelPair],
    ) -> Result<ReferencedRecording, BatchError> {
        reference::rereference(loaded, pairs)
    }

    /// Stage 3: noisy channel interpolation and average reference.
    fn denoise(
        &self,
        referenced: ReferencedRecording,
        seed: u64,
        params: &ErpParams,
    ) -> Result<CleanedRecording, BatchError> {
        reference::denoise(referenced, seed, params)
    }

    /// Stage 4: band-pass filter.
    fn band_pass(
        &self,
        cleaned: CleanedRecording,
        passband: (f64, f64),
    ) -> Result<FilteredRecording, BatchError> {
        reference::band_pass(cleaned, passband)
    }

    /// Stage 5: event-locked epochs.
    fn epoch(&self, filtered: FilteredRecording, params: &ErpParams) -> Result<EpochSet, BatchError> {
        reference::epoch(filtered, params)
    }

    /// Stage 6: component decomposition and ocular component removal.
    fn decompose(&self, epochs: EpochSet, params: &ErpParams) -> Result<DecomposedEpochs, BatchError> {
        reference::decompose(epochs, params)
    }

    /// Stage 7: drop auxiliary channels, baseline correction.
    fn finalize(&self, decomposed: DecomposedEpochs) -> Result<CorrectedEpochs, BatchError> {
        reference::finalize(decomposed)
    }

    /// Stage 8: data-driven peak-to-peak rejection.
    fn reject(&self, corrected: CorrectedEpochs, rejection_k: f64) -> Result<RejectedEpochs, BatchError> {
        reference::reject(corrected, rejection_k)
    }

    /// Topographies at global field power peaks.
    fn peaks(&self, epochs: &EpochSet) -> Result<PeakMaps, BatchError> {
        reference::gfp_peaks(epochs)
    }

    /// Microstate class fitting.
    fn fit(
        &self,
        peaks: &PeakMaps,
        params: &MicrostateParams,
    ) -> Result<MicrostateSolution, BatchError> {
        reference::fit_microstates(peaks, params)
    }

    /// Backfitting of the epochs onto fitted classes.
    fn segment(
        &self,
        epochs: &EpochSet,
        solution: &MicrostateSolution,
    ) -> Result<Segmentation, BatchError> {
        reference::segment(epochs, solution)
    }
}

/// The built-in deterministic transforms.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceOps;

impl SignalOps for ReferenceOps {}
