//! Staged pipelines executed for one unit at a time.
//!
//! Each pipeline is a fixed sequence of [`Stage`]s whose boundaries are
//! distinct types, so a stage can only consume what its predecessor
//! produced. The signal transforms themselves sit behind [`SignalOps`].

mod aggregate;
mod epochs;
mod erp;
mod microstates;
mod ops;
mod recording;
mod reference;
mod report;
mod stage;
pub mod synthetic;

pub use aggregate::{AggregatePipeline, AggregateSummary};
pub use epochs::{
    ChannelInfo, ClassStats, CorrectedEpochs, DecomposedEpochs, Epoch, EpochSet,
    MicrostateSolution, PeakMaps, RejectedEpochs, Segmentation,
};
pub use erp::ErpPipeline;
pub use microstates::MicrostatePipeline;
pub use ops::{ReferenceOps, SignalOps};
pub use recording::{
    Channel, ChannelKind, CleanedRecording, Event, FilteredRecording, LoadedRecording,
    RawRecording, ReferencedRecording,
};
pub use report::{ErpReport, MicrostateArtifact, MicrostateReport};
pub use stage::{PipelineExecutor, PipelineKind, Stage, StageFailure, TerminalArtifact};

use evoke_core::BatchConfig;
use evoke_index::DatasetIndex;
use evoke_store::ArtifactStore;

/// Builds the in-process executor of `kind`.
pub fn executor<'a>(
    kind: PipelineKind,
    config: &'a BatchConfig,
    index: &'a dyn DatasetIndex,
    store: &'a ArtifactStore,
    ops: &'a dyn SignalOps,
) -> Box<dyn PipelineExecutor + 'a> {
    match kind {
        PipelineKind::Erp => Box::new(ErpPipeline::new(config, index, store, ops)),
        PipelineKind::Microstates => Box::new(MicrostatePipeline::new(config, index, store, ops)),
    }
}
