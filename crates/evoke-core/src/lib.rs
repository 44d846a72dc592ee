#![deny(missing_docs)]
#![doc = "Core identifiers, errors, seeding and configuration for the evoke batch pipeline."]

pub mod config;
pub mod errors;
pub mod ids;
pub mod provenance;
pub mod rng;

pub use config::{
    load_config, parse_config, AggregateParams, BackendSpec, BatchConfig, ChannelPair, ErpParams,
    MicrostateParams,
};
pub use errors::{BatchError, ErrorInfo};
pub use ids::{RunId, SubjectId, Unit};
pub use provenance::RunProvenance;
pub use rng::{derive_substream_seed, subject_seed, RngHandle};
