#![deny(missing_docs)]
#![doc = "Dataset index and unit enumeration for evoke."]

/// Filesystem index over BIDS datasets.
pub mod bids;
pub mod enumerate;

pub use bids::{BidsIndex, DatasetIndex, RecordingEntry};
pub use enumerate::{list_subject_units, list_units, recording_for, Enumeration};
