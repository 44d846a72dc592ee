#![deny(missing_docs)]
#![doc = "Completion filtering and dispatch of evoke units to execution backends."]

pub mod backend;
/// Skip/dispatch policy.
pub mod filter;
/// Batch driver and status queries.
pub mod dispatch;

pub use backend::{
    Backend, CommandBackend, DryRunBackend, InlineBackend, JobCommand, JobHandle, WorkerConfig,
};
pub use dispatch::{
    run_batch, unit_status, BatchReport, DispatchedUnit, FailedUnit, SkippedUnit, UnitState,
    UnitStatus,
};
pub use filter::{CompletionFilter, Decision, FilterSpec, SkipReason};
