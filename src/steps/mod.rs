//! Plan steps and their execution results.
//!
//! - [`Step`] - A single executable unit, tagged by `type`
//! - [`StepAction`] - The type-specific payload of a step
//! - [`StepOutcome`] - What happened when a step ran
//! - [`RollbackReport`] - Aggregate result of a best-effort rollback

pub mod outcome;
pub mod step;

pub use outcome::{PlanOutcome, RollbackReport, StepOutcome};
pub use step::{
    AuthKind, ConfigAction, ConfigStep, DownloadAuth, DownloadStep, ReleaseStep, ServiceAction,
    Step, StepAction,
};
