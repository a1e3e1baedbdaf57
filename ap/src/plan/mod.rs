//! Plan execution and rollback

mod error;
mod runner;

pub use error::{StepExecutionError, StepPhase};
pub use runner::{PlanRunner, RollbackReport, RunReport, RunnerConfig};
