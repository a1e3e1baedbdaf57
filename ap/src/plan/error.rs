//! Step execution errors

use thiserror::Error;

use crate::actions::ActionError;

/// Which side of a step was running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    Execute,
    Undo,
}

impl std::fmt::Display for StepPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Execute => write!(f, "execute"),
            Self::Undo => write!(f, "undo"),
        }
    }
}

/// A step's action or undo failed
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Step '{label}' failed during {phase}: {source}")]
pub struct StepExecutionError {
    pub step_id: String,
    pub label: String,
    pub phase: StepPhase,
    #[source]
    pub source: ActionError,
}
