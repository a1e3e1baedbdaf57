//! Planning errors

use thiserror::Error;

use crate::domain::PlanError;
use crate::llm::LlmError;

/// Errors from planners and reasoners
#[derive(Debug, Error)]
pub enum PlanningError {
    #[error("Clarification limit reached after {max} rounds")]
    ClarificationLimit { max: u32 },

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("Invalid plan proposal: {0}")]
    InvalidProposal(String),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("Planning failed: {0}")]
    Failed(String),
}
