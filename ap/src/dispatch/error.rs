//! Dispatch errors

use thiserror::Error;

use crate::clarification::ValidationError;
use crate::conversation::{ConversationError, SessionError};
use crate::planner::PlanningError;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Command is empty")]
    EmptyCommand,

    #[error("Plan {plan_id} is not waiting for answers")]
    NotAwaitingAnswers { plan_id: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Planning(#[from] PlanningError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl From<ConversationError> for DispatchError {
    fn from(err: ConversationError) -> Self {
        match err {
            ConversationError::Session(e) => Self::Session(e),
            ConversationError::Reasoning(e) => Self::Planning(e),
        }
    }
}
