//! Action error types

use thiserror::Error;

use crate::domain::{ActionKind, NotifyChannel, StepAction};

/// Errors that can occur while applying a step action to the clinic
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ActionError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{id} is {found}, expected {expected}")]
    StaleState { id: String, expected: String, found: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Patient {patient_id} has no {channel} contact on file")]
    NoContact { patient_id: String, channel: NotifyChannel },

    #[error("Patient {patient_id} has no insurance on file")]
    InsuranceMissing { patient_id: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No handler registered for {kind}")]
    UnknownAction { kind: ActionKind },

    #[error("Handler for {handler} received a {action} action")]
    Mismatch { handler: ActionKind, action: ActionKind },

    #[error("Action timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Action failed: {0}")]
    Failed(String),
}

impl ActionError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub fn mismatch(handler: ActionKind, action: &StepAction) -> Self {
        Self::Mismatch {
            handler,
            action: action.kind(),
        }
    }

    pub fn stale(id: impl Into<String>, expected: impl ToString, found: impl ToString) -> Self {
        Self::StaleState {
            id: id.into(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = ActionError::not_found("appointment", "apt-9");
        assert_eq!(err.to_string(), "appointment not found: apt-9");
    }

    #[test]
    fn test_no_contact_message() {
        let err = ActionError::NoContact {
            patient_id: "pat-1".into(),
            channel: NotifyChannel::Email,
        };
        let msg = err.to_string();
        assert!(msg.contains("pat-1"));
        assert!(msg.contains("email"));
    }

    #[test]
    fn test_mismatch_names_both_kinds() {
        let err = ActionError::mismatch(ActionKind::BlockTime, &StepAction::noop("x"));
        let msg = err.to_string();
        assert!(msg.contains("block_time"));
        assert!(msg.contains("noop"));
    }
}
