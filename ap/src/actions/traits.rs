//! ActionHandler trait definition

use async_trait::async_trait;
use tracing::debug;

use super::context::ActionContext;
use super::error::ActionError;
use crate::domain::{ActionKind, StepAction};

/// Interprets one kind of [`StepAction`] against the clinic
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Action kind this handler is registered under
    fn kind(&self) -> ActionKind;

    /// Human-readable description
    fn description(&self) -> &'static str;

    /// Apply the action
    async fn execute(&self, action: &StepAction, ctx: &ActionContext) -> Result<ActionOutcome, ActionError>;
}

/// Result of a successful action
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub summary: String,
}

impl ActionOutcome {
    pub fn new(summary: impl Into<String>) -> Self {
        debug!("ActionOutcome::new: called");
        Self {
            summary: summary.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_outcome() {
        let outcome = ActionOutcome::new("Moved apt-1");
        assert_eq!(outcome.summary, "Moved apt-1");
    }
}
