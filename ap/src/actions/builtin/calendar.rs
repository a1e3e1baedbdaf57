//! Calendar block handlers and the no-op handler

use async_trait::async_trait;
use tracing::debug;

use crate::actions::{ActionContext, ActionError, ActionHandler, ActionOutcome};
use crate::domain::{ActionKind, StepAction, TimeBlock, format_slot};

/// Reserve a span of clinic time
pub struct BlockTimeHandler;

#[async_trait]
impl ActionHandler for BlockTimeHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::BlockTime
    }

    fn description(&self) -> &'static str {
        "Block a span of time on the clinic calendar"
    }

    async fn execute(&self, action: &StepAction, ctx: &ActionContext) -> Result<ActionOutcome, ActionError> {
        let StepAction::BlockTime {
            block_id,
            start,
            end,
            reason,
        } = action
        else {
            return Err(ActionError::mismatch(self.kind(), action));
        };
        debug!(%block_id, %start, %end, "BlockTimeHandler::execute: called");

        if start >= end {
            return Err(ActionError::InvalidArgument(format!(
                "block must end after it starts ({} - {})",
                format_slot(*start),
                format_slot(*end)
            )));
        }

        let mut state = ctx.clinic.lock().await;
        if state.snapshot.blocks.iter().any(|b| b.id == *block_id) {
            return Err(ActionError::Conflict(format!("block {} already exists", block_id)));
        }
        state.snapshot.blocks.push(TimeBlock {
            id: block_id.clone(),
            start: *start,
            end: *end,
            reason: reason.clone(),
        });

        Ok(ActionOutcome::new(format!(
            "Blocked {} to {}",
            format_slot(*start),
            format_slot(*end)
        )))
    }
}

/// Remove a previously created block
pub struct UnblockTimeHandler;

#[async_trait]
impl ActionHandler for UnblockTimeHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::UnblockTime
    }

    fn description(&self) -> &'static str {
        "Remove a block from the clinic calendar"
    }

    async fn execute(&self, action: &StepAction, ctx: &ActionContext) -> Result<ActionOutcome, ActionError> {
        let StepAction::UnblockTime { block_id } = action else {
            return Err(ActionError::mismatch(self.kind(), action));
        };
        debug!(%block_id, "UnblockTimeHandler::execute: called");

        let mut state = ctx.clinic.lock().await;
        let before = state.snapshot.blocks.len();
        state.snapshot.blocks.retain(|b| b.id != *block_id);
        if state.snapshot.blocks.len() == before {
            return Err(ActionError::not_found("block", block_id.as_str()));
        }

        Ok(ActionOutcome::new(format!("Removed {}", block_id)))
    }
}

/// Does nothing; the undo of actions that cannot be taken back
pub struct NoopHandler;

#[async_trait]
impl ActionHandler for NoopHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::Noop
    }

    fn description(&self) -> &'static str {
        "No operation"
    }

    async fn execute(&self, action: &StepAction, _ctx: &ActionContext) -> Result<ActionOutcome, ActionError> {
        let StepAction::Noop { note } = action else {
            return Err(ActionError::mismatch(self.kind(), action));
        };
        debug!(%note, "NoopHandler::execute: called");
        Ok(ActionOutcome::new(note.clone()))
    }
}
