//! ActionExecutor - routes step actions to their handlers

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use super::builtin::{
    BlockTimeHandler, CreateInvoiceHandler, MoveAppointmentHandler, NoopHandler, NotifyPatientHandler,
    SendReminderHandler, SetAppointmentStatusHandler, SetInvoiceStatusHandler, UnblockTimeHandler,
    VerifyInsuranceHandler,
};
use super::{ActionContext, ActionError, ActionHandler, ActionOutcome};
use crate::domain::{ActionKind, StepAction};

/// Registry of action handlers keyed by action kind
pub struct ActionExecutor {
    handlers: HashMap<ActionKind, Box<dyn ActionHandler>>,
}

impl ActionExecutor {
    /// Create executor with every built-in clinic handler
    pub fn standard() -> Self {
        debug!("ActionExecutor::standard: called");
        let mut executor = Self::empty();
        executor.add_handler(Box::new(MoveAppointmentHandler));
        executor.add_handler(Box::new(SetAppointmentStatusHandler));
        executor.add_handler(Box::new(NotifyPatientHandler));
        executor.add_handler(Box::new(SendReminderHandler));
        executor.add_handler(Box::new(VerifyInsuranceHandler));
        executor.add_handler(Box::new(CreateInvoiceHandler));
        executor.add_handler(Box::new(SetInvoiceStatusHandler));
        executor.add_handler(Box::new(BlockTimeHandler));
        executor.add_handler(Box::new(UnblockTimeHandler));
        executor.add_handler(Box::new(NoopHandler));
        executor
    }

    /// Create an empty executor (for testing)
    pub fn empty() -> Self {
        debug!("ActionExecutor::empty: called");
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Add a handler, replacing any existing handler for the same kind
    pub fn add_handler(&mut self, handler: Box<dyn ActionHandler>) {
        debug!(kind = %handler.kind(), "ActionExecutor::add_handler: called");
        self.handlers.insert(handler.kind(), handler);
    }

    /// Apply an action
    pub async fn execute(&self, action: &StepAction, ctx: &ActionContext) -> Result<ActionOutcome, ActionError> {
        let kind = action.kind();
        debug!(%kind, plan_id = ?ctx.plan_id, "ActionExecutor::execute: called");
        match self.handlers.get(&kind) {
            Some(handler) => handler.execute(action, ctx).await,
            None => {
                debug!("ActionExecutor::execute: unknown action");
                Err(ActionError::UnknownAction { kind })
            }
        }
    }

    /// Apply an action, failing with [`ActionError::Timeout`] if it runs too long
    pub async fn execute_with_timeout(
        &self,
        action: &StepAction,
        ctx: &ActionContext,
        timeout: Option<Duration>,
    ) -> Result<ActionOutcome, ActionError> {
        let Some(limit) = timeout else {
            return self.execute(action, ctx).await;
        };
        match tokio::time::timeout(limit, self.execute(action, ctx)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(timeout_ms = limit.as_millis() as u64, "ActionExecutor::execute_with_timeout: timed out");
                Err(ActionError::Timeout {
                    timeout_ms: limit.as_millis() as u64,
                })
            }
        }
    }

    pub fn has_handler(&self, kind: ActionKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// (kind, description) pairs for every registered handler
    pub fn descriptions(&self) -> Vec<(ActionKind, &'static str)> {
        let mut out: Vec<_> = self.handlers.values().map(|h| (h.kind(), h.description())).collect();
        out.sort_by_key(|(kind, _)| kind.to_string());
        out
    }
}

impl Default for ActionExecutor {
    fn default() -> Self {
        Self::standard()
    }
}
