//! Event Bus - central pub/sub system for Autopilot events
//!
//! Components emit events; consumers (REPL, JSONL logger) subscribe.

use tokio::sync::broadcast;
use tracing::debug;

use super::types::ApEvent;
use crate::domain::{PlanStatus, ResponseType};

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1_024;

/// Central event bus
pub struct EventBus {
    tx: broadcast::Sender<ApEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// Fire-and-forget: with no subscribers the event is dropped.
    pub fn emit(&self, event: ApEvent) {
        debug!(
            event_type = event.event_type(),
            stream_id = event.stream_id(),
            "EventBus::emit"
        );
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<ApEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Create an emitter bound to a plan
    pub fn emitter_for(&self, plan_id: impl Into<String>) -> EventEmitter {
        let plan_id = plan_id.into();
        debug!(%plan_id, "EventBus::emitter_for: creating emitter");
        EventEmitter {
            tx: self.tx.clone(),
            plan_id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    // === Dispatch events (keyed by session) ===

    pub fn command_received(&self, session_id: &str, command: &str) {
        self.emit(ApEvent::CommandReceived {
            session_id: session_id.to_string(),
            command: command.to_string(),
        });
    }

    pub fn conversational_reply(&self, session_id: &str, response_type: ResponseType) {
        self.emit(ApEvent::ConversationalReply {
            session_id: session_id.to_string(),
            response_type,
        });
    }

    pub fn warning(&self, stream_id: &str, message: impl Into<String>) {
        self.emit(ApEvent::Warning {
            stream_id: stream_id.to_string(),
            message: message.into(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Handle for emitting events about one plan without owning the bus
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<ApEvent>,
    plan_id: String,
}

impl EventEmitter {
    pub fn plan_id(&self) -> &str {
        &self.plan_id
    }

    pub fn emit(&self, event: ApEvent) {
        debug!(event_type = event.event_type(), "EventEmitter::emit");
        let _ = self.tx.send(event);
    }

    // === Convenience methods ===

    pub fn plan_created(&self, title: &str, step_count: usize) {
        self.emit(ApEvent::PlanCreated {
            plan_id: self.plan_id.clone(),
            title: title.to_string(),
            step_count,
        });
    }

    pub fn clarification_requested(&self, round: u32, question_ids: Vec<String>) {
        self.emit(ApEvent::ClarificationRequested {
            plan_id: self.plan_id.clone(),
            round,
            question_ids,
        });
    }

    pub fn plan_started(&self, step_count: usize) {
        self.emit(ApEvent::PlanStarted {
            plan_id: self.plan_id.clone(),
            step_count,
        });
    }

    pub fn step_completed(&self, step_id: &str, label: &str, summary: &str) {
        self.emit(ApEvent::StepCompleted {
            plan_id: self.plan_id.clone(),
            step_id: step_id.to_string(),
            label: label.to_string(),
            summary: summary.to_string(),
        });
    }

    pub fn step_failed(&self, step_id: &str, label: &str, error: &str) {
        self.emit(ApEvent::StepFailed {
            plan_id: self.plan_id.clone(),
            step_id: step_id.to_string(),
            label: label.to_string(),
            error: error.to_string(),
        });
    }

    pub fn plan_finished(&self, status: PlanStatus) {
        self.emit(ApEvent::PlanFinished {
            plan_id: self.plan_id.clone(),
            status,
        });
    }

    pub fn step_undone(&self, step_id: &str, label: &str) {
        self.emit(ApEvent::StepUndone {
            plan_id: self.plan_id.clone(),
            step_id: step_id.to_string(),
            label: label.to_string(),
        });
    }

    pub fn undo_failed(&self, step_id: &str, error: &str) {
        self.emit(ApEvent::UndoFailed {
            plan_id: self.plan_id.clone(),
            step_id: step_id.to_string(),
            error: error.to_string(),
        });
    }

    pub fn plan_rolled_back(&self, undone: usize, failed: usize) {
        self.emit(ApEvent::PlanRolledBack {
            plan_id: self.plan_id.clone(),
            undone,
            failed,
        });
    }
}
