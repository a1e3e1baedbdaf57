//! Event types for Autopilot activity streaming
//!
//! Events cover the command lifecycle (received, reply, plan created,
//! clarification requested) and plan execution (steps run, undone, finished).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{PlanStatus, ResponseType};

/// Core event enum - the vocabulary of Autopilot activity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ApEvent {
    // === Dispatch ===
    /// A command arrived at the dispatcher
    CommandReceived { session_id: String, command: String },
    /// The conversational layer answered instead of planning
    ConversationalReply {
        session_id: String,
        response_type: ResponseType,
    },
    /// A plan was created
    PlanCreated {
        plan_id: String,
        title: String,
        step_count: usize,
    },
    /// A plan is blocked on questions
    ClarificationRequested {
        plan_id: String,
        round: u32,
        question_ids: Vec<String>,
    },

    // === Execution ===
    PlanStarted { plan_id: String, step_count: usize },
    StepCompleted {
        plan_id: String,
        step_id: String,
        label: String,
        summary: String,
    },
    StepFailed {
        plan_id: String,
        step_id: String,
        label: String,
        error: String,
    },
    PlanFinished { plan_id: String, status: PlanStatus },

    // === Rollback ===
    StepUndone {
        plan_id: String,
        step_id: String,
        label: String,
    },
    UndoFailed {
        plan_id: String,
        step_id: String,
        error: String,
    },
    PlanRolledBack {
        plan_id: String,
        undone: usize,
        failed: usize,
    },

    /// Something went wrong outside a plan
    Warning { stream_id: String, message: String },
}

impl ApEvent {
    /// Plan ID for plan events, session ID for dispatch events
    pub fn stream_id(&self) -> &str {
        match self {
            ApEvent::CommandReceived { session_id, .. } | ApEvent::ConversationalReply { session_id, .. } => {
                session_id
            }
            ApEvent::PlanCreated { plan_id, .. }
            | ApEvent::ClarificationRequested { plan_id, .. }
            | ApEvent::PlanStarted { plan_id, .. }
            | ApEvent::StepCompleted { plan_id, .. }
            | ApEvent::StepFailed { plan_id, .. }
            | ApEvent::PlanFinished { plan_id, .. }
            | ApEvent::StepUndone { plan_id, .. }
            | ApEvent::UndoFailed { plan_id, .. }
            | ApEvent::PlanRolledBack { plan_id, .. } => plan_id,
            ApEvent::Warning { stream_id, .. } => stream_id,
        }
    }

    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            ApEvent::CommandReceived { .. } => "CommandReceived",
            ApEvent::ConversationalReply { .. } => "ConversationalReply",
            ApEvent::PlanCreated { .. } => "PlanCreated",
            ApEvent::ClarificationRequested { .. } => "ClarificationRequested",
            ApEvent::PlanStarted { .. } => "PlanStarted",
            ApEvent::StepCompleted { .. } => "StepCompleted",
            ApEvent::StepFailed { .. } => "StepFailed",
            ApEvent::PlanFinished { .. } => "PlanFinished",
            ApEvent::StepUndone { .. } => "StepUndone",
            ApEvent::UndoFailed { .. } => "UndoFailed",
            ApEvent::PlanRolledBack { .. } => "PlanRolledBack",
            ApEvent::Warning { .. } => "Warning",
        }
    }

    /// True for the last event a plan stream normally produces
    pub fn closes_stream(&self) -> bool {
        match self {
            ApEvent::PlanRolledBack { .. } => true,
            ApEvent::PlanFinished { status, .. } => *status == PlanStatus::Success,
            _ => false,
        }
    }
}

/// Wrapper for JSONL serialization with timestamp
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventLogEntry {
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    pub event: ApEvent,
}

impl EventLogEntry {
    /// Create a new log entry with current timestamp
    pub fn new(event: ApEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}
