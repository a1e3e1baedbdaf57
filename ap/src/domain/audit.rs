//! Audit event domain type
//!
//! An AuditEvent is an immutable record of something the system did to the
//! clinic. Events carry the action descriptors needed to undo or redo them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::action::StepAction;
use super::id::generate_id;
use super::plan::{Actor, Source};

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    StepCompleted,
    StepFailed,
    StepUndone,
    UndoFailed,
    PlanFinished,
    PlanRolledBack,
}

impl std::fmt::Display for AuditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StepCompleted => write!(f, "step_completed"),
            Self::StepFailed => write!(f, "step_failed"),
            Self::StepUndone => write!(f, "step_undone"),
            Self::UndoFailed => write!(f, "undo_failed"),
            Self::PlanFinished => write!(f, "plan_finished"),
            Self::PlanRolledBack => write!(f, "plan_rolled_back"),
        }
    }
}

/// Immutable audit record; fields are private so it cannot change after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    id: String,
    at: DateTime<Utc>,
    actor: Actor,
    source: Source,
    kind: AuditKind,
    plan_id: String,
    step_id: Option<String>,
    summary: String,
    undo: Option<StepAction>,
    redo: Option<StepAction>,
}

impl AuditEvent {
    pub fn new(actor: Actor, source: Source, kind: AuditKind, plan_id: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            id: generate_id("evt", &kind.to_string()),
            at: Utc::now(),
            actor,
            source,
            kind,
            plan_id: plan_id.into(),
            step_id: None,
            summary: summary.into(),
            undo: None,
            redo: None,
        }
    }

    pub fn for_step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }

    pub fn with_undo(mut self, undo: StepAction) -> Self {
        self.undo = Some(undo);
        self
    }

    pub fn with_redo(mut self, redo: StepAction) -> Self {
        self.redo = Some(redo);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }

    pub fn actor(&self) -> Actor {
        self.actor
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn kind(&self) -> AuditKind {
        self.kind
    }

    pub fn plan_id(&self) -> &str {
        &self.plan_id
    }

    pub fn step_id(&self) -> Option<&str> {
        self.step_id.as_deref()
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn undo(&self) -> Option<&StepAction> {
        self.undo.as_ref()
    }

    pub fn redo(&self) -> Option<&StepAction> {
        self.redo.as_ref()
    }
}
