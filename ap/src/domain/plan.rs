//! Plan domain type
//!
//! A Plan is an ordered, reversible sequence of steps derived from a command.
//! Plans are created by a [`crate::planner::Planner`] and executed by the
//! [`crate::plan::PlanRunner`].

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::action::StepAction;
use super::id::generate_id;
use super::question::ClarificationQuestion;

/// Errors from plan bookkeeping
#[derive(Debug, Error, PartialEq)]
pub enum PlanError {
    #[error("Invalid plan transition {from} -> {to}")]
    InvalidTransition { from: PlanStatus, to: PlanStatus },

    #[error("Plan {plan_id} needs clarification before it can run")]
    NeedsClarification { plan_id: String },

    #[error("Clarification plan must carry at least one question")]
    EmptyClarification,

    #[error("Invalid question {id}: {reason}")]
    InvalidQuestion { id: String, reason: String },
}

/// Who initiated the plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    #[default]
    User,
    Autopilot,
    System,
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Autopilot => write!(f, "autopilot"),
            Self::System => write!(f, "system"),
        }
    }
}

/// Surface the command came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    #[default]
    Cmdk,
    Drag,
    Kpi,
    Call,
    Scribe,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cmdk => write!(f, "cmdk"),
            Self::Drag => write!(f, "drag"),
            Self::Kpi => write!(f, "kpi"),
            Self::Call => write!(f, "call"),
            Self::Scribe => write!(f, "scribe"),
        }
    }
}

/// Plan lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Created, not yet started
    #[default]
    Pending,
    /// Steps executing
    Running,
    /// Every step succeeded
    Success,
    /// Some steps succeeded before one failed
    Partial,
    /// The first step failed
    Failed,
}

impl PlanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Partial | Self::Failed)
    }

    /// Transitions only move forward: pending -> running -> terminal
    pub fn can_transition_to(&self, next: PlanStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Success)
                | (Self::Running, Self::Partial)
                | (Self::Running, Self::Failed)
        )
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Partial => write!(f, "partial"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Step bookkeeping status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Succeeded,
    Failed,
    Undone,
    UndoFailed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Undone => write!(f, "undone"),
            Self::UndoFailed => write!(f, "undo_failed"),
        }
    }
}

/// One reversible unit of work within a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub label: String,
    pub action: StepAction,
    pub undo: StepAction,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default)]
    pub error: Option<String>,
}

impl Step {
    pub fn new(label: impl Into<String>, action: StepAction, undo: StepAction) -> Self {
        let label = label.into();
        Self {
            id: generate_id("step", &label),
            label,
            action,
            undo,
            status: StepStatus::Pending,
            error: None,
        }
    }

    /// Create with a specific ID (for testing or replay)
    pub fn with_id(id: impl Into<String>, label: impl Into<String>, action: StepAction, undo: StepAction) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            action,
            undo,
            status: StepStatus::Pending,
            error: None,
        }
    }

    /// Only steps that completed are eligible for undo
    pub fn is_completed(&self) -> bool {
        self.status == StepStatus::Succeeded
    }
}

/// An ordered, reversible sequence of steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub actor: Actor,
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rolled_back_at: Option<DateTime<Utc>>,
    /// Questions that must be answered before this plan can run
    #[serde(default)]
    pub clarification_questions: Vec<ClarificationQuestion>,
    /// Which clarification round produced this plan (0 = none)
    #[serde(default)]
    pub clarification_round: u32,
    #[serde(default)]
    pub original_command: Option<String>,
}

impl Plan {
    /// Create an executable plan
    pub fn new(title: impl Into<String>, actor: Actor, source: Source, steps: Vec<Step>) -> Self {
        let title = title.into();
        debug!(%title, step_count = steps.len(), "Plan::new: called");
        Self {
            id: generate_id("plan", &title),
            title,
            actor,
            source,
            steps,
            status: PlanStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            rolled_back_at: None,
            clarification_questions: Vec::new(),
            clarification_round: 0,
            original_command: None,
        }
    }

    /// Create a plan that is blocked on clarification questions
    pub fn needing_clarification(
        title: impl Into<String>,
        actor: Actor,
        source: Source,
        questions: Vec<ClarificationQuestion>,
        original_command: impl Into<String>,
    ) -> Result<Self, PlanError> {
        if questions.is_empty() {
            return Err(PlanError::EmptyClarification);
        }
        let mut seen = HashSet::new();
        for question in &questions {
            question.validate()?;
            if !seen.insert(question.id.as_str()) {
                return Err(PlanError::InvalidQuestion {
                    id: question.id.clone(),
                    reason: "duplicate question id".to_string(),
                });
            }
        }
        let mut plan = Self::new(title, actor, source, Vec::new());
        debug!(plan_id = %plan.id, question_count = questions.len(), "Plan::needing_clarification: called");
        plan.clarification_questions = questions;
        plan.clarification_round = 1;
        plan.original_command = Some(original_command.into());
        Ok(plan)
    }

    pub fn with_original_command(mut self, command: impl Into<String>) -> Self {
        self.original_command = Some(command.into());
        self
    }

    /// Derived from the question list so the two can never disagree
    pub fn needs_clarification(&self) -> bool {
        !self.clarification_questions.is_empty()
    }

    /// Move to the next status, enforcing monotonic transitions
    pub fn set_status(&mut self, next: PlanStatus) -> Result<(), PlanError> {
        debug!(plan_id = %self.id, from = %self.status, to = %next, "Plan::set_status: called");
        if !self.status.can_transition_to(next) {
            return Err(PlanError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        if next == PlanStatus::Running {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        self.status = next;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Steps that completed and have not been undone, in execution order
    pub fn completed_steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(|s| s.is_completed())
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(label: &str) -> Step {
        Step::new(label, StepAction::noop(label), StepAction::noop("undo"))
    }

    #[test]
    fn test_plan_new_is_pending() {
        let plan = Plan::new("Reschedule Sarah", Actor::User, Source::Cmdk, vec![step("a")]);
        assert!(plan.id.contains("-plan-reschedule-sarah"));
        assert_eq!(plan.status, PlanStatus::Pending);
        assert!(!plan.needs_clarification());
        assert!(plan.started_at.is_none());
    }

    #[test]
    fn test_clarification_plan_requires_questions() {
        let err = Plan::needing_clarification("x", Actor::User, Source::Cmdk, vec![], "x").unwrap_err();
        assert_eq!(err, PlanError::EmptyClarification);

        let q = ClarificationQuestion::date_picker("when", "When?");
        let plan = Plan::needing_clarification("x", Actor::User, Source::Cmdk, vec![q], "move it").unwrap();
        assert!(plan.needs_clarification());
        assert_eq!(plan.clarification_round, 1);
        assert_eq!(plan.original_command.as_deref(), Some("move it"));
    }

    #[test]
    fn test_clarification_plan_rejects_invalid_question() {
        let mut q = ClarificationQuestion::text_input("q1", "Who?");
        q.question_type = crate::domain::QuestionType::SingleChoice;
        let err = Plan::needing_clarification("x", Actor::User, Source::Cmdk, vec![q], "x").unwrap_err();
        assert!(matches!(err, PlanError::InvalidQuestion { .. }));
    }

    #[test]
    fn test_clarification_plan_rejects_duplicate_ids() {
        let questions = vec![
            ClarificationQuestion::text_input("q", "Which patient?"),
            ClarificationQuestion::date_picker("q", "Which day?"),
        ];
        let err = Plan::needing_clarification("x", Actor::User, Source::Cmdk, questions, "reschedule").unwrap_err();
        assert_eq!(
            err,
            PlanError::InvalidQuestion {
                id: "q".into(),
                reason: "duplicate question id".into()
            }
        );
    }

    #[test]
    fn test_status_transitions_are_monotonic() {
        let mut plan = Plan::new("t", Actor::User, Source::Cmdk, vec![]);
        assert!(plan.set_status(PlanStatus::Success).is_err());
        plan.set_status(PlanStatus::Running).unwrap();
        assert!(plan.started_at.is_some());
        assert!(plan.set_status(PlanStatus::Pending).is_err());
        plan.set_status(PlanStatus::Partial).unwrap();
        assert!(plan.finished_at.is_some());
        assert!(plan.set_status(PlanStatus::Running).is_err());
        assert!(plan.set_status(PlanStatus::Success).is_err());
    }

    #[test]
    fn test_completed_steps_in_order() {
        let mut plan = Plan::new("t", Actor::User, Source::Cmdk, vec![step("a"), step("b"), step("c")]);
        plan.steps[0].status = StepStatus::Succeeded;
        plan.steps[1].status = StepStatus::Failed;
        plan.steps[2].status = StepStatus::Succeeded;
        let labels: Vec<&str> = plan.completed_steps().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["a", "c"]);
    }

    #[test]
    fn test_plan_serde() {
        let plan = Plan::new("Test Plan", Actor::Autopilot, Source::Kpi, vec![step("a")]);
        let json = serde_json::to_string(&plan).unwrap();
        let back: Plan = serde_json::from_str(&json).unwrap();
        assert_eq!(plan, back);
        assert!(json.contains("\"actor\":\"autopilot\""));
        assert!(json.contains("\"source\":\"kpi\""));
    }
}
