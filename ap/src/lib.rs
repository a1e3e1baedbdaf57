//! Autopilot - clinic command bar core
//!
//! Autopilot turns free-text commands typed into a clinic's command bar into
//! reversible plans, structured clarification questions or conversational
//! replies.
//!
//! # Core Concepts
//!
//! - **Plans are data**: every step carries a tagged action and its undo action
//! - **Rollback in reverse**: completed steps are undone last-first, failures recorded
//! - **Ask, don't guess**: ambiguous commands become questions or suggestions
//! - **Bounded clarification**: answers enrich the command, at most N rounds
//!
//! # Modules
//!
//! - [`domain`] - Plans, steps, questions, messages and the clinic snapshot
//! - [`actions`] - Step action handlers over the in-memory clinic
//! - [`plan`] - Plan runner with rollback
//! - [`clarification`] - Answer validation and command enrichment
//! - [`planner`] - Rule-based and LLM planners
//! - [`conversation`] - Session store and reasoners
//! - [`dispatch`] - Command dispatch
//! - [`events`] - Event bus, JSONL logger and audit log
//! - [`config`] - Configuration types and loading

pub mod actions;
pub mod app;
pub mod clarification;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod dispatch;
pub mod domain;
pub mod events;
pub mod llm;
pub mod plan;
pub mod planner;
pub mod prompts;
pub mod repl;

// Re-export commonly used types
pub use app::Autopilot;
pub use clarification::{Answer, Answers, ValidationError, enrich_command, validate_answers};
pub use config::Config;
pub use conversation::{ConversationService, HeuristicReasoner, LlmReasoner, Reasoner, SessionError, SessionStore};
pub use dispatch::{AmbiguityDetector, DispatchError, DispatchOutcome, Dispatcher, DispatcherConfig, KeywordDetector};
pub use domain::{
    Actor, ClarificationQuestion, ClinicSnapshot, ConversationContext, ConversationMessage, Plan, PlanStatus,
    QuestionType, Source, Step, StepAction, StepStatus,
};
pub use events::{ApEvent, AuditLog, EventBus};
pub use llm::{AnthropicClient, LlmClient, LlmError, create_client};
pub use plan::{PlanRunner, RollbackReport, RunReport, StepExecutionError};
pub use planner::{LlmPlanner, PlanContext, Planner, PlanningError, RulePlanner};
