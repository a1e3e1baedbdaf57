//! Domain types for Autopilot
//!
//! Core domain types: Plan, Step, StepAction, ClarificationQuestion,
//! ConversationMessage/ConversationContext, AuditEvent and the clinic snapshot.
//! Cross-component references are by ID (plan_id, session_id), never live handles.

mod action;
mod audit;
mod clinic;
mod id;
mod message;
mod plan;
mod question;

pub use action::{ActionKind, NotifyChannel, StepAction, format_cents};
pub use audit::{AuditEvent, AuditKind};
pub use clinic::{
    Appointment, AppointmentStatus, ClinicSnapshot, InsurancePolicy, Invoice, InvoiceStatus, Patient, TimeBlock,
    format_slot,
};
pub use id::{generate_id, slugify};
pub use message::{
    ConversationContext, ConversationMessage, MessageAction, MessageData, MessageRole, ResponseType, UserContext,
    UserRole,
};
pub use plan::{Actor, Plan, PlanError, PlanStatus, Source, Step, StepStatus};
pub use question::{ClarificationQuestion, QuestionContext, QuestionType};
