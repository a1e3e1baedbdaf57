//! Planner trait and the context handed to it

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::PlanningError;
use crate::domain::{Actor, ClinicSnapshot, Plan, Source, UserRole};

/// Everything a planner may look at besides the command text
#[derive(Debug, Clone)]
pub struct PlanContext {
    pub actor: Actor,
    pub source: Source,
    pub role: UserRole,
    /// Plans made in autopilot mode are attributed to the autopilot actor
    pub autopilot_mode: bool,
    pub now: DateTime<Utc>,
    pub snapshot: ClinicSnapshot,
    pub recent_commands: Vec<String>,
    pub current_page: Option<String>,
}

impl PlanContext {
    pub fn new(now: DateTime<Utc>, snapshot: ClinicSnapshot) -> Self {
        Self {
            actor: Actor::User,
            source: Source::Cmdk,
            role: UserRole::FrontDesk,
            autopilot_mode: false,
            now,
            snapshot,
            recent_commands: Vec::new(),
            current_page: None,
        }
    }

    pub fn with_role(mut self, role: UserRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }

    pub fn with_autopilot(mut self, autopilot_mode: bool) -> Self {
        self.autopilot_mode = autopilot_mode;
        self
    }

    pub fn with_recent_commands(mut self, commands: Vec<String>) -> Self {
        self.recent_commands = commands;
        self
    }

    pub fn with_page(mut self, page: Option<String>) -> Self {
        self.current_page = page;
        self
    }

    /// Actor recorded on plans made in this context
    pub fn plan_actor(&self) -> Actor {
        if self.autopilot_mode { Actor::Autopilot } else { self.actor }
    }
}

/// Turns a command into a plan
///
/// Returns `Ok(None)` when the command does not describe any clinic action.
#[async_trait]
pub trait Planner: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create_plan(&self, text: &str, ctx: &PlanContext) -> Result<Option<Plan>, PlanningError>;
}
