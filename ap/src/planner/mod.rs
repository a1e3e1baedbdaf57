//! Planners: turn command text into plans
//!
//! [`RulePlanner`] is the offline, deterministic planner. [`LlmPlanner`]
//! delegates to a tool-calling model. Both derive each step's undo action
//! locally from the snapshot.

mod error;
mod llm;
mod rules;
pub mod time;
mod traits;
mod undo;

pub use error::PlanningError;
pub use llm::LlmPlanner;
pub use rules::RulePlanner;
pub use traits::{PlanContext, Planner};
pub use undo::{compensate, normalize};
