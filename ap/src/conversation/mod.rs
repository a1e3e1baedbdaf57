//! Conversational layer
//!
//! Per-session message logs live in the [`SessionStore`] actor. The
//! [`ConversationService`] pairs it with a [`Reasoner`] that turns vague
//! commands into suggestions and answers questions about clinic data.

mod llm;
mod messages;
mod reasoner;
mod service;
mod store;

pub use llm::LlmReasoner;
pub use messages::{SessionCommand, SessionError, SessionResponse};
pub use reasoner::{AskResponse, HeuristicReasoner, Reasoner, ReasonerReply};
pub use service::{ConversationError, ConversationService};
pub use store::SessionStore;
