//! Session store messages
//!
//! Commands and responses for the actor pattern.

use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{ConversationContext, ConversationMessage, UserRole};

/// Errors from session operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Channel error")]
    ChannelError,
}

/// Response from session operations
pub type SessionResponse<T> = Result<T, SessionError>;

/// Commands sent to the SessionStore actor
#[derive(Debug)]
pub enum SessionCommand {
    GetOrCreate {
        session_id: String,
        role: UserRole,
        current_page: Option<String>,
        reply: oneshot::Sender<ConversationContext>,
    },
    Get {
        session_id: String,
        reply: oneshot::Sender<Option<ConversationContext>>,
    },
    AppendMessage {
        session_id: String,
        message: ConversationMessage,
        reply: oneshot::Sender<SessionResponse<()>>,
    },
    RecordCommand {
        session_id: String,
        command: String,
        limit: usize,
        reply: oneshot::Sender<SessionResponse<()>>,
    },
    SetPendingPlan {
        session_id: String,
        plan_id: Option<String>,
        reply: oneshot::Sender<SessionResponse<()>>,
    },
    End {
        session_id: String,
        reply: oneshot::Sender<bool>,
    },
    List {
        reply: oneshot::Sender<Vec<String>>,
    },

    // Shutdown
    Shutdown,
}
