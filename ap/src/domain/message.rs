//! Conversation message and context types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::clinic::Appointment;
use super::id::generate_id;

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// What an assistant message is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Clarification,
    Suggestion,
    Confirmation,
    Information,
    Error,
    Success,
}

impl std::fmt::Display for ResponseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Clarification => write!(f, "clarification"),
            Self::Suggestion => write!(f, "suggestion"),
            Self::Confirmation => write!(f, "confirmation"),
            Self::Information => write!(f, "information"),
            Self::Error => write!(f, "error"),
            Self::Success => write!(f, "success"),
        }
    }
}

/// A button the UI can render; pressing it submits `command`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageAction {
    pub label: String,
    pub command: String,
}

impl MessageAction {
    pub fn new(label: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            command: command.into(),
        }
    }
}

/// Structured payload attached to a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageData {
    /// Preview of a freshly created plan
    PlanPreview {
        plan_id: String,
        title: String,
        step_labels: Vec<String>,
    },
    /// Appointments referenced by an answer
    Appointments { appointments: Vec<Appointment> },
    /// A computed figure, e.g. an appointment count
    Figure { label: String, value: i64 },
    #[default]
    None,
}

/// One entry in a conversation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub response_type: Option<ResponseType>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub actions: Vec<MessageAction>,
    #[serde(default)]
    pub data: MessageData,
    #[serde(default)]
    pub related_command: Option<String>,
    #[serde(default)]
    pub related_plan_id: Option<String>,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::User, content.into())
    }

    pub fn assistant(content: impl Into<String>, response_type: ResponseType) -> Self {
        let mut message = Self::with_role(MessageRole::Assistant, content.into());
        message.response_type = Some(response_type);
        message
    }

    fn with_role(role: MessageRole, content: String) -> Self {
        debug!(?role, content_len = content.len(), "ConversationMessage::with_role: called");
        Self {
            id: generate_id("msg", ""),
            role,
            content,
            timestamp: Utc::now(),
            response_type: None,
            suggestions: Vec::new(),
            actions: Vec::new(),
            data: MessageData::None,
            related_command: None,
            related_plan_id: None,
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn with_actions(mut self, actions: Vec<MessageAction>) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_data(mut self, data: MessageData) -> Self {
        self.data = data;
        self
    }

    pub fn with_related_command(mut self, command: impl Into<String>) -> Self {
        self.related_command = Some(command.into());
        self
    }

    pub fn with_related_plan(mut self, plan_id: impl Into<String>) -> Self {
        self.related_plan_id = Some(plan_id.into());
        self
    }
}

/// Role of the signed-in staff member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    FrontDesk,
    Provider,
    Biller,
    Admin,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FrontDesk => write!(f, "front_desk"),
            Self::Provider => write!(f, "provider"),
            Self::Biller => write!(f, "biller"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// Who is talking and where they are
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct UserContext {
    pub role: UserRole,
    /// Most recent commands, newest last
    #[serde(default)]
    pub recent_commands: Vec<String>,
    #[serde(default)]
    pub current_page: Option<String>,
}

/// Per-session conversation state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub session_id: String,
    /// Append-only, chronological
    pub messages: Vec<ConversationMessage>,
    #[serde(default)]
    pub current_command: Option<String>,
    #[serde(default)]
    pub pending_plan_id: Option<String>,
    pub user_context: UserContext,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationContext {
    pub fn new(session_id: impl Into<String>, role: UserRole, current_page: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            current_command: None,
            pending_plan_id: None,
            user_context: UserContext {
                role,
                recent_commands: Vec::new(),
                current_page,
            },
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message; the log is never reordered
    pub fn push_message(&mut self, message: ConversationMessage) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    /// Record a command as current and keep at most `limit` recent ones
    pub fn record_command(&mut self, command: impl Into<String>, limit: usize) {
        let command = command.into();
        self.current_command = Some(command.clone());
        self.user_context.recent_commands.push(command);
        let len = self.user_context.recent_commands.len();
        if len > limit {
            self.user_context.recent_commands.drain(..len - limit);
        }
        self.updated_at = Utc::now();
    }

    pub fn last_message(&self) -> Option<&ConversationMessage> {
        self.messages.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assistant_message_has_response_type() {
        let msg = ConversationMessage::assistant("Which patient?", ResponseType::Clarification)
            .with_suggestions(vec!["Sarah Johnson".into()]);
        assert_eq!(msg.role, MessageRole::Assistant);
        assert_eq!(msg.response_type, Some(ResponseType::Clarification));
        assert_eq!(msg.suggestions.len(), 1);
    }

    #[test]
    fn test_user_message_ids_unique() {
        let a = ConversationMessage::user("a");
        let b = ConversationMessage::user("a");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_push_message_preserves_order() {
        let mut ctx = ConversationContext::new("s1", UserRole::FrontDesk, None);
        ctx.push_message(ConversationMessage::user("one"));
        ctx.push_message(ConversationMessage::assistant("two", ResponseType::Information));
        ctx.push_message(ConversationMessage::user("three"));
        let contents: Vec<&str> = ctx.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_record_command_bounded() {
        let mut ctx = ConversationContext::new("s1", UserRole::Admin, Some("calendar".into()));
        for i in 0..5 {
            ctx.record_command(format!("cmd {}", i), 3);
        }
        assert_eq!(ctx.user_context.recent_commands, vec!["cmd 2", "cmd 3", "cmd 4"]);
        assert_eq!(ctx.current_command.as_deref(), Some("cmd 4"));
    }

    #[test]
    fn test_message_data_serde_tag() {
        let data = MessageData::Figure {
            label: "appointments today".into(),
            value: 4,
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["kind"], "figure");
        assert_eq!(json["value"], 4);
    }
}
