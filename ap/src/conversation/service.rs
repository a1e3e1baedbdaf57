//! ConversationService - session logs plus the reasoner

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use super::messages::SessionError;
use super::reasoner::{AskResponse, Reasoner};
use super::store::SessionStore;
use crate::domain::{ConversationContext, ConversationMessage, MessageData, ResponseType, UserRole};
use crate::events::EventBus;
use crate::planner::PlanningError;

/// Errors from conversation operations
#[derive(Debug, Error)]
pub enum ConversationError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Reasoning failed: {0}")]
    Reasoning(#[from] PlanningError),
}

/// Owns conversation state for every session
#[derive(Clone)]
pub struct ConversationService {
    store: SessionStore,
    reasoner: Arc<dyn Reasoner>,
    events: Arc<EventBus>,
    recent_limit: usize,
}

impl ConversationService {
    pub fn new(store: SessionStore, reasoner: Arc<dyn Reasoner>, events: Arc<EventBus>, recent_limit: usize) -> Self {
        debug!(reasoner = reasoner.name(), recent_limit, "ConversationService::new: called");
        Self {
            store,
            reasoner,
            events,
            recent_limit,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub async fn get_or_create_conversation(
        &self,
        session_id: &str,
        role: UserRole,
        current_page: Option<String>,
    ) -> Result<ConversationContext, ConversationError> {
        Ok(self.store.get_or_create(session_id, role, current_page).await?)
    }

    pub async fn get_conversation(&self, session_id: &str) -> Result<Option<ConversationContext>, ConversationError> {
        Ok(self.store.get(session_id).await?)
    }

    pub async fn add_user_message(
        &self,
        session_id: &str,
        content: &str,
        related_command: Option<String>,
    ) -> Result<ConversationMessage, ConversationError> {
        debug!(%session_id, "ConversationService::add_user_message: called");
        let mut message = ConversationMessage::user(content);
        if let Some(command) = related_command {
            message = message.with_related_command(command);
        }
        self.store.append_message(session_id, message.clone()).await?;
        Ok(message)
    }

    pub async fn add_assistant_message(
        &self,
        session_id: &str,
        message: ConversationMessage,
    ) -> Result<ConversationMessage, ConversationError> {
        debug!(%session_id, response_type = ?message.response_type, "ConversationService::add_assistant_message: called");
        self.store.append_message(session_id, message.clone()).await?;
        if let Some(response_type) = message.response_type {
            self.events.conversational_reply(session_id, response_type);
        }
        Ok(message)
    }

    /// Mark `command` current and push it onto the bounded recent list
    pub async fn record_command(&self, session_id: &str, command: &str) -> Result<(), ConversationError> {
        Ok(self.store.record_command(session_id, command, self.recent_limit).await?)
    }

    pub async fn set_pending_plan(&self, session_id: &str, plan_id: Option<String>) -> Result<(), ConversationError> {
        Ok(self.store.set_pending_plan(session_id, plan_id).await?)
    }

    /// Ask the reasoner about `command` and append its reply, if any
    pub async fn generate_response(
        &self,
        session_id: &str,
        command: &str,
    ) -> Result<Option<ConversationMessage>, ConversationError> {
        debug!(%session_id, %command, "ConversationService::generate_response: called");
        let conversation = self.store.get_required(session_id).await?;
        let Some(reply) = self.reasoner.respond(&conversation, command).await? else {
            return Ok(None);
        };

        let message = ConversationMessage::assistant(reply.content, reply.response_type)
            .with_suggestions(reply.suggestions)
            .with_actions(reply.actions)
            .with_data(reply.data)
            .with_related_command(command);
        info!(%session_id, response_type = %reply.response_type, "Conversational reply");
        self.add_assistant_message(session_id, message).await.map(Some)
    }

    /// Answer a question about clinic data and log both sides
    pub async fn ask(&self, session_id: &str, question: &str) -> Result<ConversationMessage, ConversationError> {
        debug!(%session_id, %question, "ConversationService::ask: called");
        self.add_user_message(session_id, question, None).await?;
        let conversation = self.store.get_required(session_id).await?;
        let AskResponse {
            answer,
            data,
            suggestions,
        } = self.reasoner.ask(question, &conversation).await?;

        let message = ConversationMessage::assistant(answer, ResponseType::Information)
            .with_suggestions(suggestions)
            .with_data(data);
        self.add_assistant_message(session_id, message).await
    }

    /// Log a plan preview for the session; plan events are emitted by the caller
    pub async fn add_plan_message(
        &self,
        session_id: &str,
        content: impl Into<String>,
        response_type: ResponseType,
        plan_id: &str,
        data: MessageData,
    ) -> Result<ConversationMessage, ConversationError> {
        let message = ConversationMessage::assistant(content, response_type)
            .with_related_plan(plan_id)
            .with_data(data);
        self.store.append_message(session_id, message.clone()).await?;
        Ok(message)
    }

    /// Drop the session; returns whether it existed
    pub async fn end_conversation(&self, session_id: &str) -> Result<bool, ConversationError> {
        debug!(%session_id, "ConversationService::end_conversation: called");
        Ok(self.store.end(session_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Clinic;
    use crate::actions::testing::now;
    use crate::conversation::HeuristicReasoner;
    use crate::domain::{ClinicSnapshot, MessageRole};
    use crate::events::ApEvent;

    fn service() -> (ConversationService, Arc<EventBus>) {
        let events = Arc::new(EventBus::new(64));
        let reasoner = HeuristicReasoner::new(Clinic::new(ClinicSnapshot::demo(now()))).at(now());
        let service = ConversationService::new(SessionStore::spawn(), Arc::new(reasoner), events.clone(), 3);
        (service, events)
    }

    #[tokio::test]
    async fn test_generate_response_appends_and_emits() {
        let (service, events) = service();
        let mut rx = events.subscribe();
        service
            .get_or_create_conversation("s1", UserRole::FrontDesk, None)
            .await
            .unwrap();
        service
            .add_user_message("s1", "reschedule appointment", Some("reschedule appointment".into()))
            .await
            .unwrap();

        let reply = service
            .generate_response("s1", "reschedule appointment")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.response_type, Some(ResponseType::Clarification));
        assert!(!reply.actions.is_empty());

        let conversation = service.get_conversation("s1").await.unwrap().unwrap();
        let roles: Vec<MessageRole> = conversation.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![MessageRole::User, MessageRole::Assistant]);

        match rx.recv().await.unwrap() {
            ApEvent::ConversationalReply { response_type, .. } => {
                assert_eq!(response_type, ResponseType::Clarification)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_response_none_for_specific_command() {
        let (service, _) = service();
        service
            .get_or_create_conversation("s1", UserRole::FrontDesk, None)
            .await
            .unwrap();
        let reply = service.generate_response("s1", "reschedule Sarah to thu 2pm").await.unwrap();
        assert!(reply.is_none());
        let conversation = service.get_conversation("s1").await.unwrap().unwrap();
        assert!(conversation.messages.is_empty());
    }

    #[tokio::test]
    async fn test_generate_response_unknown_session() {
        let (service, _) = service();
        let err = service.generate_response("nope", "move it").await.unwrap_err();
        assert!(matches!(err, ConversationError::Session(SessionError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_ask_logs_question_and_answer() {
        let (service, _) = service();
        service
            .get_or_create_conversation("s1", UserRole::Biller, None)
            .await
            .unwrap();
        let answer = service.ask("s1", "how many appointments today?").await.unwrap();
        assert_eq!(answer.content, "There is 1 appointment today.");

        let conversation = service.get_conversation("s1").await.unwrap().unwrap();
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].content, "how many appointments today?");
    }

    #[tokio::test]
    async fn test_record_command_respects_limit() {
        let (service, _) = service();
        service
            .get_or_create_conversation("s1", UserRole::FrontDesk, None)
            .await
            .unwrap();
        for cmd in ["a", "b", "c", "d"] {
            service.record_command("s1", cmd).await.unwrap();
        }
        let conversation = service.get_conversation("s1").await.unwrap().unwrap();
        assert_eq!(conversation.user_context.recent_commands, vec!["b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_end_conversation() {
        let (service, _) = service();
        service
            .get_or_create_conversation("s1", UserRole::FrontDesk, None)
            .await
            .unwrap();
        assert!(service.end_conversation("s1").await.unwrap());
        assert!(!service.end_conversation("s1").await.unwrap());
        assert!(service.get_conversation("s1").await.unwrap().is_none());
    }
}
