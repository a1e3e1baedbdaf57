//! LlmReasoner - conversational replies through a tool-calling model

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::reasoner::{AskResponse, Reasoner, ReasonerReply};
use crate::actions::Clinic;
use crate::domain::{ConversationContext, MessageData, ResponseType};
use crate::llm::{CompletionRequest, CompletionResponse, LlmClient, Message, ToolDefinition};
use crate::planner::PlanningError;
use crate::prompts::{PromptContext, PromptLoader};

const REPLY: &str = "reply";

#[derive(Debug, Deserialize)]
struct ReplyInput {
    message: String,
    #[serde(default)]
    response_type: Option<ResponseType>,
    #[serde(default)]
    suggestions: Vec<String>,
    /// The command is specific enough to plan as-is
    #[serde(default)]
    proceed: bool,
}

/// Reasoner backed by an [`LlmClient`]; every call forces the `reply` tool
pub struct LlmReasoner {
    client: Arc<dyn LlmClient>,
    prompts: PromptLoader,
    clinic: Clinic,
    max_tokens: u32,
}

impl LlmReasoner {
    pub fn new(client: Arc<dyn LlmClient>, prompts: PromptLoader, clinic: Clinic, max_tokens: u32) -> Self {
        debug!(max_tokens, "LlmReasoner::new: called");
        Self {
            client,
            prompts,
            clinic,
            max_tokens,
        }
    }

    fn reply_tool() -> ToolDefinition {
        ToolDefinition::new(
            REPLY,
            "Reply to the user",
            json!({
                "type": "object",
                "properties": {
                    "message": {"type": "string"},
                    "response_type": {
                        "type": "string",
                        "enum": ["clarification", "suggestion", "confirmation", "information", "error", "success"]
                    },
                    "suggestions": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Complete commands the user could run next"
                    },
                    "proceed": {
                        "type": "boolean",
                        "description": "True when the command is specific enough to act on without a reply"
                    }
                },
                "required": ["message"]
            }),
        )
    }

    async fn call(
        &self,
        template: &str,
        conversation: &ConversationContext,
        text: &str,
    ) -> Result<ReplyInput, PlanningError> {
        let snapshot = self.clinic.snapshot().await;
        let prompt_ctx = PromptContext::new(Utc::now(), conversation.user_context.role, &snapshot)
            .with_page(conversation.user_context.current_page.clone())
            .with_recent_commands(&conversation.user_context.recent_commands)
            .with_transcript(&conversation.messages);
        let system_prompt = self
            .prompts
            .render(template, &prompt_ctx)
            .map_err(|e| PlanningError::Prompt(e.to_string()))?;

        let request = CompletionRequest {
            system_prompt,
            messages: vec![Message::user(text)],
            tools: vec![Self::reply_tool()],
            tool_choice: Some(REPLY.to_string()),
            max_tokens: self.max_tokens,
        };
        let response = self.client.complete(request).await?;
        parse_reply(&response)
    }
}

fn parse_reply(response: &CompletionResponse) -> Result<ReplyInput, PlanningError> {
    match response.first_tool_call() {
        Some(call) if call.name == REPLY => serde_json::from_value(call.input.clone())
            .map_err(|e| PlanningError::InvalidProposal(format!("bad reply input: {}", e))),
        Some(call) => Err(PlanningError::InvalidProposal(format!("unknown tool {}", call.name))),
        None => match response.content.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => Ok(ReplyInput {
                message: text.to_string(),
                response_type: None,
                suggestions: Vec::new(),
                proceed: false,
            }),
            _ => Err(PlanningError::InvalidProposal("empty reply".to_string())),
        },
    }
}

#[async_trait]
impl Reasoner for LlmReasoner {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn ask(&self, text: &str, conversation: &ConversationContext) -> Result<AskResponse, PlanningError> {
        debug!(%text, "LlmReasoner::ask: called");
        let reply = self.call("ask", conversation, text).await?;
        Ok(AskResponse {
            answer: reply.message,
            data: MessageData::None,
            suggestions: reply.suggestions,
        })
    }

    async fn respond(
        &self,
        conversation: &ConversationContext,
        command: &str,
    ) -> Result<Option<ReasonerReply>, PlanningError> {
        debug!(%command, "LlmReasoner::respond: called");
        let reply = self.call("reasoner", conversation, command).await?;
        if reply.proceed {
            debug!("LlmReasoner::respond: model chose to proceed");
            return Ok(None);
        }
        let response_type = reply.response_type.unwrap_or(ResponseType::Suggestion);
        Ok(Some(
            ReasonerReply::new(reply.message, response_type).with_suggestions(reply.suggestions),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ClinicSnapshot, ConversationMessage, UserRole};
    use crate::llm::client::mock::MockLlmClient;

    fn reasoner(responses: Vec<CompletionResponse>) -> (LlmReasoner, Arc<MockLlmClient>) {
        let client = Arc::new(MockLlmClient::new(responses));
        let clinic = Clinic::new(ClinicSnapshot::demo(Utc::now()));
        let reasoner = LlmReasoner::new(client.clone(), PromptLoader::embedded_only(), clinic, 512);
        (reasoner, client)
    }

    fn conversation() -> ConversationContext {
        let mut ctx = ConversationContext::new("s1", UserRole::FrontDesk, Some("calendar".into()));
        ctx.push_message(ConversationMessage::user("reschedule appointment"));
        ctx
    }

    #[tokio::test]
    async fn test_respond_forces_reply_tool() {
        let (reasoner, client) = reasoner(vec![CompletionResponse::tool_call(
            REPLY,
            json!({
                "message": "Whose appointment should I move?",
                "response_type": "clarification",
                "suggestions": ["reschedule Sarah Johnson to thursday 2pm"]
            }),
        )]);

        let reply = reasoner
            .respond(&conversation(), "reschedule appointment")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.response_type, ResponseType::Clarification);
        assert_eq!(reply.actions[0].command, "reschedule Sarah Johnson to thursday 2pm");

        let request = &client.requests()[0];
        assert_eq!(request.tool_choice.as_deref(), Some(REPLY));
        assert!(request.system_prompt.contains("User: reschedule appointment"));
        assert!(request.system_prompt.contains("calendar page"));
    }

    #[tokio::test]
    async fn test_respond_proceed_yields_none() {
        let (reasoner, _) = reasoner(vec![CompletionResponse::tool_call(
            REPLY,
            json!({"message": "ok", "proceed": true}),
        )]);
        assert!(reasoner.respond(&conversation(), "confirm Sarah").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ask_uses_ask_template() {
        let (reasoner, client) = reasoner(vec![CompletionResponse::tool_call(
            REPLY,
            json!({"message": "Emily Davis owes $120.00."}),
        )]);
        let response = reasoner.ask("what does Emily owe?", &conversation()).await.unwrap();
        assert_eq!(response.answer, "Emily Davis owes $120.00.");
        assert!(client.requests()[0].system_prompt.contains("## Open invoices"));
    }

    #[tokio::test]
    async fn test_plain_text_falls_back_to_message() {
        let (reasoner, _) = reasoner(vec![CompletionResponse::text("Try naming the patient.")]);
        let reply = reasoner.respond(&conversation(), "move it").await.unwrap().unwrap();
        assert_eq!(reply.content, "Try naming the patient.");
        assert_eq!(reply.response_type, ResponseType::Suggestion);
    }

    #[tokio::test]
    async fn test_bad_input_is_invalid_proposal() {
        let (reasoner, _) = reasoner(vec![CompletionResponse::tool_call(REPLY, json!({"suggestions": []}))]);
        let err = reasoner.ask("hi", &conversation()).await.unwrap_err();
        assert!(matches!(err, PlanningError::InvalidProposal(_)));
    }
}
