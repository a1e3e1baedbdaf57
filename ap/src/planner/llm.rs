//! LlmPlanner - planning through a tool-calling model

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::error::PlanningError;
use super::traits::{PlanContext, Planner};
use super::undo::{compensate, normalize};
use crate::domain::{ClarificationQuestion, Plan, Step, StepAction};
use crate::llm::{CompletionRequest, LlmClient, Message, StopReason, ToolDefinition};
use crate::prompts::{PromptContext, PromptLoader};

const PROPOSE_PLAN: &str = "propose_plan";
const REQUEST_CLARIFICATION: &str = "request_clarification";
const NO_ACTION: &str = "no_action";

#[derive(Debug, Deserialize)]
struct ProposedPlan {
    title: String,
    steps: Vec<ProposedStep>,
}

#[derive(Debug, Deserialize)]
struct ProposedStep {
    label: String,
    action: StepAction,
}

#[derive(Debug, Deserialize)]
struct ProposedClarification {
    title: String,
    questions: Vec<ClarificationQuestion>,
}

#[derive(Debug, Deserialize)]
struct NoActionInput {
    #[serde(default)]
    reason: String,
}

/// Planner backed by an [`LlmClient`]
///
/// The model picks exactly one of three tools. Proposed actions are checked
/// against the snapshot and their undo actions are derived locally; the
/// model never supplies compensation.
pub struct LlmPlanner {
    client: Arc<dyn LlmClient>,
    prompts: PromptLoader,
    max_tokens: u32,
}

impl LlmPlanner {
    pub fn new(client: Arc<dyn LlmClient>, prompts: PromptLoader, max_tokens: u32) -> Self {
        debug!(max_tokens, "LlmPlanner::new: called");
        Self {
            client,
            prompts,
            max_tokens,
        }
    }

    fn tools() -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new(
                PROPOSE_PLAN,
                "Propose an ordered list of clinic actions that carry out the command",
                json!({
                    "type": "object",
                    "properties": {
                        "title": {"type": "string", "description": "Short plan title"},
                        "steps": {
                            "type": "array",
                            "minItems": 1,
                            "items": {
                                "type": "object",
                                "properties": {
                                    "label": {"type": "string"},
                                    "action": {
                                        "type": "object",
                                        "description": "Action with a `kind` of move_appointment, set_appointment_status, notify_patient, send_reminder, verify_insurance, create_invoice, set_invoice_status, block_time, unblock_time or noop, plus that kind's fields",
                                        "properties": {"kind": {"type": "string"}},
                                        "required": ["kind"]
                                    }
                                },
                                "required": ["label", "action"]
                            }
                        }
                    },
                    "required": ["title", "steps"]
                }),
            ),
            ToolDefinition::new(
                REQUEST_CLARIFICATION,
                "Ask the user the questions needed before a plan can be made",
                json!({
                    "type": "object",
                    "properties": {
                        "title": {"type": "string"},
                        "questions": {
                            "type": "array",
                            "minItems": 1,
                            "items": {
                                "type": "object",
                                "properties": {
                                    "id": {"type": "string"},
                                    "prompt": {"type": "string"},
                                    "question_type": {
                                        "type": "string",
                                        "enum": ["single_choice", "multiple_choice", "text_input", "date_picker"]
                                    },
                                    "options": {"type": "array", "items": {"type": "string"}},
                                    "required": {"type": "boolean"}
                                },
                                "required": ["id", "prompt", "question_type"]
                            }
                        }
                    },
                    "required": ["title", "questions"]
                }),
            ),
            ToolDefinition::new(
                NO_ACTION,
                "The command does not ask for any change",
                json!({
                    "type": "object",
                    "properties": {"reason": {"type": "string"}}
                }),
            ),
        ]
    }

    fn build_steps(proposal: ProposedPlan, ctx: &PlanContext) -> Result<(String, Vec<Step>), PlanningError> {
        if proposal.steps.is_empty() {
            return Err(PlanningError::InvalidProposal("plan has no steps".to_string()));
        }
        let steps = proposal
            .steps
            .into_iter()
            .map(|proposed| {
                let action = normalize(proposed.action, &ctx.snapshot)?;
                let undo = compensate(&action, &ctx.snapshot)?;
                Ok(Step::new(proposed.label, action, undo))
            })
            .collect::<Result<Vec<_>, PlanningError>>()?;
        Ok((proposal.title, steps))
    }
}

fn parse_input<T: for<'de> Deserialize<'de>>(tool: &str, input: &serde_json::Value) -> Result<T, PlanningError> {
    serde_json::from_value(input.clone())
        .map_err(|e| PlanningError::InvalidProposal(format!("bad {} input: {}", tool, e)))
}

#[async_trait]
impl Planner for LlmPlanner {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn create_plan(&self, text: &str, ctx: &PlanContext) -> Result<Option<Plan>, PlanningError> {
        debug!(%text, "LlmPlanner::create_plan: called");
        let prompt_ctx = PromptContext::new(ctx.now, ctx.role, &ctx.snapshot)
            .with_page(ctx.current_page.clone())
            .with_recent_commands(&ctx.recent_commands);
        let system_prompt = self
            .prompts
            .render("planner", &prompt_ctx)
            .map_err(|e| PlanningError::Prompt(e.to_string()))?;

        let request = CompletionRequest {
            system_prompt,
            messages: vec![Message::user(text)],
            tools: Self::tools(),
            tool_choice: None,
            max_tokens: self.max_tokens,
        };
        let response = self.client.complete(request).await?;
        debug!(
            stop_reason = ?response.stop_reason,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "LlmPlanner::create_plan: completion received"
        );
        if response.stop_reason == StopReason::MaxTokens {
            warn!("Planner completion hit the token limit");
        }

        let Some(call) = response.first_tool_call() else {
            return Err(PlanningError::InvalidProposal(
                "model answered without choosing a tool".to_string(),
            ));
        };
        debug!(tool = %call.name, "LlmPlanner::create_plan: tool chosen");

        let actor = ctx.plan_actor();
        match call.name.as_str() {
            PROPOSE_PLAN => {
                let proposal: ProposedPlan = parse_input(PROPOSE_PLAN, &call.input)?;
                let (title, steps) = Self::build_steps(proposal, ctx)?;
                info!("Model proposed '{}' with {} steps", title, steps.len());
                Ok(Some(Plan::new(title, actor, ctx.source, steps).with_original_command(text)))
            }
            REQUEST_CLARIFICATION => {
                let proposal: ProposedClarification = parse_input(REQUEST_CLARIFICATION, &call.input)?;
                let plan = Plan::needing_clarification(proposal.title, actor, ctx.source, proposal.questions, text)?;
                Ok(Some(plan))
            }
            NO_ACTION => {
                let input: NoActionInput = parse_input(NO_ACTION, &call.input)?;
                debug!(reason = %input.reason, "LlmPlanner::create_plan: no action");
                Ok(None)
            }
            other => Err(PlanningError::InvalidProposal(format!("unknown tool {}", other))),
        }
    }
}
