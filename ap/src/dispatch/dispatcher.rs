//! Dispatcher - free text in, plan, clarification or reply out
//!
//! A command moves through `received -> ambiguity check -> [conversational
//! turn] -> plan created | clarification needed`. Answers to a clarification
//! come back through [`Dispatcher::submit_clarification`], which enriches the
//! original command and plans again, at most `max_clarification_rounds` times.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::ambiguity::{AmbiguityDetector, KeywordDetector, is_question};
use super::error::DispatchError;
use crate::actions::Clinic;
use crate::clarification::{Answers, enrich_command, validate_answers};
use crate::config::DispatchConfig;
use crate::conversation::ConversationService;
use crate::domain::{ConversationMessage, MessageData, Plan, ResponseType, Source, UserRole};
use crate::events::EventBus;
use crate::planner::{PlanContext, Planner, PlanningError};

/// Dispatcher settings
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub max_clarification_rounds: u32,
    /// Attribute plans to the autopilot actor
    pub autopilot_mode: bool,
    pub source: Source,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_clarification_rounds: 3,
            autopilot_mode: false,
            source: Source::Cmdk,
        }
    }
}

impl From<&DispatchConfig> for DispatcherConfig {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            max_clarification_rounds: config.max_clarification_rounds,
            autopilot_mode: config.autopilot_mode,
            source: config.source,
        }
    }
}

/// Result of one dispatch call
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// The conversational layer answered; no plan was made
    Reply(ConversationMessage),
    /// A plan that needs answers before it can run
    Clarification(Plan),
    /// An executable plan
    Plan(Plan),
    /// The command did not describe any clinic action
    NoAction(String),
}

impl DispatchOutcome {
    pub fn plan(&self) -> Option<&Plan> {
        match self {
            Self::Clarification(plan) | Self::Plan(plan) => Some(plan),
            Self::Reply(_) | Self::NoAction(_) => None,
        }
    }

    pub fn into_plan(self) -> Option<Plan> {
        match self {
            Self::Clarification(plan) | Self::Plan(plan) => Some(plan),
            Self::Reply(_) | Self::NoAction(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Reply(_) => "reply",
            Self::Clarification(_) => "clarification",
            Self::Plan(_) => "plan",
            Self::NoAction(_) => "no_action",
        }
    }
}

/// Routes commands to the planner or the conversational layer
pub struct Dispatcher {
    planner: Arc<dyn Planner>,
    conversation: ConversationService,
    clinic: Clinic,
    events: Arc<EventBus>,
    detector: Box<dyn AmbiguityDetector>,
    config: DispatcherConfig,
    fixed_now: Option<DateTime<Utc>>,
}

impl Dispatcher {
    pub fn new(
        planner: Arc<dyn Planner>,
        conversation: ConversationService,
        clinic: Clinic,
        events: Arc<EventBus>,
        config: DispatcherConfig,
    ) -> Self {
        debug!(planner = planner.name(), ?config, "Dispatcher::new: called");
        Self {
            planner,
            conversation,
            clinic,
            events,
            detector: Box::new(KeywordDetector),
            config,
            fixed_now: None,
        }
    }

    /// Replace the ambiguity heuristic
    pub fn with_detector(mut self, detector: Box<dyn AmbiguityDetector>) -> Self {
        debug!(detector = detector.name(), "Dispatcher::with_detector: called");
        self.detector = detector;
        self
    }

    /// Pin the clock (for tests and replays)
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.fixed_now = Some(now);
        self
    }

    pub fn conversation(&self) -> &ConversationService {
        &self.conversation
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    fn now(&self) -> DateTime<Utc> {
        self.fixed_now.unwrap_or_else(Utc::now)
    }

    /// Start (or resume) a session
    pub async fn open_session(
        &self,
        session_id: &str,
        role: UserRole,
        current_page: Option<String>,
    ) -> Result<(), DispatchError> {
        self.conversation
            .get_or_create_conversation(session_id, role, current_page)
            .await?;
        Ok(())
    }

    /// Dispatch a command typed into the command bar
    pub async fn dispatch(&self, session_id: &str, text: &str) -> Result<DispatchOutcome, DispatchError> {
        debug!(%session_id, %text, "Dispatcher::dispatch: called");
        let command = self.receive(session_id, text, false).await?;

        if is_question(&command) {
            debug!("Dispatcher::dispatch: routing question to reasoner");
            let message = self
                .conversation
                .ask(session_id, &command)
                .await
                .inspect_err(|e| warn!(%session_id, error = %e, "Question could not be answered"))?;
            return Ok(DispatchOutcome::Reply(message));
        }

        self.conversation
            .add_user_message(session_id, &command, Some(command.clone()))
            .await?;

        if self.detector.is_ambiguous(&command, self.now()) {
            debug!(detector = self.detector.name(), "Dispatcher::dispatch: command is ambiguous");
            let reply = self
                .conversation
                .generate_response(session_id, &command)
                .await
                .inspect_err(|e| warn!(%session_id, error = %e, "Conversational turn failed"))?;
            if let Some(message) = reply {
                info!(%session_id, "Dispatch halted on conversational reply");
                return Ok(DispatchOutcome::Reply(message));
            }
        }

        self.plan_command(session_id, &command, 0).await
    }

    /// Dispatch a suggestion the user picked from a reply
    ///
    /// Skips the ambiguity check: suggestions are complete commands.
    pub async fn dispatch_suggestion(
        &self,
        session_id: &str,
        suggestion: &str,
    ) -> Result<DispatchOutcome, DispatchError> {
        debug!(%session_id, %suggestion, "Dispatcher::dispatch_suggestion: called");
        let command = self.receive(session_id, suggestion, true).await?;
        self.plan_command(session_id, &command, 0).await
    }

    /// Validate answers for `plan`, enrich its command and plan again
    ///
    /// Nothing is dispatched when validation fails. Another round of
    /// questions beyond the configured limit fails with
    /// [`PlanningError::ClarificationLimit`].
    pub async fn submit_clarification(
        &self,
        session_id: &str,
        plan: &Plan,
        answers: &Answers,
    ) -> Result<DispatchOutcome, DispatchError> {
        debug!(%session_id, plan_id = %plan.id, round = plan.clarification_round, "Dispatcher::submit_clarification: called");
        if !plan.needs_clarification() {
            return Err(DispatchError::NotAwaitingAnswers {
                plan_id: plan.id.clone(),
            });
        }

        validate_answers(&plan.clarification_questions, answers)
            .inspect_err(|e| warn!(plan_id = %plan.id, error = %e, "Clarification answers rejected"))?;

        let original = plan.original_command.as_deref().unwrap_or(&plan.title);
        let enriched = enrich_command(original, &plan.clarification_questions, answers);
        info!(plan_id = %plan.id, %enriched, "Re-dispatching with answers");

        let command = self.receive(session_id, &enriched, true).await?;
        self.conversation.set_pending_plan(session_id, None).await?;
        self.plan_command(session_id, &command, plan.clarification_round).await
    }

    /// Common entry bookkeeping: trim, record, emit
    async fn receive(&self, session_id: &str, text: &str, log_message: bool) -> Result<String, DispatchError> {
        let command = text.trim();
        if command.is_empty() {
            return Err(DispatchError::EmptyCommand);
        }
        self.conversation.record_command(session_id, command).await?;
        self.events.command_received(session_id, command);
        if log_message {
            self.conversation
                .add_user_message(session_id, command, Some(command.to_string()))
                .await?;
        }
        Ok(command.to_string())
    }

    async fn plan_command(
        &self,
        session_id: &str,
        command: &str,
        rounds_used: u32,
    ) -> Result<DispatchOutcome, DispatchError> {
        debug!(%session_id, %command, rounds_used, "Dispatcher::plan_command: called");
        let conversation = self.conversation.store().get_required(session_id).await?;
        let ctx = PlanContext::new(self.now(), self.clinic.snapshot().await)
            .with_role(conversation.user_context.role)
            .with_source(self.config.source)
            .with_autopilot(self.config.autopilot_mode)
            .with_page(conversation.user_context.current_page.clone())
            .with_recent_commands(conversation.user_context.recent_commands.clone());

        let planned = self.planner.create_plan(command, &ctx).await.inspect_err(|e| {
            warn!(%session_id, planner = self.planner.name(), error = %e, "Planning failed");
            self.events.warning(session_id, format!("Planning failed: {}", e));
        })?;

        let Some(mut plan) = planned else {
            let message = format!("Nothing to do for \"{}\".", command);
            info!(%session_id, %command, "No action found");
            self.conversation
                .add_assistant_message(
                    session_id,
                    ConversationMessage::assistant(message.clone(), ResponseType::Information)
                        .with_related_command(command),
                )
                .await?;
            return Ok(DispatchOutcome::NoAction(message));
        };

        let emitter = self.events.emitter_for(&plan.id);
        if plan.needs_clarification() {
            let round = rounds_used + 1;
            if round > self.config.max_clarification_rounds {
                let err = PlanningError::ClarificationLimit {
                    max: self.config.max_clarification_rounds,
                };
                warn!(%session_id, error = %err, "Giving up on clarification");
                self.events.warning(session_id, err.to_string());
                return Err(err.into());
            }
            plan.clarification_round = round;

            let question_ids = plan.clarification_questions.iter().map(|q| q.id.clone()).collect();
            emitter.clarification_requested(round, question_ids);
            let prompts: Vec<&str> = plan.clarification_questions.iter().map(|q| q.prompt.as_str()).collect();
            info!(plan_id = %plan.id, round, "Clarification requested");
            self.record_plan(session_id, &plan, prompts.join(" "), ResponseType::Clarification)
                .await?;
            return Ok(DispatchOutcome::Clarification(plan));
        }

        emitter.plan_created(&plan.title, plan.steps.len());
        info!(plan_id = %plan.id, title = %plan.title, steps = plan.steps.len(), "Plan created");
        self.record_plan(session_id, &plan, plan.title.clone(), ResponseType::Confirmation)
            .await?;
        Ok(DispatchOutcome::Plan(plan))
    }

    async fn record_plan(
        &self,
        session_id: &str,
        plan: &Plan,
        content: String,
        response_type: ResponseType,
    ) -> Result<(), DispatchError> {
        let data = MessageData::PlanPreview {
            plan_id: plan.id.clone(),
            title: plan.title.clone(),
            step_labels: plan.steps.iter().map(|s| s.label.clone()).collect(),
        };
        self.conversation
            .add_plan_message(session_id, content, response_type, &plan.id, data)
            .await?;
        self.conversation.set_pending_plan(session_id, Some(plan.id.clone())).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::testing::now;
    use crate::clarification::Answer;
    use crate::conversation::{HeuristicReasoner, SessionStore};
    use crate::domain::{Actor, ClarificationQuestion, ClinicSnapshot, MessageRole, PlanStatus};
    use crate::planner::RulePlanner;
    use async_trait::async_trait;
    use std::collections::HashMap;

    fn dispatcher_with(planner: Arc<dyn Planner>, config: DispatcherConfig) -> (Dispatcher, Arc<EventBus>) {
        let clinic = Clinic::new(ClinicSnapshot::demo(now()));
        let events = Arc::new(EventBus::new(256));
        let reasoner = Arc::new(HeuristicReasoner::new(clinic.clone()).at(now()));
        let conversation = ConversationService::new(SessionStore::spawn(), reasoner, events.clone(), 10);
        let dispatcher = Dispatcher::new(planner, conversation, clinic, events.clone(), config).at(now());
        (dispatcher, events)
    }

    async fn dispatcher() -> (Dispatcher, Arc<EventBus>) {
        let (dispatcher, events) = dispatcher_with(Arc::new(RulePlanner::new()), DispatcherConfig::default());
        dispatcher.open_session("s1", UserRole::FrontDesk, None).await.unwrap();
        (dispatcher, events)
    }

    fn answers(pairs: &[(&str, &str)]) -> Answers {
        pairs.iter().map(|(k, v)| (k.to_string(), Answer::from(*v))).collect()
    }

    /// Always asks the same question
    struct AlwaysAsks;

    #[async_trait]
    impl Planner for AlwaysAsks {
        fn name(&self) -> &'static str {
            "always-asks"
        }

        async fn create_plan(&self, text: &str, ctx: &PlanContext) -> Result<Option<Plan>, PlanningError> {
            let question = ClarificationQuestion::text_input("detail", "Any more detail?");
            Ok(Some(Plan::needing_clarification(
                "Need detail",
                ctx.plan_actor(),
                ctx.source,
                vec![question],
                text,
            )?))
        }
    }

    struct Failing;

    #[async_trait]
    impl Planner for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn create_plan(&self, _text: &str, _ctx: &PlanContext) -> Result<Option<Plan>, PlanningError> {
            Err(PlanningError::Failed("backend down".into()))
        }
    }

    #[tokio::test]
    async fn test_vague_command_gets_reply_not_plan() {
        let (dispatcher, events) = dispatcher().await;
        let mut rx = events.subscribe();

        let outcome = dispatcher.dispatch("s1", "reschedule appointment").await.unwrap();
        let DispatchOutcome::Reply(message) = outcome else {
            panic!("expected reply, got {}", outcome.kind());
        };
        assert!(!message.suggestions.is_empty());

        let first = rx.recv().await.unwrap();
        assert_eq!(first.event_type(), "CommandReceived");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.event_type(), "ConversationalReply");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_specific_command_makes_plan() {
        let (dispatcher, _) = dispatcher().await;
        let outcome = dispatcher
            .dispatch("s1", "reschedule Sarah to Thu 2:30pm and notify")
            .await
            .unwrap();
        let plan = match outcome {
            DispatchOutcome::Plan(plan) => plan,
            other => panic!("expected plan, got {}", other.kind()),
        };
        assert_eq!(plan.status, PlanStatus::Pending);
        assert!(!plan.needs_clarification());

        let conversation = dispatcher.conversation().get_conversation("s1").await.unwrap().unwrap();
        assert_eq!(conversation.pending_plan_id.as_deref(), Some(plan.id.as_str()));
        let last = conversation.last_message().unwrap();
        assert_eq!(last.related_plan_id.as_deref(), Some(plan.id.as_str()));
        assert!(matches!(last.data, MessageData::PlanPreview { ref step_labels, .. } if step_labels.len() == 2));
    }

    #[tokio::test]
    async fn test_picked_suggestion_skips_ambiguity() {
        let (dispatcher, _) = dispatcher().await;
        let outcome = dispatcher.dispatch("s1", "reschedule appointment").await.unwrap();
        let DispatchOutcome::Reply(message) = outcome else {
            panic!("expected reply");
        };
        let picked = message.actions[0].command.clone();

        let outcome = dispatcher.dispatch_suggestion("s1", &picked).await.unwrap();
        assert_eq!(outcome.kind(), "plan");
    }

    #[tokio::test]
    async fn test_question_routes_to_reasoner() {
        let (dispatcher, _) = dispatcher().await;
        let outcome = dispatcher.dispatch("s1", "how many appointments tomorrow?").await.unwrap();
        let DispatchOutcome::Reply(message) = outcome else {
            panic!("expected reply");
        };
        assert_eq!(message.response_type, Some(ResponseType::Information));
        assert_eq!(message.content, "There are 2 appointments tomorrow.");
    }

    #[tokio::test]
    async fn test_clarification_round_trip() {
        let (dispatcher, events) = dispatcher().await;
        let mut rx = events.subscribe();

        let outcome = dispatcher.dispatch("s1", "reschedule Michael to friday 3pm").await.unwrap();
        let DispatchOutcome::Clarification(plan) = outcome else {
            panic!("expected clarification");
        };
        assert_eq!(plan.clarification_round, 1);

        let outcome = dispatcher
            .submit_clarification("s1", &plan, &answers(&[("patient", "Michael Chen")]))
            .await
            .unwrap();
        let DispatchOutcome::Plan(final_plan) = outcome else {
            panic!("expected plan");
        };
        assert_eq!(
            final_plan.original_command.as_deref(),
            Some("reschedule Michael to friday 3pm Michael Chen")
        );

        let types: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.event_type())
            .collect();
        assert_eq!(
            types,
            vec![
                "CommandReceived",
                "ClarificationRequested",
                "CommandReceived",
                "PlanCreated"
            ]
        );

        let conversation = dispatcher.conversation().get_conversation("s1").await.unwrap().unwrap();
        let users: Vec<&str> = conversation
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(
            users,
            vec!["reschedule Michael to friday 3pm", "reschedule Michael to friday 3pm Michael Chen"]
        );
    }

    #[tokio::test]
    async fn test_invalid_answers_dispatch_nothing() {
        let (dispatcher, events) = dispatcher().await;
        let outcome = dispatcher.dispatch("s1", "reschedule Michael to friday 3pm").await.unwrap();
        let plan = outcome.into_plan().unwrap();

        let mut rx = events.subscribe();
        let err = dispatcher
            .submit_clarification("s1", &plan, &answers(&[("patient", "Michael Jordan")]))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_submit_to_executable_plan_rejected() {
        let (dispatcher, _) = dispatcher().await;
        let plan = dispatcher
            .dispatch("s1", "confirm Sarah")
            .await
            .unwrap()
            .into_plan()
            .unwrap();
        let err = dispatcher
            .submit_clarification("s1", &plan, &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotAwaitingAnswers { .. }));
    }

    #[tokio::test]
    async fn test_clarification_limit() {
        let config = DispatcherConfig {
            max_clarification_rounds: 2,
            ..DispatcherConfig::default()
        };
        let (dispatcher, _) = dispatcher_with(Arc::new(AlwaysAsks), config);
        dispatcher.open_session("s1", UserRole::FrontDesk, None).await.unwrap();

        let plan = dispatcher.dispatch("s1", "confirm it").await.unwrap().into_plan().unwrap();
        assert_eq!(plan.clarification_round, 1);
        let plan = dispatcher
            .submit_clarification("s1", &plan, &answers(&[("detail", "the morning one")]))
            .await
            .unwrap()
            .into_plan()
            .unwrap();
        assert_eq!(plan.clarification_round, 2);

        let err = dispatcher
            .submit_clarification("s1", &plan, &answers(&[("detail", "Sarah")]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Planning(PlanningError::ClarificationLimit { max: 2 })
        ));
    }

    #[tokio::test]
    async fn test_planner_failure_surfaces() {
        let (dispatcher, events) = dispatcher_with(Arc::new(Failing), DispatcherConfig::default());
        dispatcher.open_session("s1", UserRole::FrontDesk, None).await.unwrap();
        let mut rx = events.subscribe();

        let err = dispatcher.dispatch("s1", "confirm Sarah").await.unwrap_err();
        assert!(matches!(err, DispatchError::Planning(PlanningError::Failed(_))));

        let types: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.event_type())
            .collect();
        assert_eq!(types, vec!["CommandReceived", "Warning"]);
    }

    #[tokio::test]
    async fn test_no_action() {
        let (dispatcher, _) = dispatcher().await;
        let outcome = dispatcher.dispatch("s1", "good morning").await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::NoAction(ref m) if m.contains("good morning")));
    }

    #[tokio::test]
    async fn test_empty_command_rejected() {
        let (dispatcher, _) = dispatcher().await;
        assert!(matches!(
            dispatcher.dispatch("s1", "   ").await.unwrap_err(),
            DispatchError::EmptyCommand
        ));
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let (dispatcher, events) = dispatcher().await;
        let mut rx = events.subscribe();
        let err = dispatcher.dispatch("nope", "confirm Sarah").await.unwrap_err();
        assert!(matches!(err, DispatchError::Session(_)));
        assert!(rx.try_recv().is_err(), "a rejected command must not be announced");
    }

    #[tokio::test]
    async fn test_config_sets_actor_and_source() {
        let config = DispatchConfig {
            autopilot_mode: true,
            source: Source::Kpi,
            ..DispatchConfig::default()
        };
        let (dispatcher, _) = dispatcher_with(Arc::new(RulePlanner::new()), DispatcherConfig::from(&config));
        dispatcher.open_session("s1", UserRole::FrontDesk, None).await.unwrap();

        let plan = dispatcher.dispatch("s1", "confirm Sarah").await.unwrap().into_plan().unwrap();
        assert_eq!(plan.actor, Actor::Autopilot);
        assert_eq!(plan.source, Source::Kpi);
    }

    #[tokio::test]
    async fn test_recent_commands_reach_planner_context() {
        let (dispatcher, _) = dispatcher().await;
        dispatcher.dispatch("s1", "confirm Sarah").await.unwrap();
        dispatcher.dispatch("s1", "remind Emily").await.unwrap();
        let conversation = dispatcher.conversation().get_conversation("s1").await.unwrap().unwrap();
        assert_eq!(conversation.user_context.recent_commands, vec!["confirm Sarah", "remind Emily"]);
        assert_eq!(conversation.current_command.as_deref(), Some("remind Emily"));
    }
}
