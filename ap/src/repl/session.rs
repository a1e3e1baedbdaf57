//! REPL session: the interactive command bar

use colored::Colorize;
use eyre::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::debug;

use super::render;
use crate::app::Autopilot;
use crate::clarification::{Answer, Answers};
use crate::dispatch::{DispatchError, DispatchOutcome};
use crate::domain::{ClarificationQuestion, Plan, QuestionType, UserRole};
use crate::events::ApEvent;

/// Events kept for `/events`
const EVENT_HISTORY: usize = 50;

/// Interactive REPL session
pub struct ReplSession {
    app: Autopilot,
    session_id: String,
    events_rx: broadcast::Receiver<ApEvent>,
    recent_events: Vec<ApEvent>,
    /// Plan waiting for `/run`
    pending: Option<Plan>,
    /// Last plan run, target of `/undo`
    last_run: Option<Plan>,
    suggestions: Vec<String>,
}

enum SlashResult {
    Continue,
    Quit,
}

impl ReplSession {
    pub fn new(app: Autopilot, session_id: impl Into<String>) -> Self {
        let events_rx = app.events.subscribe();
        Self {
            app,
            session_id: session_id.into(),
            events_rx,
            recent_events: Vec::new(),
            pending: None,
            last_run: None,
            suggestions: Vec::new(),
        }
    }

    /// Run the REPL main loop
    pub async fn run(&mut self) -> Result<()> {
        debug!(session_id = %self.session_id, "ReplSession::run: called");
        self.app
            .dispatcher
            .open_session(&self.session_id, UserRole::FrontDesk, None)
            .await?;
        self.print_welcome();

        let mut rl = DefaultEditor::new().map_err(|e| eyre::eyre!("Failed to initialize readline: {}", e))?;

        loop {
            let readline = rl.readline(&format!("{} ", "⌘K".bright_green()));
            match readline {
                Ok(line) => {
                    let input = line.trim();
                    if input.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(input);

                    if input.starts_with('/') {
                        match self.handle_slash_command(input, &mut rl).await {
                            SlashResult::Continue => continue,
                            SlashResult::Quit => break,
                        }
                    } else {
                        let result = self.app.dispatcher.dispatch(&self.session_id, input).await;
                        self.handle_result(result, &mut rl).await;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(err) => {
                    return Err(eyre::eyre!("Readline error: {}", err));
                }
            }
        }

        self.app.dispatcher.conversation().end_conversation(&self.session_id).await?;
        println!("Goodbye!");
        Ok(())
    }

    fn print_welcome(&self) {
        println!();
        println!("{}", "Autopilot command bar".bright_cyan().bold());
        println!("Session: {}", self.session_id.dimmed());
        println!("Type {} for help, {} to quit", "/help".yellow(), "/quit".yellow());
        println!();
    }

    /// Show an outcome and follow clarification rounds until it settles
    async fn handle_result(
        &mut self,
        mut result: Result<DispatchOutcome, DispatchError>,
        rl: &mut DefaultEditor,
    ) {
        loop {
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    println!("{} {}", "✗".red(), e);
                    return;
                }
            };
            render::print_outcome(&outcome);

            match outcome {
                DispatchOutcome::Reply(message) => {
                    self.suggestions = message.suggestions;
                    if !self.suggestions.is_empty() {
                        println!("{}", "Pick one with /pick N".dimmed());
                    }
                    return;
                }
                DispatchOutcome::Plan(plan) => {
                    println!("{}", "Type /run to execute".dimmed());
                    self.pending = Some(plan);
                    return;
                }
                DispatchOutcome::NoAction(_) => return,
                DispatchOutcome::Clarification(plan) => {
                    let Some(answers) = read_answers(&plan.clarification_questions, rl) else {
                        println!("{}", "Clarification cancelled.".dimmed());
                        return;
                    };
                    result = self
                        .app
                        .dispatcher
                        .submit_clarification(&self.session_id, &plan, &answers)
                        .await;
                }
            }
        }
    }

    async fn handle_slash_command(&mut self, input: &str, rl: &mut DefaultEditor) -> SlashResult {
        let parts: Vec<&str> = input.split_whitespace().collect();
        let cmd = parts.first().copied().unwrap_or("");
        debug!(%cmd, "ReplSession::handle_slash_command: called");

        match cmd {
            "/help" | "/h" => self.print_help(),
            "/quit" | "/q" | "/exit" => return SlashResult::Quit,
            "/run" | "/r" => self.run_pending().await,
            "/undo" | "/u" => self.undo_last().await,
            "/pick" | "/p" => {
                let picked = parts
                    .get(1)
                    .and_then(|n| n.parse::<usize>().ok())
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| self.suggestions.get(i).cloned());
                match picked {
                    Some(suggestion) => {
                        let result = self.app.dispatcher.dispatch_suggestion(&self.session_id, &suggestion).await;
                        self.handle_result(result, rl).await;
                    }
                    None => println!("{} No such suggestion", "?".yellow()),
                }
            }
            "/history" => match self.app.dispatcher.conversation().get_conversation(&self.session_id).await {
                Ok(Some(conversation)) => render::print_history(&conversation.messages),
                Ok(None) => render::print_history(&[]),
                Err(e) => println!("{} {}", "✗".red(), e),
            },
            "/events" => {
                self.drain_events();
                if self.recent_events.is_empty() {
                    println!("{}", "No events yet.".dimmed());
                }
                for event in &self.recent_events {
                    render::print_event(event);
                }
            }
            _ => {
                println!("{} Unknown command: {}", "?".yellow(), cmd);
                println!("Type {} for available commands", "/help".yellow());
            }
        }
        SlashResult::Continue
    }

    async fn run_pending(&mut self) {
        let Some(mut plan) = self.pending.take() else {
            println!("{}", "No plan to run.".dimmed());
            return;
        };
        match self.app.runner.run(&mut plan).await {
            Ok(report) => render::print_run_report(&plan, &report),
            Err(e) => println!("{} {}", "✗".red(), e),
        }
        self.last_run = Some(plan);
    }

    async fn undo_last(&mut self) {
        let Some(plan) = self.last_run.as_mut() else {
            println!("{}", "Nothing has run yet.".dimmed());
            return;
        };
        let report = self.app.runner.rollback(plan).await;
        render::print_rollback(&report);
    }

    fn drain_events(&mut self) {
        loop {
            match self.events_rx.try_recv() {
                Ok(event) => self.recent_events.push(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        let len = self.recent_events.len();
        if len > EVENT_HISTORY {
            self.recent_events.drain(..len - EVENT_HISTORY);
        }
    }

    fn print_help(&self) {
        println!();
        println!("{}", "Available Commands:".bright_cyan());
        println!("  {:14} Show this help", "/help".yellow());
        println!("  {:14} Run the pending plan", "/run".yellow());
        println!("  {:14} Undo the last plan run", "/undo".yellow());
        println!("  {:14} Dispatch suggestion N", "/pick N".yellow());
        println!("  {:14} Show conversation history", "/history".yellow());
        println!("  {:14} Show recent events", "/events".yellow());
        println!("  {:14} Exit", "/quit".yellow());
        println!();
        println!("{}", "Examples:".bright_cyan());
        println!("  reschedule Sarah to Thu 2:30pm and notify");
        println!("  invoice Emily $80 for lab work");
        println!("  how many appointments tomorrow?");
        println!();
    }
}

/// Prompt for each question; `None` when the user cancels
fn read_answers(questions: &[ClarificationQuestion], rl: &mut DefaultEditor) -> Option<Answers> {
    let mut answers = Answers::new();
    for question in questions {
        let line = match rl.readline(render::answer_prompt(question.question_type)) {
            Ok(line) => line,
            Err(_) => return None,
        };
        if let Some(answer) = parse_answer(question, &line) {
            answers.insert(question.id.clone(), answer);
        }
    }
    Some(answers)
}

/// Map typed input to an answer; option numbers select options
fn parse_answer(question: &ClarificationQuestion, input: &str) -> Option<Answer> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    let pick = |token: &str| -> String {
        token
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| question.options.get(i).cloned())
            .unwrap_or_else(|| token.to_string())
    };
    match question.question_type {
        QuestionType::SingleChoice => Some(Answer::one(pick(input))),
        QuestionType::MultipleChoice => Some(Answer::many(
            input.split(',').map(str::trim).filter(|t| !t.is_empty()).map(pick),
        )),
        QuestionType::TextInput | QuestionType::DatePicker => Some(Answer::one(input)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rooms() -> ClarificationQuestion {
        ClarificationQuestion::single_choice("room", "Which room?", vec!["Room A".into(), "Room B".into()]).unwrap()
    }

    #[test]
    fn test_parse_answer_by_number() {
        assert_eq!(parse_answer(&rooms(), "2"), Some(Answer::one("Room B")));
        assert_eq!(parse_answer(&rooms(), "Room A"), Some(Answer::one("Room A")));
        assert_eq!(parse_answer(&rooms(), "9"), Some(Answer::one("9")));
    }

    #[test]
    fn test_parse_answer_blank_is_none() {
        assert_eq!(parse_answer(&rooms(), "   "), None);
    }

    #[test]
    fn test_parse_answer_multiple() {
        let question = ClarificationQuestion::multiple_choice(
            "channels",
            "Notify how?",
            vec!["SMS".into(), "Email".into()],
        )
        .unwrap();
        assert_eq!(
            parse_answer(&question, "1, Email"),
            Some(Answer::many(["SMS", "Email"]))
        );
    }

    #[test]
    fn test_parse_answer_text() {
        let question = ClarificationQuestion::text_input("amount", "How much?");
        assert_eq!(parse_answer(&question, " $80 "), Some(Answer::one("$80")));
    }
}
