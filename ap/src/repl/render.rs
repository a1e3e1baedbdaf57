//! Terminal and JSON rendering of dispatch and run results

use colored::Colorize;
use serde_json::{Value, json};

use crate::dispatch::DispatchOutcome;
use crate::domain::{ConversationMessage, MessageRole, Plan, PlanStatus, QuestionType, StepStatus};
use crate::events::ApEvent;
use crate::plan::{RollbackReport, RunReport};

pub fn print_outcome(outcome: &DispatchOutcome) {
    match outcome {
        DispatchOutcome::Reply(message) => print_reply(message),
        DispatchOutcome::Clarification(plan) => print_questions(plan),
        DispatchOutcome::Plan(plan) => print_plan(plan),
        DispatchOutcome::NoAction(message) => println!("{}", message.dimmed()),
    }
}

pub fn print_reply(message: &ConversationMessage) {
    println!("{} {}", "●".bright_blue(), message.content);
    for (i, suggestion) in message.suggestions.iter().enumerate() {
        println!("  {} {}", format!("[{}]", i + 1).yellow(), suggestion);
    }
}

pub fn print_questions(plan: &Plan) {
    println!(
        "{} {} {}",
        "?".yellow(),
        plan.title.bold(),
        format!("(round {})", plan.clarification_round).dimmed()
    );
    for question in &plan.clarification_questions {
        let required = if question.required { "" } else { " (optional)" };
        println!("  {}{}", question.prompt, required.dimmed());
        if question.question_type.is_choice() {
            for (i, option) in question.options.iter().enumerate() {
                println!("    {} {}", format!("{}.", i + 1).yellow(), option);
            }
        }
    }
}

pub fn print_plan(plan: &Plan) {
    println!("{} {} {}", "▸".bright_green(), plan.title.bold(), plan.id.dimmed());
    for (i, step) in plan.steps.iter().enumerate() {
        let marker = match step.status {
            StepStatus::Pending => "·".normal(),
            StepStatus::Succeeded => "✓".green(),
            StepStatus::Failed => "✗".red(),
            StepStatus::Undone => "↺".cyan(),
            StepStatus::UndoFailed => "!".red(),
        };
        println!(
            "  {} {}. {} {}",
            marker,
            i + 1,
            step.label,
            format!("({})", step.action.summary()).dimmed()
        );
        if let Some(error) = &step.error {
            println!("       {}", error.red());
        }
    }
}

pub fn print_run_report(plan: &Plan, report: &RunReport) {
    print_plan(plan);
    let status = match report.status {
        PlanStatus::Success => report.status.to_string().green(),
        PlanStatus::Partial => report.status.to_string().yellow(),
        _ => report.status.to_string().red(),
    };
    println!("Status: {}", status);
    if let Some(failure) = &report.failure {
        println!("{} {}", "✗".red(), failure);
    }
    if let Some(rollback) = &report.rollback {
        print_rollback(rollback);
    }
}

pub fn print_rollback(report: &RollbackReport) {
    if report.is_noop() {
        println!("{}", "Nothing to undo.".dimmed());
        return;
    }
    println!("{} Undid {} step(s)", "↺".cyan(), report.undone.len());
    for failure in &report.failures {
        println!("  {} {}", "!".red(), failure);
    }
}

pub fn print_history(messages: &[ConversationMessage]) {
    if messages.is_empty() {
        println!("{}", "No conversation history.".dimmed());
        return;
    }
    for message in messages {
        let who = match message.role {
            MessageRole::User => "you".bright_green(),
            MessageRole::Assistant => "ap".bright_blue(),
        };
        println!(
            "{} {:>3}: {}",
            message.timestamp.format("%H:%M:%S").to_string().dimmed(),
            who,
            message.content
        );
    }
}

pub fn print_event(event: &ApEvent) {
    println!("{} {}", event.event_type().cyan(), event.stream_id().dimmed());
}

/// Prompt text for reading one answer
pub fn answer_prompt(question_type: QuestionType) -> &'static str {
    match question_type {
        QuestionType::SingleChoice => "choose> ",
        QuestionType::MultipleChoice => "choose (comma separated)> ",
        QuestionType::TextInput => "answer> ",
        QuestionType::DatePicker => "date (YYYY-MM-DD[THH:MM])> ",
    }
}

pub fn outcome_json(outcome: &DispatchOutcome) -> Value {
    match outcome {
        DispatchOutcome::Reply(message) => json!({"outcome": "reply", "message": message}),
        DispatchOutcome::Clarification(plan) => json!({"outcome": "clarification", "plan": plan}),
        DispatchOutcome::Plan(plan) => json!({"outcome": "plan", "plan": plan}),
        DispatchOutcome::NoAction(message) => json!({"outcome": "no_action", "message": message}),
    }
}

pub fn run_report_json(plan: &Plan, report: &RunReport) -> Value {
    json!({
        "outcome": "run",
        "plan": plan,
        "status": report.status,
        "completed": report.completed,
        "failure": report.failure.as_ref().map(|f| f.to_string()),
        "rolled_back": report.rollback.as_ref().map(|r| r.undone.clone()).unwrap_or_default(),
    })
}
