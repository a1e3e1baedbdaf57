//! Reasoner trait and the heuristic reasoner

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Timelike, Utc};
use regex::Regex;
use tracing::debug;

use crate::actions::Clinic;
use crate::dispatch::{BLOCK_RE, SCHEDULING_RE};
use crate::domain::{
    Appointment, ClinicSnapshot, ConversationContext, MessageAction, MessageData, ResponseType, format_cents,
    format_slot,
};
use crate::planner::PlanningError;
use crate::planner::time::parse_when;

static COUNT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bhow many\b").expect("valid regex"));

static BILLING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(invoices?|owe[sd]?|balance|outstanding|unpaid)\b").expect("valid regex"));

static SCHEDULE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(who|schedule|appointments?|booked|next)\b").expect("valid regex"));

/// Answer to a question about clinic data
#[derive(Debug, Clone, PartialEq)]
pub struct AskResponse {
    pub answer: String,
    pub data: MessageData,
    pub suggestions: Vec<String>,
}

/// Conversational turn produced for a vague command
#[derive(Debug, Clone, PartialEq)]
pub struct ReasonerReply {
    pub content: String,
    pub response_type: ResponseType,
    pub suggestions: Vec<String>,
    pub actions: Vec<MessageAction>,
    pub data: MessageData,
}

impl ReasonerReply {
    pub fn new(content: impl Into<String>, response_type: ResponseType) -> Self {
        Self {
            content: content.into(),
            response_type,
            suggestions: Vec::new(),
            actions: Vec::new(),
            data: MessageData::None,
        }
    }

    /// Set suggestions and mirror each as a button
    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.actions = suggestions.iter().map(|s| MessageAction::new(s.clone(), s.clone())).collect();
        self.suggestions = suggestions;
        self
    }
}

/// Conversational collaborator
///
/// `respond` returns `Ok(None)` when it has nothing to add, in which case
/// the caller plans the command directly.
#[async_trait]
pub trait Reasoner: Send + Sync {
    fn name(&self) -> &'static str;

    async fn ask(&self, text: &str, conversation: &ConversationContext) -> Result<AskResponse, PlanningError>;

    async fn respond(
        &self,
        conversation: &ConversationContext,
        command: &str,
    ) -> Result<Option<ReasonerReply>, PlanningError>;
}

/// Rule-based reasoner over the live clinic
#[derive(Debug, Clone)]
pub struct HeuristicReasoner {
    clinic: Clinic,
    fixed_now: Option<DateTime<Utc>>,
}

impl HeuristicReasoner {
    pub fn new(clinic: Clinic) -> Self {
        Self { clinic, fixed_now: None }
    }

    /// Pin the clock (for tests and replays)
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.fixed_now = Some(now);
        self
    }

    fn now(&self) -> DateTime<Utc> {
        self.fixed_now.unwrap_or_else(Utc::now)
    }

    fn answer(&self, text: &str, snapshot: &ClinicSnapshot, now: DateTime<Utc>) -> AskResponse {
        let when = parse_when(text, now);
        let day = when.resolve(now);
        let day_label = day_phrase(day, now);

        if BILLING_RE.is_match(text) {
            let patients = snapshot.patients_mentioned(text);
            let open: Vec<_> = snapshot
                .open_invoices()
                .into_iter()
                .filter(|i| patients.is_empty() || patients.iter().any(|p| p.id == i.patient_id))
                .collect();
            let total = open.iter().fold(0i64, |acc, i| acc.saturating_add(i.amount_cents));
            let scope = match patients.as_slice() {
                [only] => format!("{} has", only.name),
                _ => "There are".to_string(),
            };
            let noun = if open.len() == 1 { "invoice" } else { "invoices" };
            return AskResponse {
                answer: format!("{} {} open {} totalling {}.", scope, open.len(), noun, format_cents(total)),
                data: MessageData::Figure {
                    label: "open balance (cents)".to_string(),
                    value: total,
                },
                suggestions: Vec::new(),
            };
        }

        if COUNT_RE.is_match(text) {
            let count = snapshot.appointments_on(day).len();
            let noun = if count == 1 { "appointment" } else { "appointments" };
            return AskResponse {
                answer: format!("There {} {} {} {}.", if count == 1 { "is" } else { "are" }, count, noun, day_label),
                data: MessageData::Figure {
                    label: format!("appointments {}", day_label),
                    value: count as i64,
                },
                suggestions: Vec::new(),
            };
        }

        let patients = snapshot.patients_mentioned(text);
        if let [patient] = patients.as_slice() {
            let upcoming = snapshot.upcoming_for_patient(&patient.id, now);
            let answer = match upcoming.first() {
                Some(next) => format!("{}'s next appointment is {}.", patient.name, next.label()),
                None => format!("{} has no upcoming appointments.", patient.name),
            };
            return AskResponse {
                answer,
                data: appointments_data(&upcoming),
                suggestions: Vec::new(),
            };
        }

        if SCHEDULE_RE.is_match(text) {
            let list = snapshot.appointments_on(day);
            let answer = if list.is_empty() {
                format!("Nothing is booked {}.", day_label)
            } else {
                let names: Vec<String> = list
                    .iter()
                    .map(|a| {
                        let who = snapshot.patient(&a.patient_id).map(|p| p.name.as_str()).unwrap_or("Unknown");
                        format!("{} at {:02}:{:02}", who, a.start.hour(), a.start.minute())
                    })
                    .collect();
                format!("Booked {}: {}.", day_label, names.join(", "))
            };
            return AskResponse {
                answer,
                data: appointments_data(&list),
                suggestions: Vec::new(),
            };
        }

        AskResponse {
            answer: "I can answer questions about appointments and open invoices.".to_string(),
            data: MessageData::None,
            suggestions: vec![
                "how many appointments today?".to_string(),
                "who is booked tomorrow?".to_string(),
                "what invoices are outstanding?".to_string(),
            ],
        }
    }
}

#[async_trait]
impl Reasoner for HeuristicReasoner {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn ask(&self, text: &str, conversation: &ConversationContext) -> Result<AskResponse, PlanningError> {
        debug!(%text, session_id = %conversation.session_id, "HeuristicReasoner::ask: called");
        let snapshot = self.clinic.snapshot().await;
        Ok(self.answer(text, &snapshot, self.now()))
    }

    async fn respond(
        &self,
        conversation: &ConversationContext,
        command: &str,
    ) -> Result<Option<ReasonerReply>, PlanningError> {
        debug!(%command, session_id = %conversation.session_id, "HeuristicReasoner::respond: called");
        let now = self.now();
        if !parse_when(command, now).is_empty() {
            debug!("HeuristicReasoner::respond: command already has a time");
            return Ok(None);
        }

        let snapshot = self.clinic.snapshot().await;
        let patients = snapshot.patients_mentioned(command);

        let reply = if BLOCK_RE.is_match(command) {
            ReasonerReply::new("When should I block the calendar?", ResponseType::Clarification).with_suggestions(vec![
                "block tomorrow 12pm to 1pm for lunch".to_string(),
                "block friday 8am to 10am for staff meeting".to_string(),
            ])
        } else if SCHEDULING_RE.is_match(command) {
            let upcoming: Vec<&Appointment> = match patients.as_slice() {
                [] => snapshot.upcoming(now),
                some => {
                    let mut list: Vec<&Appointment> = some
                        .iter()
                        .flat_map(|p| snapshot.upcoming_for_patient(&p.id, now))
                        .collect();
                    list.sort_by_key(|a| a.start);
                    list
                }
            };
            let content = match (patients.as_slice(), upcoming.as_slice()) {
                ([patient], [only]) => format!(
                    "When should {}'s {} appointment move to?",
                    patient.first_name(),
                    format_slot(only.start)
                ),
                ([patient], []) => format!("{} has no upcoming appointments to move.", patient.name),
                _ => "Which appointment should I move, and to when?".to_string(),
            };
            ReasonerReply::new(content, ResponseType::Clarification)
                .with_suggestions(reschedule_suggestions(&snapshot, &upcoming))
        } else {
            ReasonerReply::new(
                "I can reschedule, cancel or confirm appointments, send reminders, verify insurance and manage invoices.",
                ResponseType::Suggestion,
            )
            .with_suggestions(reschedule_suggestions(&snapshot, &snapshot.upcoming(now)))
        };

        Ok(Some(reply))
    }
}

fn appointments_data(list: &[&Appointment]) -> MessageData {
    MessageData::Appointments {
        appointments: list.iter().map(|a| (*a).clone()).collect(),
    }
}

fn day_phrase(day: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let offset = (day.date_naive() - now.date_naive()).num_days();
    match offset {
        0 => "today".to_string(),
        1 => "tomorrow".to_string(),
        _ => format!("on {}", day.format("%a %b %-d")),
    }
}

/// Complete commands that move each appointment by one day
///
/// Never empty: with no appointments to offer, a generic example is returned.
fn reschedule_suggestions(snapshot: &ClinicSnapshot, upcoming: &[&Appointment]) -> Vec<String> {
    let mut suggestions: Vec<String> = upcoming
        .iter()
        .take(3)
        .filter_map(|a| {
            let patient = snapshot.patient(&a.patient_id)?;
            let next_day = a.start.checked_add_signed(Duration::days(1))?;
            Some(format!(
                "reschedule {} to {} {}",
                patient.name,
                next_day.format("%A").to_string().to_lowercase(),
                clock(next_day)
            ))
        })
        .collect();
    if suggestions.is_empty() {
        suggestions.push("block tomorrow 12pm to 1pm for lunch".to_string());
    }
    suggestions
}

/// `9am`, `2:30pm`
fn clock(at: DateTime<Utc>) -> String {
    let (pm, hour) = at.hour12();
    let suffix = if pm { "pm" } else { "am" };
    if at.minute() == 0 {
        format!("{}{}", hour, suffix)
    } else {
        format!("{}:{:02}{}", hour, at.minute(), suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserRole;
    use chrono::TimeZone;

    /// Monday 2026-10-19 08:00 UTC
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap()
    }

    fn reasoner() -> HeuristicReasoner {
        HeuristicReasoner::new(Clinic::new(ClinicSnapshot::demo(now()))).at(now())
    }

    fn conversation() -> ConversationContext {
        ConversationContext::new("s1", UserRole::FrontDesk, None)
    }

    #[tokio::test]
    async fn test_vague_reschedule_offers_suggestions() {
        let reply = reasoner()
            .respond(&conversation(), "reschedule appointment")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.response_type, ResponseType::Clarification);
        assert!(!reply.suggestions.is_empty());
        assert_eq!(reply.suggestions.len(), reply.actions.len());
        assert_eq!(reply.suggestions[0], "reschedule Emily Davis to tuesday 4pm");
    }

    #[tokio::test]
    async fn test_named_patient_reply() {
        let reply = reasoner().respond(&conversation(), "move Sarah").await.unwrap().unwrap();
        assert_eq!(reply.content, "When should Sarah's Tue Oct 20 09:00 appointment move to?");
        assert_eq!(reply.suggestions, vec!["reschedule Sarah Johnson to wednesday 9am"]);
    }

    #[tokio::test]
    async fn test_replies_to_every_vague_scheduling_verb() {
        use crate::dispatch::{AmbiguityDetector, KeywordDetector};

        for verb in ["reschedule", "move", "push", "rebook", "book", "schedule", "block"] {
            let command = format!("{} Sarah", verb);
            assert!(KeywordDetector.is_ambiguous(&command, now()), "{}", command);
            let reply = reasoner().respond(&conversation(), &command).await.unwrap();
            assert!(reply.is_some_and(|r| !r.suggestions.is_empty()), "{}", command);
        }
    }

    #[tokio::test]
    async fn test_command_with_time_gets_no_reply() {
        let reply = reasoner().respond(&conversation(), "reschedule Sarah to thu 2pm").await.unwrap();
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_ask_counts_appointments() {
        let response = reasoner().ask("how many appointments tomorrow?", &conversation()).await.unwrap();
        assert_eq!(response.answer, "There are 2 appointments tomorrow.");
        assert_eq!(
            response.data,
            MessageData::Figure {
                label: "appointments tomorrow".into(),
                value: 2
            }
        );
    }

    #[tokio::test]
    async fn test_ask_next_appointment() {
        let response = reasoner()
            .ask("when is Michael Brown's next appointment?", &conversation())
            .await
            .unwrap();
        assert_eq!(
            response.answer,
            "Michael Brown's next appointment is Wed Oct 21 11:30 with Dr. Okafor."
        );
        assert!(matches!(response.data, MessageData::Appointments { ref appointments } if appointments.len() == 1));
    }

    #[tokio::test]
    async fn test_ask_open_invoices() {
        let response = reasoner().ask("what does Emily owe?", &conversation()).await.unwrap();
        assert_eq!(response.answer, "Emily Davis has 1 open invoice totalling $120.00.");
    }

    #[tokio::test]
    async fn test_ask_open_invoices_saturates_total() {
        let mut snapshot = ClinicSnapshot::demo(now());
        for invoice in &mut snapshot.invoices {
            invoice.amount_cents = i64::MAX / 2 + 1;
        }
        let second = crate::domain::Invoice {
            id: "inv-502".into(),
            ..snapshot.invoices[0].clone()
        };
        snapshot.invoices.push(second);
        let reasoner = HeuristicReasoner::new(Clinic::new(snapshot)).at(now());

        let response = reasoner.ask("what does Emily owe?", &conversation()).await.unwrap();
        assert!(response.answer.starts_with("Emily Davis has 2 open invoices"));
        assert!(matches!(response.data, MessageData::Figure { value, .. } if value == i64::MAX));
    }

    #[tokio::test]
    async fn test_ask_fallback_has_suggestions() {
        let response = reasoner().ask("what is the wifi password?", &conversation()).await.unwrap();
        assert!(!response.suggestions.is_empty());
    }

    #[test]
    fn test_clock() {
        assert_eq!(clock(Utc.with_ymd_and_hms(2026, 10, 19, 14, 30, 0).unwrap()), "2:30pm");
        assert_eq!(clock(Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap()), "9am");
        assert_eq!(clock(Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap()), "12am");
    }
}
