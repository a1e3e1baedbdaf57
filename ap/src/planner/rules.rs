//! RulePlanner - deterministic keyword planner
//!
//! Recognises the front-desk verbs (reschedule, cancel, confirm, no-show,
//! remind, verify, invoice, void/paid, block, notify), resolves the patient,
//! appointment and time against the snapshot, and asks a clarification
//! question for whatever it cannot resolve.

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use regex::Regex;
use tracing::debug;

use super::error::PlanningError;
use super::time::{parse_duration, parse_when};
use super::traits::{PlanContext, Planner};
use super::undo::compensate;
use crate::domain::{
    Appointment, AppointmentStatus, ClarificationQuestion, ClinicSnapshot, InvoiceStatus, NotifyChannel, Patient,
    Plan, QuestionContext, Step, StepAction, format_cents, format_slot, generate_id,
};

/// Longest single time block the desk may create
const MAX_BLOCK_HOURS: i64 = 24;

static NOTIFY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(notify|text|email|message|let (?:them|him|her) know)\b").expect("valid regex")
});

static VERIFY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(verify|eligibility|insurance)\b").expect("valid regex"));

static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\$\s?(\d+)(?:\.(\d{1,2}))?|\b(\d+)(?:\.(\d{1,2}))?\s*(?:dollars|usd)\b|(?:^|\s)(\d+)(?:\.(\d{1,2}))?\s*$")
        .expect("valid regex")
});

static INVOICE_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\binv-[a-z0-9-]+").expect("valid regex"));

static FOR_PHRASE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bfor\s+([a-z][a-z' ]*[a-z])").expect("valid regex"));

/// What the command asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    Reschedule,
    Cancel,
    Confirm,
    NoShow,
    Remind,
    Verify,
    Invoice,
    SetInvoice(InvoiceStatus),
    Block,
    Notify,
}

impl Intent {
    /// Checked in order; the first matching verb wins
    fn detect(lowered: &str) -> Option<Self> {
        let has = |words: &[&str]| {
            words.iter().any(|w| {
                lowered
                    .match_indices(w)
                    .any(|(i, _)| is_word_at(lowered, i, w.len()))
            })
        };

        let intent = if has(&["block"]) {
            Self::Block
        } else if has(&["no-show", "no show", "noshow"]) {
            Self::NoShow
        } else if has(&["reschedule", "move", "push", "rebook"]) {
            Self::Reschedule
        } else if has(&["cancel"]) {
            Self::Cancel
        } else if has(&["confirm"]) {
            Self::Confirm
        } else if has(&["remind", "reminder"]) {
            Self::Remind
        } else if has(&["void"]) {
            Self::SetInvoice(InvoiceStatus::Void)
        } else if has(&["paid"]) {
            Self::SetInvoice(InvoiceStatus::Paid)
        } else if has(&["invoice", "bill", "charge"]) {
            Self::Invoice
        } else if has(&["verify", "eligibility"]) {
            Self::Verify
        } else if has(&["notify", "text", "message", "email"]) {
            Self::Notify
        } else {
            return None;
        };
        Some(intent)
    }

    fn title(&self) -> &'static str {
        match self {
            Self::Reschedule => "Reschedule appointment",
            Self::Cancel => "Cancel appointment",
            Self::Confirm => "Confirm appointment",
            Self::NoShow => "Mark no-show",
            Self::Remind => "Send reminder",
            Self::Verify => "Verify insurance",
            Self::Invoice => "Create invoice",
            Self::SetInvoice(InvoiceStatus::Paid) => "Mark invoice paid",
            Self::SetInvoice(_) => "Void invoice",
            Self::Block => "Block time",
            Self::Notify => "Notify patient",
        }
    }

    fn targets_appointment(&self) -> bool {
        matches!(
            self,
            Self::Reschedule | Self::Cancel | Self::Confirm | Self::NoShow | Self::Remind
        )
    }
}

fn is_word_at(text: &str, start: usize, len: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[start + len..].chars().next();
    let boundary = |c: Option<char>| c.is_none_or(|c| !c.is_alphanumeric());
    boundary(before) && boundary(after)
}

/// Result of resolving one thing the plan needs
enum Resolved<T> {
    Found(T),
    Ask(ClarificationQuestion),
    Missing(String),
}

/// A plan before it becomes a [`Plan`]
#[derive(Debug)]
enum Draft {
    Steps { title: String, steps: Vec<Step> },
    Questions { title: String, questions: Vec<ClarificationQuestion> },
    Nothing(String),
}

/// Deterministic keyword planner over the clinic snapshot
#[derive(Debug, Clone, Default)]
pub struct RulePlanner;

impl RulePlanner {
    pub fn new() -> Self {
        Self
    }

    fn draft(&self, text: &str, ctx: &PlanContext) -> Result<Draft, PlanningError> {
        let lowered = text.to_lowercase();
        let Some(intent) = Intent::detect(&lowered) else {
            return Ok(Draft::Nothing("no recognised action".to_string()));
        };
        debug!(?intent, "RulePlanner::draft: intent detected");

        match intent {
            Intent::Block => self.draft_block(&lowered, ctx),
            Intent::SetInvoice(status) => self.draft_invoice_status(&lowered, status, ctx),
            _ => {
                let patient = match resolve_patient(&ctx.snapshot, &lowered)? {
                    Resolved::Found(patient) => patient,
                    Resolved::Ask(question) => {
                        let mut questions = vec![question];
                        if intent == Intent::Reschedule && parse_when(&lowered, ctx.now).is_empty() {
                            questions.push(when_question(None, "When should the appointment move to?"));
                        }
                        return Ok(Draft::Questions {
                            title: intent.title().to_string(),
                            questions,
                        });
                    }
                    Resolved::Missing(reason) => return Ok(Draft::Nothing(reason)),
                };
                if intent.targets_appointment() {
                    self.draft_appointment(intent, patient, &lowered, ctx)
                } else {
                    self.draft_patient(intent, patient, text, &lowered, ctx)
                }
            }
        }
    }

    fn draft_appointment(
        &self,
        intent: Intent,
        patient: &Patient,
        lowered: &str,
        ctx: &PlanContext,
    ) -> Result<Draft, PlanningError> {
        let snapshot = &ctx.snapshot;
        let by_date = intent != Intent::Reschedule;
        let (appointment, rest) = match resolve_appointment(snapshot, patient, lowered, ctx.now, by_date)? {
            (Resolved::Found(appointment), rest) => (appointment, rest),
            (Resolved::Ask(question), rest) => {
                let mut questions = vec![question];
                if intent == Intent::Reschedule && parse_when(&rest, ctx.now).is_empty() {
                    questions.push(when_question(None, "When should the appointment move to?"));
                }
                return Ok(Draft::Questions {
                    title: format!("{} for {}", intent.title(), patient.name),
                    questions,
                });
            }
            (Resolved::Missing(reason), _) => return Ok(Draft::Nothing(reason)),
        };

        let first = patient.first_name();
        let slot = format_slot(appointment.start);
        let mut steps = Vec::new();

        let (title, main, notice) = match intent {
            Intent::Reschedule => {
                let when = parse_when(&rest, ctx.now);
                if when.is_empty() {
                    return Ok(Draft::Questions {
                        title: format!("Reschedule {}", patient.name),
                        questions: vec![when_question(
                            Some(&appointment.id),
                            &format!("When should {}'s {} appointment move to?", first, slot),
                        )],
                    });
                }
                let target = when.resolve(appointment.start);
                if target <= ctx.now {
                    return Ok(Draft::Questions {
                        title: format!("Reschedule {}", patient.name),
                        questions: vec![when_question(
                            Some(&appointment.id),
                            &format!(
                                "{} has already passed. When should {}'s appointment move to?",
                                format_slot(target),
                                first
                            ),
                        )],
                    });
                }
                let target_slot = format_slot(target);
                let action = StepAction::MoveAppointment {
                    appointment_id: appointment.id.clone(),
                    from: appointment.start,
                    to: target,
                };
                (
                    format!("Reschedule {} to {}", patient.name, target_slot),
                    (format!("Move {} from {} to {}", first, slot, target_slot), action),
                    Some(format!(
                        "Hi {}, your appointment with {} has moved to {}. Reply or call us if that time doesn't work.",
                        first, appointment.provider, target_slot
                    )),
                )
            }
            Intent::Cancel | Intent::Confirm | Intent::NoShow => {
                let (to, verb, notice) = match intent {
                    Intent::Cancel => (
                        AppointmentStatus::Cancelled,
                        "Cancel",
                        Some(format!(
                            "Hi {}, your {} appointment with {} has been cancelled. Call us to rebook.",
                            first, slot, appointment.provider
                        )),
                    ),
                    Intent::Confirm => (
                        AppointmentStatus::Confirmed,
                        "Confirm",
                        Some(format!("Hi {}, you're confirmed for {} with {}.", first, slot, appointment.provider)),
                    ),
                    _ => (AppointmentStatus::NoShow, "Mark no-show for", None),
                };
                let action = StepAction::SetAppointmentStatus {
                    appointment_id: appointment.id.clone(),
                    from: appointment.status,
                    to,
                };
                (
                    format!("{} {}'s {} appointment", verb, patient.name, slot),
                    (format!("{} {}'s {} appointment", verb, first, slot), action),
                    notice,
                )
            }
            _ => {
                let action = StepAction::SendReminder {
                    appointment_id: appointment.id.clone(),
                };
                (
                    format!("Remind {} about {}", patient.name, slot),
                    (format!("Send {} a reminder for {}", first, slot), action),
                    None,
                )
            }
        };

        if VERIFY_RE.is_match(&rest) && patient.insurance.is_some() {
            steps.push(step(
                format!("Verify {}'s insurance", first),
                StepAction::VerifyInsurance {
                    patient_id: patient.id.clone(),
                },
                snapshot,
            )?);
        }

        steps.push(step(main.0, main.1, snapshot)?);

        if let Some(message) = notice
            && NOTIFY_RE.is_match(&rest)
        {
            let channel = channel_for(patient, &rest);
            steps.push(step(
                format!("Notify {} by {}", first, channel),
                StepAction::NotifyPatient {
                    patient_id: patient.id.clone(),
                    channel,
                    message,
                },
                snapshot,
            )?);
        }

        Ok(Draft::Steps { title, steps })
    }

    fn draft_patient(
        &self,
        intent: Intent,
        patient: &Patient,
        text: &str,
        lowered: &str,
        ctx: &PlanContext,
    ) -> Result<Draft, PlanningError> {
        let snapshot = &ctx.snapshot;
        let first = patient.first_name();

        match intent {
            Intent::Verify => {
                if patient.insurance.is_none() {
                    return Ok(Draft::Nothing(format!("{} has no insurance on file", patient.name)));
                }
                let s = step(
                    format!("Verify {}'s insurance", first),
                    StepAction::VerifyInsurance {
                        patient_id: patient.id.clone(),
                    },
                    snapshot,
                )?;
                Ok(Draft::Steps {
                    title: format!("Verify insurance for {}", patient.name),
                    steps: vec![s],
                })
            }
            Intent::Invoice => {
                let Some(amount_cents) = parse_amount(lowered) else {
                    let question = ClarificationQuestion::text_input(
                        "amount",
                        format!("How much should {}'s invoice be for?", first),
                    )
                    .with_context(QuestionContext::MissingField {
                        field: "amount".to_string(),
                    });
                    return Ok(Draft::Questions {
                        title: format!("Invoice {}", patient.name),
                        questions: vec![question],
                    });
                };
                let description = FOR_PHRASE_RE
                    .captures(text)
                    .map(|caps| capitalize(&caps[1]))
                    .unwrap_or_else(|| "Services rendered".to_string());
                let action = StepAction::CreateInvoice {
                    invoice_id: generate_id("inv", ""),
                    patient_id: patient.id.clone(),
                    amount_cents,
                    description,
                };
                let s = step(
                    format!("Invoice {} {}", first, format_cents(amount_cents)),
                    action,
                    snapshot,
                )?;
                Ok(Draft::Steps {
                    title: format!("Invoice {} {}", patient.name, format_cents(amount_cents)),
                    steps: vec![s],
                })
            }
            _ => {
                let message = message_after_name(text, patient)?;
                if message.is_empty() {
                    let question = ClarificationQuestion::text_input("message", format!("What should we tell {}?", first))
                        .with_context(QuestionContext::MissingField {
                            field: "message".to_string(),
                        });
                    return Ok(Draft::Questions {
                        title: format!("Notify {}", patient.name),
                        questions: vec![question],
                    });
                }
                let channel = channel_for(patient, lowered);
                let s = step(
                    format!("Send {} a {} message", first, channel),
                    StepAction::NotifyPatient {
                        patient_id: patient.id.clone(),
                        channel,
                        message,
                    },
                    snapshot,
                )?;
                Ok(Draft::Steps {
                    title: format!("Notify {}", patient.name),
                    steps: vec![s],
                })
            }
        }
    }

    fn draft_invoice_status(
        &self,
        lowered: &str,
        status: InvoiceStatus,
        ctx: &PlanContext,
    ) -> Result<Draft, PlanningError> {
        let snapshot = &ctx.snapshot;
        let title = Intent::SetInvoice(status).title();

        let invoice = if let Some(m) = INVOICE_ID_RE.find(lowered) {
            match snapshot.invoice(m.as_str()) {
                Some(invoice) => invoice,
                None => return Ok(Draft::Nothing(format!("no invoice {}", m.as_str()))),
            }
        } else {
            let patient = match resolve_patient(snapshot, lowered)? {
                Resolved::Found(patient) => patient,
                Resolved::Ask(question) => {
                    return Ok(Draft::Questions {
                        title: title.to_string(),
                        questions: vec![question],
                    });
                }
                Resolved::Missing(reason) => return Ok(Draft::Nothing(reason)),
            };
            let candidates: Vec<_> = snapshot
                .invoices
                .iter()
                .filter(|i| i.patient_id == patient.id && i.status == InvoiceStatus::Open)
                .collect();
            match candidates.as_slice() {
                [] => return Ok(Draft::Nothing(format!("{} has no open invoices", patient.name))),
                [only] => *only,
                many => {
                    let options = many
                        .iter()
                        .map(|i| format!("{} ({}, {})", i.id, format_cents(i.amount_cents), i.description))
                        .collect();
                    let question = ClarificationQuestion::single_choice(
                        "invoice",
                        format!("Which of {}'s invoices?", patient.first_name()),
                        options,
                    )?
                    .with_context(QuestionContext::MissingField {
                        field: "invoice".to_string(),
                    });
                    return Ok(Draft::Questions {
                        title: title.to_string(),
                        questions: vec![question],
                    });
                }
            }
        };

        if invoice.status == status {
            return Ok(Draft::Nothing(format!("{} is already {}", invoice.id, status)));
        }
        let action = StepAction::SetInvoiceStatus {
            invoice_id: invoice.id.clone(),
            from: invoice.status,
            to: status,
        };
        let s = step(format!("Mark {} {}", invoice.id, status), action, snapshot)?;
        Ok(Draft::Steps {
            title: format!("Mark {} {}", invoice.id, status),
            steps: vec![s],
        })
    }

    fn draft_block(&self, lowered: &str, ctx: &PlanContext) -> Result<Draft, PlanningError> {
        let when = parse_when(lowered, ctx.now);
        if when.is_empty() {
            return Ok(Draft::Questions {
                title: "Block time".to_string(),
                questions: vec![when_question(None, "When should the time be blocked?")],
            });
        }

        let opening = NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default();
        let closing = NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default();
        let anchor = Utc.from_utc_datetime(&ctx.now.date_naive().and_time(opening));
        let start = when.resolve(anchor);
        let end = if let Some(end) = when.resolve_end(anchor) {
            end
        } else if let Some(duration) = parse_duration(lowered) {
            if duration > Duration::hours(MAX_BLOCK_HOURS) {
                return Ok(Draft::Nothing(format!("block is longer than {} hours", MAX_BLOCK_HOURS)));
            }
            match start.checked_add_signed(duration) {
                Some(end) => end,
                None => return Ok(Draft::Nothing("block is too long".to_string())),
            }
        } else if when.time.is_some() {
            start + Duration::hours(1)
        } else {
            Utc.from_utc_datetime(&start.date_naive().and_time(closing))
        };

        if end <= start {
            return Ok(Draft::Nothing("block ends before it starts".to_string()));
        }
        if start <= ctx.now {
            return Ok(Draft::Questions {
                title: "Block time".to_string(),
                questions: vec![when_question(
                    None,
                    &format!("{} has already passed. When should the time be blocked?", format_slot(start)),
                )],
            });
        }

        let reason = FOR_PHRASE_RE
            .captures(lowered)
            .map(|caps| caps[1].to_string())
            .unwrap_or_else(|| "blocked".to_string());
        let action = StepAction::BlockTime {
            block_id: generate_id("block", &reason),
            start,
            end,
            reason: reason.clone(),
        };
        let label = format!("Block {} to {} ({})", format_slot(start), end.format("%H:%M"), reason);
        let s = step(label.clone(), action, &ctx.snapshot)?;
        Ok(Draft::Steps {
            title: label,
            steps: vec![s],
        })
    }
}

#[async_trait]
impl Planner for RulePlanner {
    fn name(&self) -> &'static str {
        "rules"
    }

    async fn create_plan(&self, text: &str, ctx: &PlanContext) -> Result<Option<Plan>, PlanningError> {
        debug!(%text, "RulePlanner::create_plan: called");
        let actor = ctx.plan_actor();
        match self.draft(text, ctx)? {
            Draft::Steps { title, steps } => {
                debug!(%title, step_count = steps.len(), "RulePlanner::create_plan: plan drafted");
                Ok(Some(Plan::new(title, actor, ctx.source, steps).with_original_command(text)))
            }
            Draft::Questions { title, questions } => {
                debug!(%title, question_count = questions.len(), "RulePlanner::create_plan: needs clarification");
                Ok(Some(Plan::needing_clarification(title, actor, ctx.source, questions, text)?))
            }
            Draft::Nothing(reason) => {
                debug!(%reason, "RulePlanner::create_plan: no plan");
                Ok(None)
            }
        }
    }
}

fn step(label: String, action: StepAction, snapshot: &ClinicSnapshot) -> Result<Step, PlanningError> {
    let undo = compensate(&action, snapshot)?;
    Ok(Step::new(label, action, undo))
}

fn resolve_patient<'a>(snapshot: &'a ClinicSnapshot, lowered: &str) -> Result<Resolved<&'a Patient>, PlanningError> {
    let matches = snapshot.patients_mentioned(lowered);
    debug!(count = matches.len(), "resolve_patient: called");
    let resolved = match matches.as_slice() {
        [] => Resolved::Ask(
            ClarificationQuestion::text_input("patient", "Which patient is this for?").with_context(
                QuestionContext::MissingField {
                    field: "patient".to_string(),
                },
            ),
        ),
        [only] => Resolved::Found(*only),
        many => {
            let first = many[0].first_name();
            let question = ClarificationQuestion::single_choice(
                "patient",
                format!("Which {} do you mean?", first),
                many.iter().map(|p| p.name.clone()).collect(),
            )?
            .with_context(QuestionContext::PatientMatch {
                candidate_ids: many.iter().map(|p| p.id.clone()).collect(),
            });
            Resolved::Ask(question)
        }
    };
    Ok(resolved)
}

/// Pick the appointment a command is about
///
/// Returns the command text with the chosen appointment's label removed, so
/// the label's own date and time are not read as a target.
fn resolve_appointment<'a>(
    snapshot: &'a ClinicSnapshot,
    patient: &Patient,
    lowered: &str,
    now: DateTime<Utc>,
    by_date: bool,
) -> Result<(Resolved<&'a Appointment>, String), PlanningError> {
    let day_start = Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::default()));
    let candidates = snapshot.upcoming_for_patient(&patient.id, day_start);
    debug!(patient_id = %patient.id, count = candidates.len(), "resolve_appointment: called");

    if candidates.is_empty() {
        let reason = format!("{} has no upcoming appointments", patient.name);
        return Ok((Resolved::Missing(reason), lowered.to_string()));
    }

    for appointment in &candidates {
        let label = appointment.label().to_lowercase();
        if lowered.contains(&label) {
            let rest = lowered.replacen(&label, " ", 1);
            return Ok((Resolved::Found(*appointment), rest));
        }
    }

    if let [only] = candidates.as_slice() {
        return Ok((Resolved::Found(*only), lowered.to_string()));
    }

    if by_date && let Some(date) = parse_when(lowered, now).date {
        let on_date: Vec<_> = candidates.iter().filter(|a| a.start.date_naive() == date).collect();
        if let [only] = on_date.as_slice() {
            return Ok((Resolved::Found(**only), lowered.to_string()));
        }
    }

    let question = ClarificationQuestion::single_choice(
        "appointment",
        format!("Which of {}'s appointments?", patient.first_name()),
        candidates.iter().map(|a| a.label()).collect(),
    )?
    .with_context(QuestionContext::AppointmentMatch {
        candidate_ids: candidates.iter().map(|a| a.id.clone()).collect(),
    });
    Ok((Resolved::Ask(question), lowered.to_string()))
}

fn when_question(appointment_id: Option<&str>, prompt: &str) -> ClarificationQuestion {
    ClarificationQuestion::date_picker("when", prompt).with_context(QuestionContext::MissingTime {
        appointment_id: appointment_id.map(str::to_string),
    })
}

/// Email when asked for, otherwise SMS unless the patient only has email
fn channel_for(patient: &Patient, lowered: &str) -> NotifyChannel {
    let wants_email = lowered.split(|c: char| !c.is_alphanumeric()).any(|w| w == "email");
    if wants_email && patient.email.is_some() {
        NotifyChannel::Email
    } else if patient.phone.is_none() && patient.email.is_some() {
        NotifyChannel::Email
    } else {
        NotifyChannel::Sms
    }
}

fn parse_amount(lowered: &str) -> Option<i64> {
    let caps = AMOUNT_RE.captures(lowered)?;
    let (dollars, cents) = [(1, 2), (3, 4), (5, 6)]
        .into_iter()
        .find_map(|(d, c)| caps.get(d).map(|m| (m.as_str(), caps.get(c).map(|m| m.as_str()))))?;
    let dollars: i64 = dollars.parse().ok()?;
    let cents: i64 = match cents {
        Some(c) if c.len() == 1 => c.parse::<i64>().ok()? * 10,
        Some(c) => c.parse().ok()?,
        None => 0,
    };
    let total = dollars * 100 + cents;
    (total > 0).then_some(total)
}

/// Free text following the patient's name, e.g. the message in
/// `text Sarah that we are running late`
fn message_after_name(text: &str, patient: &Patient) -> Result<String, PlanningError> {
    for name in [patient.name.as_str(), patient.first_name()] {
        let pattern = format!(r"(?i)\b{}\b", regex::escape(name));
        let re = Regex::new(&pattern).map_err(|e| PlanningError::Failed(e.to_string()))?;
        if let Some(m) = re.find(text) {
            let rest = text[m.end()..]
                .trim_start_matches(|c: char| c.is_whitespace() || c == ',' || c == ':')
                .trim();
            let rest = rest
                .strip_prefix("that ")
                .or_else(|| rest.strip_prefix("to say "))
                .unwrap_or(rest)
                .trim();
            return Ok(capitalize(rest));
        }
    }
    Ok(String::new())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
