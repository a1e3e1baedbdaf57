//! Clarification answers: validation and command enrichment
//!
//! A plan that needs clarification carries a list of questions. The caller
//! collects [`Answers`] keyed by question ID, validates them with
//! [`validate_answers`], and folds them back into the command text with
//! [`enrich_command`] before dispatching again.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::{ClarificationQuestion, QuestionType};

/// One answer value
///
/// Deserializes from either a string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    One(String),
    Many(Vec<String>),
}

impl Answer {
    pub fn one(value: impl Into<String>) -> Self {
        Self::One(value.into())
    }

    pub fn many<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Many(values.into_iter().map(Into::into).collect())
    }

    /// Non-blank values, trimmed
    pub fn values(&self) -> Vec<&str> {
        let raw: Vec<&str> = match self {
            Self::One(v) => vec![v.as_str()],
            Self::Many(vs) => vs.iter().map(String::as_str).collect(),
        };
        raw.into_iter().map(str::trim).filter(|v| !v.is_empty()).collect()
    }

    pub fn is_blank(&self) -> bool {
        self.values().is_empty()
    }
}

impl From<&str> for Answer {
    fn from(value: &str) -> Self {
        Self::One(value.to_string())
    }
}

impl From<String> for Answer {
    fn from(value: String) -> Self {
        Self::One(value)
    }
}

impl From<Vec<String>> for Answer {
    fn from(values: Vec<String>) -> Self {
        Self::Many(values)
    }
}

/// Answers keyed by question ID
pub type Answers = HashMap<String, Answer>;

/// A single rejected answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidAnswer {
    pub question_id: String,
    pub reason: String,
}

/// Every problem found in a set of answers
#[derive(Debug, Clone, Error, PartialEq, Eq, Default)]
#[error("Invalid clarification answers: {}", describe(.missing, .invalid))]
pub struct ValidationError {
    /// Required questions with no usable answer, in question order
    pub missing: Vec<String>,
    /// Answers that do not fit their question, in question order
    pub invalid: Vec<InvalidAnswer>,
}

impl ValidationError {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.invalid.is_empty()
    }
}

fn describe(missing: &[String], invalid: &[InvalidAnswer]) -> String {
    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("missing answers for {}", missing.join(", ")));
    }
    for answer in invalid {
        parts.push(format!("{}: {}", answer.question_id, answer.reason));
    }
    parts.join("; ")
}

/// Check answers against their questions
///
/// Collects every missing required answer and every invalid answer rather
/// than stopping at the first. Answers for unknown question IDs are ignored.
pub fn validate_answers(questions: &[ClarificationQuestion], answers: &Answers) -> Result<(), ValidationError> {
    debug!(
        question_count = questions.len(),
        answer_count = answers.len(),
        "validate_answers: called"
    );
    let mut error = ValidationError::default();

    for question in questions {
        let answer = answers.get(&question.id).filter(|a| !a.is_blank());
        let Some(answer) = answer else {
            if question.required {
                error.missing.push(question.id.clone());
            }
            continue;
        };
        if let Err(reason) = check_answer(question, answer) {
            error.invalid.push(InvalidAnswer {
                question_id: question.id.clone(),
                reason,
            });
        }
    }

    if error.is_empty() {
        Ok(())
    } else {
        debug!(?error, "validate_answers: rejected");
        Err(error)
    }
}

fn check_answer(question: &ClarificationQuestion, answer: &Answer) -> Result<(), String> {
    let values = answer.values();
    let unknown = |v: &str| !question.options.iter().any(|o| o == v);

    match question.question_type {
        QuestionType::SingleChoice => {
            if values.len() != 1 {
                return Err(format!("expected exactly one option, got {}", values.len()));
            }
            if unknown(values[0]) {
                return Err(format!("'{}' is not one of the options", values[0]));
            }
        }
        QuestionType::MultipleChoice => {
            if let Some(bad) = values.iter().find(|v| unknown(v)) {
                return Err(format!("'{}' is not one of the options", bad));
            }
            let mut seen = values.clone();
            seen.sort_unstable();
            seen.dedup();
            if seen.len() != values.len() {
                return Err("options may only be chosen once".to_string());
            }
        }
        QuestionType::TextInput => {
            if matches!(answer, Answer::Many(_)) && values.len() > 1 {
                return Err("expected a single text value".to_string());
            }
        }
        QuestionType::DatePicker => {
            if values.len() != 1 {
                return Err("expected a single date".to_string());
            }
            if parse_date_answer(values[0]).is_none() {
                return Err(format!("'{}' is not an ISO-8601 date or date-time", values[0]));
            }
        }
    }
    Ok(())
}

/// Parse a date-picker answer
///
/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM[:SS]` (read as UTC) and `YYYY-MM-DD`
/// (midnight UTC).
pub fn parse_date_answer(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Fold answers back into the command text
///
/// The original command comes first, then each answered question's value in
/// question order, separated by single spaces. Multi-valued answers are
/// joined with `", "`. Unanswered optional questions contribute nothing.
pub fn enrich_command(original: &str, questions: &[ClarificationQuestion], answers: &Answers) -> String {
    debug!(%original, "enrich_command: called");
    let mut parts = vec![original.trim().to_string()];
    for question in questions {
        if let Some(answer) = answers.get(&question.id) {
            let values = answer.values();
            if !values.is_empty() {
                parts.push(values.join(", "));
            }
        }
    }
    parts.join(" ")
}
