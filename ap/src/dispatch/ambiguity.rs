//! Cheap pre-planning checks on raw command text

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::debug;

use crate::planner::time::parse_when;

/// Verbs that move or book appointments
pub(crate) static SCHEDULING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(reschedule|move|push|rebook|book|schedule)\b").expect("valid regex"));

pub(crate) static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bblock\b").expect("valid regex"));

static QUESTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(what|what's|how|who|who's|whose|when|where|which|why|is|are|does|do)\b").expect("valid regex")
});

/// Decides whether a command should get a conversational turn before planning
pub trait AmbiguityDetector: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_ambiguous(&self, command: &str, now: DateTime<Utc>) -> bool;
}

/// Flags scheduling commands that carry no date or time
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordDetector;

impl AmbiguityDetector for KeywordDetector {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn is_ambiguous(&self, command: &str, now: DateTime<Utc>) -> bool {
        let keyword = SCHEDULING_RE.is_match(command) || BLOCK_RE.is_match(command);
        let ambiguous = keyword && parse_when(command, now).is_empty();
        debug!(%command, keyword, ambiguous, "KeywordDetector::is_ambiguous: called");
        ambiguous
    }
}

/// Never asks; every command goes straight to the planner
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverAmbiguous;

impl AmbiguityDetector for NeverAmbiguous {
    fn name(&self) -> &'static str {
        "never"
    }

    fn is_ambiguous(&self, _command: &str, _now: DateTime<Utc>) -> bool {
        false
    }
}

/// Whether the text is a question about clinic data rather than a command
pub fn is_question(text: &str) -> bool {
    QUESTION_RE.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_keyword_without_time_is_ambiguous() {
        let detector = KeywordDetector;
        assert!(detector.is_ambiguous("reschedule appointment", now()));
        assert!(detector.is_ambiguous("move Sarah", now()));
        assert!(detector.is_ambiguous("block the afternoon", now()));
    }

    #[test]
    fn test_keyword_with_time_is_not_ambiguous() {
        let detector = KeywordDetector;
        assert!(!detector.is_ambiguous("reschedule Sarah to Thu 2:30pm and notify", now()));
        assert!(!detector.is_ambiguous("move Michael Chen to 10/23", now()));
        assert!(!detector.is_ambiguous("block tomorrow", now()));
    }

    #[test]
    fn test_non_scheduling_command_is_not_ambiguous() {
        let detector = KeywordDetector;
        assert!(!detector.is_ambiguous("confirm Sarah", now()));
        assert!(!detector.is_ambiguous("void inv-501", now()));
    }

    #[test]
    fn test_keyword_needs_word_boundary() {
        assert!(!KeywordDetector.is_ambiguous("remove the booking note", now()));
    }

    #[test]
    fn test_is_question() {
        assert!(is_question("how many appointments today?"));
        assert!(is_question("Who is booked tomorrow"));
        assert!(is_question("what's Emily's balance"));
        assert!(!is_question("reschedule Sarah to thu 2pm"));
        assert!(!is_question("whatever, confirm Sarah"));
    }
}
