//! Date and time phrases in commands
//!
//! Understands weekdays (`thu`, `thursday`), `today`/`tomorrow`, `mm/dd`,
//! ISO dates and date-times, and clock times (`2:30pm`, `2pm`, `14:30`,
//! `noon`). All times are clinic-local and carried as UTC.

use std::ops::Range;
use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use regex::Regex;
use tracing::debug;

use crate::clarification::parse_date_answer;

static ISO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{4}-\d{2}-\d{2})(T\d{1,2}:\d{2}(?::\d{2})?(?:Z|[+-]\d{2}:\d{2})?)?").expect("valid regex")
});

static RELATIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(today|tomorrow)\b").expect("valid regex"));

static WEEKDAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(mon(?:day)?|tue(?:s|sday)?|wed(?:nesday)?|thu(?:rsday|rs|r)?|fri(?:day)?|sat(?:urday)?|sun(?:day)?)\b",
    )
    .expect("valid regex")
});

static MONTH_DAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})\b").expect("valid regex"));

static TIME_12H_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)\b").expect("valid regex"));

static TIME_24H_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([01]?\d|2[0-3]):([0-5]\d)\b").expect("valid regex"));

static NOON_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bnoon\b").expect("valid regex"));

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bfor\s+(\d+)\s*(hours?|hrs?|h|minutes?|mins?)\b").expect("valid regex")
});

/// Date and clock times found in a command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WhenSpec {
    pub date: Option<NaiveDate>,
    /// First clock time mentioned
    pub time: Option<NaiveTime>,
    /// Second clock time mentioned, e.g. the end of a range
    pub end_time: Option<NaiveTime>,
}

impl WhenSpec {
    pub fn is_empty(&self) -> bool {
        self.date.is_none() && self.time.is_none()
    }

    /// Fill the gaps from `anchor`: a bare date keeps the anchor's time of
    /// day and a bare time keeps the anchor's date
    pub fn resolve(&self, anchor: DateTime<Utc>) -> DateTime<Utc> {
        let date = self.date.unwrap_or_else(|| anchor.date_naive());
        let time = self.time.unwrap_or_else(|| anchor.time());
        Utc.from_utc_datetime(&date.and_time(time))
    }

    /// End of a range on the resolved date, if a second time was given
    pub fn resolve_end(&self, anchor: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let end = self.end_time?;
        let date = self.date.unwrap_or_else(|| anchor.date_naive());
        Some(Utc.from_utc_datetime(&date.and_time(end)))
    }
}

/// Find the date and times mentioned in `text`, relative to `now`
pub fn parse_when(text: &str, now: DateTime<Utc>) -> WhenSpec {
    debug!(%text, "parse_when: called");
    let mut masked = text.to_string();
    let mut dates: Vec<(usize, NaiveDate)> = Vec::new();
    let mut times: Vec<(usize, NaiveTime)> = Vec::new();
    let today = now.date_naive();

    for m in ISO_RE.find_iter(text) {
        if let Some(dt) = parse_date_answer(m.as_str()) {
            dates.push((m.start(), dt.date_naive()));
            if m.as_str().contains('T') {
                times.push((m.start(), dt.time()));
            }
            blank(&mut masked, m.range());
        }
    }

    let scan = masked.clone();
    for caps in TIME_12H_RE.captures_iter(&scan) {
        let Some(whole) = caps.get(0) else { continue };
        let hour: u32 = caps[1].parse().unwrap_or(99);
        let minute: u32 = caps.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
        let pm = caps[3].eq_ignore_ascii_case("pm");
        if let Some(time) = twelve_hour(hour, minute, pm) {
            times.push((whole.start(), time));
            blank(&mut masked, whole.range());
        }
    }

    let scan = masked.clone();
    for caps in TIME_24H_RE.captures_iter(&scan) {
        let Some(whole) = caps.get(0) else { continue };
        let hour: u32 = caps[1].parse().unwrap_or(99);
        let minute: u32 = caps[2].parse().unwrap_or(99);
        if let Some(time) = NaiveTime::from_hms_opt(hour, minute, 0) {
            times.push((whole.start(), time));
            blank(&mut masked, whole.range());
        }
    }

    for m in NOON_RE.find_iter(&masked) {
        if let Some(time) = NaiveTime::from_hms_opt(12, 0, 0) {
            times.push((m.start(), time));
        }
    }

    for caps in RELATIVE_RE.captures_iter(&masked) {
        let offset = if caps[1].eq_ignore_ascii_case("today") { 0 } else { 1 };
        if let Some(whole) = caps.get(0) {
            dates.push((whole.start(), today + Duration::days(offset)));
        }
    }

    for caps in WEEKDAY_RE.captures_iter(&masked) {
        if let (Some(whole), Some(weekday)) = (caps.get(0), weekday_from(&caps[1])) {
            dates.push((whole.start(), next_weekday(today, weekday)));
        }
    }

    for caps in MONTH_DAY_RE.captures_iter(&masked) {
        let month: u32 = caps[1].parse().unwrap_or(0);
        let day: u32 = caps[2].parse().unwrap_or(0);
        if let (Some(whole), Some(date)) = (caps.get(0), next_month_day(today, month, day)) {
            dates.push((whole.start(), date));
        }
    }

    dates.sort_by_key(|(pos, _)| *pos);
    times.sort_by_key(|(pos, _)| *pos);

    let spec = WhenSpec {
        date: dates.first().map(|(_, d)| *d),
        time: times.first().map(|(_, t)| *t),
        end_time: times.get(1).map(|(_, t)| *t),
    };
    debug!(?spec, "parse_when: parsed");
    spec
}

/// Duration phrases like `for 2 hours` or `for 90 minutes`
///
/// Amounts too large to represent saturate at `Duration::MAX`.
pub fn parse_duration(text: &str) -> Option<Duration> {
    let caps = DURATION_RE.captures(text)?;
    let amount: i64 = caps[1].parse().unwrap_or(i64::MAX);
    let unit = caps[2].to_lowercase();
    let minutes = if unit.starts_with('h') {
        amount.saturating_mul(60)
    } else {
        amount
    };
    Some(Duration::try_minutes(minutes).unwrap_or(Duration::MAX))
}

fn blank(text: &mut String, range: Range<usize>) {
    let len = range.len();
    text.replace_range(range, &" ".repeat(len));
}

fn twelve_hour(hour: u32, minute: u32, pm: bool) -> Option<NaiveTime> {
    if !(1..=12).contains(&hour) {
        return None;
    }
    let hour = match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, true) => h + 12,
        (h, false) => h,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn weekday_from(token: &str) -> Option<Weekday> {
    let lowered = token.to_lowercase();
    let weekday = match lowered.get(..3)? {
        "mon" => Weekday::Mon,
        "tue" => Weekday::Tue,
        "wed" => Weekday::Wed,
        "thu" => Weekday::Thu,
        "fri" => Weekday::Fri,
        "sat" => Weekday::Sat,
        "sun" => Weekday::Sun,
        _ => return None,
    };
    Some(weekday)
}

/// The next occurrence of `weekday` strictly after `today`
fn next_weekday(today: NaiveDate, weekday: Weekday) -> NaiveDate {
    let current = today.weekday().num_days_from_monday() as i64;
    let target = weekday.num_days_from_monday() as i64;
    let mut ahead = (target - current).rem_euclid(7);
    if ahead == 0 {
        ahead = 7;
    }
    today + Duration::days(ahead)
}

/// This year's `month/day`, or next year's if it has already passed
fn next_month_day(today: NaiveDate, month: u32, day: u32) -> Option<NaiveDate> {
    let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    if this_year >= today {
        Some(this_year)
    } else {
        NaiveDate::from_ymd_opt(today.year() + 1, month, day)
    }
}
