//! Clinic domain snapshot
//!
//! Read-only collections of patients, appointments, invoices and calendar
//! blocks handed to planners as context. Step actions mutate a live copy
//! held by [`crate::actions::Clinic`]; planners only ever see snapshots.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Appointment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    #[default]
    Scheduled,
    Confirmed,
    Cancelled,
    NoShow,
    Completed,
}

impl AppointmentStatus {
    /// Whether the appointment still occupies its slot
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Scheduled | Self::Confirmed)
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::NoShow => write!(f, "no_show"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Invoice status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    #[default]
    Open,
    Paid,
    Void,
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Paid => write!(f, "paid"),
            Self::Void => write!(f, "void"),
        }
    }
}

/// Insurance coverage on file for a patient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsurancePolicy {
    pub payer: String,
    pub member_id: String,
    #[serde(default)]
    pub verified_at: Option<DateTime<Utc>>,
}

/// A patient of the clinic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub insurance: Option<InsurancePolicy>,
}

impl Patient {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            phone: None,
            email: None,
            insurance: None,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_insurance(mut self, payer: impl Into<String>, member_id: impl Into<String>) -> Self {
        self.insurance = Some(InsurancePolicy {
            payer: payer.into(),
            member_id: member_id.into(),
            verified_at: None,
        });
        self
    }

    /// First word of the patient's name
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }
}

/// A booked appointment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub patient_id: String,
    pub provider: String,
    pub start: DateTime<Utc>,
    pub duration_minutes: u32,
    #[serde(default)]
    pub status: AppointmentStatus,
    #[serde(default)]
    pub room: Option<String>,
}

impl Appointment {
    pub fn new(
        id: impl Into<String>,
        patient_id: impl Into<String>,
        provider: impl Into<String>,
        start: DateTime<Utc>,
        duration_minutes: u32,
    ) -> Self {
        Self {
            id: id.into(),
            patient_id: patient_id.into(),
            provider: provider.into(),
            start,
            duration_minutes,
            status: AppointmentStatus::Scheduled,
            room: None,
        }
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.start
            .checked_add_signed(Duration::minutes(i64::from(self.duration_minutes)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Whether this appointment overlaps the given interval
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && start < self.end()
    }

    /// Stable human label, also used to match clarification answers
    pub fn label(&self) -> String {
        format!("{} with {}", format_slot(self.start), self.provider)
    }
}

/// An invoice issued to a patient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub patient_id: String,
    pub amount_cents: i64,
    pub description: String,
    #[serde(default)]
    pub status: InvoiceStatus,
}

/// A blocked interval on the clinic calendar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBlock {
    pub id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub reason: String,
}

/// Read-only view of clinic data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClinicSnapshot {
    pub patients: Vec<Patient>,
    pub appointments: Vec<Appointment>,
    pub invoices: Vec<Invoice>,
    pub blocks: Vec<TimeBlock>,
}

impl ClinicSnapshot {
    pub fn patient(&self, id: &str) -> Option<&Patient> {
        self.patients.iter().find(|p| p.id == id)
    }

    pub fn appointment(&self, id: &str) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == id)
    }

    pub fn invoice(&self, id: &str) -> Option<&Invoice> {
        self.invoices.iter().find(|i| i.id == id)
    }

    /// Patients mentioned in free text
    ///
    /// Full-name matches win over first-name matches, so an answer like
    /// "Michael Chen" narrows an earlier ambiguous "Michael".
    pub fn patients_mentioned(&self, text: &str) -> Vec<&Patient> {
        debug!(%text, "ClinicSnapshot::patients_mentioned: called");
        let lowered = text.to_lowercase();
        let words: Vec<String> = lowered
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .map(|w| w.trim_end_matches("'s").to_string())
            .filter(|w| !w.is_empty())
            .collect();

        let full: Vec<&Patient> = self
            .patients
            .iter()
            .filter(|p| contains_phrase(&lowered, &p.name.to_lowercase()))
            .collect();
        if !full.is_empty() {
            debug!(count = full.len(), "ClinicSnapshot::patients_mentioned: full-name matches");
            return full;
        }

        self.patients
            .iter()
            .filter(|p| {
                let first = p.first_name().to_lowercase();
                words.iter().any(|w| *w == first)
            })
            .collect()
    }

    /// Active appointments for a patient starting at or after `now`, earliest first
    pub fn upcoming_for_patient(&self, patient_id: &str, now: DateTime<Utc>) -> Vec<&Appointment> {
        let mut upcoming: Vec<&Appointment> = self
            .appointments
            .iter()
            .filter(|a| a.patient_id == patient_id && a.status.is_active() && a.start >= now)
            .collect();
        upcoming.sort_by_key(|a| a.start);
        upcoming
    }

    /// Active appointments on the calendar day of `day`, earliest first
    pub fn appointments_on(&self, day: DateTime<Utc>) -> Vec<&Appointment> {
        let mut list: Vec<&Appointment> = self
            .appointments
            .iter()
            .filter(|a| a.status.is_active() && a.start.date_naive() == day.date_naive())
            .collect();
        list.sort_by_key(|a| a.start);
        list
    }

    /// All active appointments starting at or after `now`, earliest first
    pub fn upcoming(&self, now: DateTime<Utc>) -> Vec<&Appointment> {
        let mut list: Vec<&Appointment> = self
            .appointments
            .iter()
            .filter(|a| a.status.is_active() && a.start >= now)
            .collect();
        list.sort_by_key(|a| a.start);
        list
    }

    pub fn open_invoices(&self) -> Vec<&Invoice> {
        self.invoices
            .iter()
            .filter(|i| i.status == InvoiceStatus::Open)
            .collect()
    }

    /// Demo practice used by the CLI when no snapshot file is configured
    pub fn demo(now: DateTime<Utc>) -> Self {
        debug!(%now, "ClinicSnapshot::demo: called");
        let day = |offset: i64, hour: u32, minute: u32| -> DateTime<Utc> {
            let date = (now + Duration::days(offset)).date_naive();
            Utc.from_utc_datetime(&date.and_hms_opt(hour, minute, 0).unwrap_or_default())
        };

        let patients = vec![
            Patient::new("pat-sarah", "Sarah Johnson")
                .with_phone("+1-555-0101")
                .with_insurance("Aetna", "AET-22817"),
            Patient::new("pat-michael-c", "Michael Chen").with_email("mchen@example.com"),
            Patient::new("pat-michael-b", "Michael Brown").with_phone("+1-555-0144"),
            Patient::new("pat-emily", "Emily Davis")
                .with_phone("+1-555-0178")
                .with_insurance("Blue Cross", "BCX-99120"),
        ];

        let appointments = vec![
            Appointment::new("apt-1001", "pat-sarah", "Dr. Patel", day(1, 9, 0), 30),
            Appointment::new("apt-1002", "pat-michael-c", "Dr. Patel", day(1, 10, 0), 45),
            Appointment::new("apt-1003", "pat-michael-b", "Dr. Okafor", day(2, 11, 30), 30),
            Appointment::new("apt-1004", "pat-emily", "Dr. Okafor", day(0, 16, 0), 60),
        ];

        let invoices = vec![Invoice {
            id: "inv-501".to_string(),
            patient_id: "pat-emily".to_string(),
            amount_cents: 12_000,
            description: "Follow-up visit".to_string(),
            status: InvoiceStatus::Open,
        }];

        Self {
            patients,
            appointments,
            invoices,
            blocks: Vec::new(),
        }
    }
}

/// Format a slot like `Thu Oct 22 14:30`
pub fn format_slot(at: DateTime<Utc>) -> String {
    format!(
        "{} {} {} {:02}:{:02}",
        at.format("%a"),
        at.format("%b"),
        at.day(),
        at.hour(),
        at.minute()
    )
}

/// Word-boundary phrase containment on lowercase text
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    haystack.match_indices(phrase).any(|(idx, _)| {
        let before_ok = haystack[..idx]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let after_ok = haystack[idx + phrase.len()..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}
