//! Step action descriptors
//!
//! A step's work and its compensation are plain data: a tagged action that the
//! [`crate::actions::ActionExecutor`] interprets. Plans therefore serialize,
//! travel across sessions by value and can be replayed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::clinic::{AppointmentStatus, InvoiceStatus, format_slot};

/// Channel used to reach a patient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotifyChannel {
    #[default]
    Sms,
    Email,
}

impl std::fmt::Display for NotifyChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sms => write!(f, "sms"),
            Self::Email => write!(f, "email"),
        }
    }
}

/// Discriminant of [`StepAction`], used to route to a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    MoveAppointment,
    SetAppointmentStatus,
    NotifyPatient,
    SendReminder,
    VerifyInsurance,
    CreateInvoice,
    SetInvoiceStatus,
    BlockTime,
    UnblockTime,
    Noop,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::MoveAppointment => "move_appointment",
            Self::SetAppointmentStatus => "set_appointment_status",
            Self::NotifyPatient => "notify_patient",
            Self::SendReminder => "send_reminder",
            Self::VerifyInsurance => "verify_insurance",
            Self::CreateInvoice => "create_invoice",
            Self::SetInvoiceStatus => "set_invoice_status",
            Self::BlockTime => "block_time",
            Self::UnblockTime => "unblock_time",
            Self::Noop => "noop",
        };
        write!(f, "{}", name)
    }
}

/// A unit of work against the clinic, described as data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepAction {
    MoveAppointment {
        appointment_id: String,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
    SetAppointmentStatus {
        appointment_id: String,
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    NotifyPatient {
        patient_id: String,
        #[serde(default)]
        channel: NotifyChannel,
        message: String,
    },
    SendReminder {
        appointment_id: String,
    },
    VerifyInsurance {
        patient_id: String,
    },
    CreateInvoice {
        invoice_id: String,
        patient_id: String,
        amount_cents: i64,
        description: String,
    },
    SetInvoiceStatus {
        invoice_id: String,
        from: InvoiceStatus,
        to: InvoiceStatus,
    },
    BlockTime {
        block_id: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        reason: String,
    },
    UnblockTime {
        block_id: String,
    },
    Noop {
        note: String,
    },
}

impl StepAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::MoveAppointment { .. } => ActionKind::MoveAppointment,
            Self::SetAppointmentStatus { .. } => ActionKind::SetAppointmentStatus,
            Self::NotifyPatient { .. } => ActionKind::NotifyPatient,
            Self::SendReminder { .. } => ActionKind::SendReminder,
            Self::VerifyInsurance { .. } => ActionKind::VerifyInsurance,
            Self::CreateInvoice { .. } => ActionKind::CreateInvoice,
            Self::SetInvoiceStatus { .. } => ActionKind::SetInvoiceStatus,
            Self::BlockTime { .. } => ActionKind::BlockTime,
            Self::UnblockTime { .. } => ActionKind::UnblockTime,
            Self::Noop { .. } => ActionKind::Noop,
        }
    }

    pub fn noop(note: impl Into<String>) -> Self {
        Self::Noop { note: note.into() }
    }

    /// The action that reverses a move
    pub fn move_back(appointment_id: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self::MoveAppointment {
            appointment_id: appointment_id.to_string(),
            from: to,
            to: from,
        }
    }

    /// One-line description for logs and plan previews
    pub fn summary(&self) -> String {
        match self {
            Self::MoveAppointment { appointment_id, to, .. } => {
                format!("move {} to {}", appointment_id, format_slot(*to))
            }
            Self::SetAppointmentStatus { appointment_id, to, .. } => {
                format!("mark {} {}", appointment_id, to)
            }
            Self::NotifyPatient {
                patient_id, channel, ..
            } => format!("{} {}", channel, patient_id),
            Self::SendReminder { appointment_id } => format!("remind {}", appointment_id),
            Self::VerifyInsurance { patient_id } => format!("verify insurance for {}", patient_id),
            Self::CreateInvoice {
                invoice_id,
                amount_cents,
                ..
            } => format!("invoice {} for {}", invoice_id, format_cents(*amount_cents)),
            Self::SetInvoiceStatus { invoice_id, to, .. } => format!("mark {} {}", invoice_id, to),
            Self::BlockTime { start, end, .. } => {
                format!("block {} to {}", format_slot(*start), format_slot(*end))
            }
            Self::UnblockTime { block_id } => format!("unblock {}", block_id),
            Self::Noop { note } => note.clone(),
        }
    }
}

/// Format cents as dollars, e.g. `$120.00`
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}${}.{:02}", sign, abs / 100, abs % 100)
}
