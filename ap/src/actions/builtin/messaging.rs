//! Patient messaging handlers

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::actions::{ActionContext, ActionError, ActionHandler, ActionOutcome, Notification, NotificationKind};
use crate::domain::{ActionKind, NotifyChannel, Patient, StepAction, format_slot};

fn has_channel(patient: &Patient, channel: NotifyChannel) -> bool {
    match channel {
        NotifyChannel::Sms => patient.phone.is_some(),
        NotifyChannel::Email => patient.email.is_some(),
    }
}

/// Send a free-form message to a patient
pub struct NotifyPatientHandler;

#[async_trait]
impl ActionHandler for NotifyPatientHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::NotifyPatient
    }

    fn description(&self) -> &'static str {
        "Send a message to a patient by SMS or email"
    }

    async fn execute(&self, action: &StepAction, ctx: &ActionContext) -> Result<ActionOutcome, ActionError> {
        let StepAction::NotifyPatient {
            patient_id,
            channel,
            message,
        } = action
        else {
            return Err(ActionError::mismatch(self.kind(), action));
        };
        debug!(%patient_id, %channel, "NotifyPatientHandler::execute: called");

        let mut state = ctx.clinic.lock().await;
        let patient = state
            .snapshot
            .patient(patient_id)
            .ok_or_else(|| ActionError::not_found("patient", patient_id.as_str()))?;
        if !has_channel(patient, *channel) {
            return Err(ActionError::NoContact {
                patient_id: patient_id.clone(),
                channel: *channel,
            });
        }
        let name = patient.name.clone();

        state.outbox.push(Notification {
            patient_id: patient_id.clone(),
            channel: *channel,
            kind: NotificationKind::Message,
            message: message.clone(),
            sent_at: Utc::now(),
        });

        Ok(ActionOutcome::new(format!("Sent {} to {}", channel, name)))
    }
}

/// Remind a patient about an upcoming appointment on whatever channel they have
pub struct SendReminderHandler;

#[async_trait]
impl ActionHandler for SendReminderHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::SendReminder
    }

    fn description(&self) -> &'static str {
        "Send an appointment reminder to the patient"
    }

    async fn execute(&self, action: &StepAction, ctx: &ActionContext) -> Result<ActionOutcome, ActionError> {
        let StepAction::SendReminder { appointment_id } = action else {
            return Err(ActionError::mismatch(self.kind(), action));
        };
        debug!(%appointment_id, "SendReminderHandler::execute: called");

        let mut state = ctx.clinic.lock().await;
        let appointment = state
            .snapshot
            .appointment(appointment_id)
            .ok_or_else(|| ActionError::not_found("appointment", appointment_id.as_str()))?;
        if !appointment.status.is_active() {
            return Err(ActionError::InvalidArgument(format!(
                "{} is {}; no reminder sent",
                appointment_id, appointment.status
            )));
        }
        let patient = state
            .snapshot
            .patient(&appointment.patient_id)
            .ok_or_else(|| ActionError::not_found("patient", appointment.patient_id.as_str()))?;

        let channel = if patient.phone.is_some() {
            NotifyChannel::Sms
        } else if patient.email.is_some() {
            NotifyChannel::Email
        } else {
            return Err(ActionError::NoContact {
                patient_id: patient.id.clone(),
                channel: NotifyChannel::Sms,
            });
        };

        let notification = Notification {
            patient_id: patient.id.clone(),
            channel,
            kind: NotificationKind::Reminder,
            message: format!(
                "Reminder: your appointment with {} is on {}",
                appointment.provider,
                format_slot(appointment.start)
            ),
            sent_at: Utc::now(),
        };
        let name = patient.name.clone();
        state.outbox.push(notification);

        Ok(ActionOutcome::new(format!("Reminded {} by {}", name, channel)))
    }
}
