//! Appointment handlers - move and status changes

use async_trait::async_trait;
use chrono::Duration;
use tracing::debug;

use crate::actions::{ActionContext, ActionError, ActionHandler, ActionOutcome};
use crate::domain::{ActionKind, StepAction, format_slot};

/// Move an appointment to a new start time, keeping its duration
pub struct MoveAppointmentHandler;

#[async_trait]
impl ActionHandler for MoveAppointmentHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::MoveAppointment
    }

    fn description(&self) -> &'static str {
        "Move an appointment to a new slot with the same provider"
    }

    async fn execute(&self, action: &StepAction, ctx: &ActionContext) -> Result<ActionOutcome, ActionError> {
        let StepAction::MoveAppointment {
            appointment_id,
            from,
            to,
        } = action
        else {
            return Err(ActionError::mismatch(self.kind(), action));
        };
        debug!(%appointment_id, %from, %to, "MoveAppointmentHandler::execute: called");

        let mut state = ctx.clinic.lock().await;
        let snapshot = &mut state.snapshot;

        let current = snapshot
            .appointment(appointment_id)
            .ok_or_else(|| ActionError::not_found("appointment", appointment_id.as_str()))?;
        if !current.status.is_active() {
            return Err(ActionError::InvalidArgument(format!(
                "{} is {} and cannot be moved",
                appointment_id, current.status
            )));
        }
        if current.start != *from {
            debug!("MoveAppointmentHandler::execute: start time changed underneath");
            return Err(ActionError::stale(
                appointment_id.as_str(),
                format_slot(*from),
                format_slot(current.start),
            ));
        }

        let provider = current.provider.clone();
        let new_end = to
            .checked_add_signed(Duration::minutes(i64::from(current.duration_minutes)))
            .ok_or_else(|| ActionError::InvalidArgument(format!("{} cannot start at {}", appointment_id, to)))?;

        if let Some(clash) = snapshot
            .appointments
            .iter()
            .filter(|a| a.id != *appointment_id && a.provider == provider && a.status.is_active())
            .find(|a| a.overlaps(*to, new_end))
        {
            debug!(clash = %clash.id, "MoveAppointmentHandler::execute: provider conflict");
            return Err(ActionError::Conflict(format!(
                "{} already has {} at {}",
                provider,
                clash.id,
                format_slot(clash.start)
            )));
        }
        if let Some(block) = snapshot.blocks.iter().find(|b| b.start < new_end && *to < b.end) {
            debug!(block = %block.id, "MoveAppointmentHandler::execute: blocked time");
            return Err(ActionError::Conflict(format!(
                "{} is blocked ({})",
                format_slot(*to),
                block.reason
            )));
        }

        let appointment = snapshot
            .appointments
            .iter_mut()
            .find(|a| a.id == *appointment_id)
            .ok_or_else(|| ActionError::not_found("appointment", appointment_id.as_str()))?;
        appointment.start = *to;

        Ok(ActionOutcome::new(format!(
            "Moved {} to {}",
            appointment_id,
            format_slot(*to)
        )))
    }
}

/// Change an appointment's status (confirm, cancel, no-show, complete)
pub struct SetAppointmentStatusHandler;

#[async_trait]
impl ActionHandler for SetAppointmentStatusHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::SetAppointmentStatus
    }

    fn description(&self) -> &'static str {
        "Change the status of an appointment"
    }

    async fn execute(&self, action: &StepAction, ctx: &ActionContext) -> Result<ActionOutcome, ActionError> {
        let StepAction::SetAppointmentStatus {
            appointment_id,
            from,
            to,
        } = action
        else {
            return Err(ActionError::mismatch(self.kind(), action));
        };
        debug!(%appointment_id, %from, %to, "SetAppointmentStatusHandler::execute: called");

        let mut state = ctx.clinic.lock().await;
        let appointment = state
            .snapshot
            .appointments
            .iter_mut()
            .find(|a| a.id == *appointment_id)
            .ok_or_else(|| ActionError::not_found("appointment", appointment_id.as_str()))?;

        if appointment.status != *from {
            return Err(ActionError::stale(appointment_id.as_str(), from, appointment.status));
        }
        appointment.status = *to;

        Ok(ActionOutcome::new(format!("Marked {} {}", appointment_id, to)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::testing::{demo_ctx, now};
    use crate::domain::{AppointmentStatus, TimeBlock};
    use chrono::TimeZone;
    use chrono::Utc;

    fn tomorrow(hour: u32, minute: u32) -> chrono::DateTime<Utc> {
        let date = (now() + Duration::days(1)).date_naive();
        Utc.from_utc_datetime(&date.and_hms_opt(hour, minute, 0).unwrap())
    }

    #[tokio::test]
    async fn test_move_appointment() {
        let ctx = demo_ctx();
        let action = StepAction::MoveAppointment {
            appointment_id: "apt-1001".into(),
            from: tomorrow(9, 0),
            to: tomorrow(14, 30),
        };

        let outcome = MoveAppointmentHandler.execute(&action, &ctx).await.unwrap();
        assert!(outcome.summary.contains("apt-1001"));

        let snapshot = ctx.clinic.snapshot().await;
        assert_eq!(snapshot.appointment("apt-1001").unwrap().start, tomorrow(14, 30));
    }

    #[tokio::test]
    async fn test_move_to_end_of_time_is_invalid() {
        let ctx = demo_ctx();
        let action = StepAction::MoveAppointment {
            appointment_id: "apt-1001".into(),
            from: tomorrow(9, 0),
            to: chrono::DateTime::<Utc>::MAX_UTC,
        };
        let err = MoveAppointmentHandler.execute(&action, &ctx).await.unwrap_err();
        assert!(matches!(err, ActionError::InvalidArgument(_)));

        let snapshot = ctx.clinic.snapshot().await;
        assert_eq!(snapshot.appointment("apt-1001").unwrap().start, tomorrow(9, 0));
    }

    #[tokio::test]
    async fn test_move_detects_stale_start() {
        let ctx = demo_ctx();
        let action = StepAction::MoveAppointment {
            appointment_id: "apt-1001".into(),
            from: tomorrow(8, 0),
            to: tomorrow(14, 30),
        };
        let err = MoveAppointmentHandler.execute(&action, &ctx).await.unwrap_err();
        assert!(matches!(err, ActionError::StaleState { .. }));
    }

    #[tokio::test]
    async fn test_move_detects_provider_conflict() {
        let ctx = demo_ctx();
        // apt-1002 is Dr. Patel at 10:00 for 45 minutes
        let action = StepAction::MoveAppointment {
            appointment_id: "apt-1001".into(),
            from: tomorrow(9, 0),
            to: tomorrow(10, 15),
        };
        let err = MoveAppointmentHandler.execute(&action, &ctx).await.unwrap_err();
        assert!(matches!(err, ActionError::Conflict(_)));

        let snapshot = ctx.clinic.snapshot().await;
        assert_eq!(snapshot.appointment("apt-1001").unwrap().start, tomorrow(9, 0));
    }

    #[tokio::test]
    async fn test_move_into_block_conflicts() {
        let ctx = demo_ctx();
        ctx.clinic.lock().await.snapshot.blocks.push(TimeBlock {
            id: "blk-1".into(),
            start: tomorrow(12, 0),
            end: tomorrow(13, 0),
            reason: "Lunch".into(),
        });
        let action = StepAction::MoveAppointment {
            appointment_id: "apt-1001".into(),
            from: tomorrow(9, 0),
            to: tomorrow(12, 45),
        };
        let err = MoveAppointmentHandler.execute(&action, &ctx).await.unwrap_err();
        assert!(err.to_string().contains("Lunch"));
    }

    #[tokio::test]
    async fn test_move_missing_appointment() {
        let ctx = demo_ctx();
        let action = StepAction::MoveAppointment {
            appointment_id: "apt-nope".into(),
            from: tomorrow(9, 0),
            to: tomorrow(10, 0),
        };
        let err = MoveAppointmentHandler.execute(&action, &ctx).await.unwrap_err();
        assert_eq!(err, ActionError::not_found("appointment", "apt-nope"));
    }

    #[tokio::test]
    async fn test_set_status_and_stale() {
        let ctx = demo_ctx();
        let cancel = StepAction::SetAppointmentStatus {
            appointment_id: "apt-1003".into(),
            from: AppointmentStatus::Scheduled,
            to: AppointmentStatus::Cancelled,
        };
        SetAppointmentStatusHandler.execute(&cancel, &ctx).await.unwrap();
        assert_eq!(
            ctx.clinic.snapshot().await.appointment("apt-1003").unwrap().status,
            AppointmentStatus::Cancelled
        );

        let err = SetAppointmentStatusHandler.execute(&cancel, &ctx).await.unwrap_err();
        assert!(matches!(err, ActionError::StaleState { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_appointment_cannot_move() {
        let ctx = demo_ctx();
        ctx.clinic.lock().await.snapshot.appointments[0].status = AppointmentStatus::Cancelled;
        let action = StepAction::MoveAppointment {
            appointment_id: "apt-1001".into(),
            from: tomorrow(9, 0),
            to: tomorrow(15, 0),
        };
        let err = MoveAppointmentHandler.execute(&action, &ctx).await.unwrap_err();
        assert!(matches!(err, ActionError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_handler_rejects_other_kinds() {
        let ctx = demo_ctx();
        let err = MoveAppointmentHandler
            .execute(&StepAction::noop("x"), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Mismatch { .. }));
    }
}
