//! Compensating actions
//!
//! Every step carries the action that reverses it. The compensation is
//! derived from the forward action plus the snapshot it was planned against.

use tracing::debug;

use super::error::PlanningError;
use crate::domain::{ClinicSnapshot, InvoiceStatus, StepAction};

/// The action that reverses `action`
pub fn compensate(action: &StepAction, snapshot: &ClinicSnapshot) -> Result<StepAction, PlanningError> {
    debug!(kind = %action.kind(), "compensate: called");
    let undo = match action {
        StepAction::MoveAppointment {
            appointment_id,
            from,
            to,
        } => StepAction::move_back(appointment_id, *from, *to),
        StepAction::SetAppointmentStatus {
            appointment_id,
            from,
            to,
        } => StepAction::SetAppointmentStatus {
            appointment_id: appointment_id.clone(),
            from: *to,
            to: *from,
        },
        StepAction::NotifyPatient {
            patient_id, channel, ..
        } => {
            let greeting = snapshot
                .patient(patient_id)
                .map(|p| format!("Hi {}, please", p.first_name()))
                .unwrap_or_else(|| "Please".to_string());
            StepAction::NotifyPatient {
                patient_id: patient_id.clone(),
                channel: *channel,
                message: format!("{} disregard our previous message.", greeting),
            }
        }
        StepAction::SendReminder { appointment_id } => {
            StepAction::noop(format!("Reminder for {} cannot be unsent", appointment_id))
        }
        StepAction::VerifyInsurance { patient_id } => {
            StepAction::noop(format!("Insurance check for {} has nothing to undo", patient_id))
        }
        StepAction::CreateInvoice { invoice_id, .. } => StepAction::SetInvoiceStatus {
            invoice_id: invoice_id.clone(),
            from: InvoiceStatus::Open,
            to: InvoiceStatus::Void,
        },
        StepAction::SetInvoiceStatus { invoice_id, from, to } => StepAction::SetInvoiceStatus {
            invoice_id: invoice_id.clone(),
            from: *to,
            to: *from,
        },
        StepAction::BlockTime { block_id, .. } => StepAction::UnblockTime {
            block_id: block_id.clone(),
        },
        StepAction::UnblockTime { block_id } => {
            let block = snapshot
                .blocks
                .iter()
                .find(|b| &b.id == block_id)
                .ok_or_else(|| PlanningError::InvalidProposal(format!("unknown block {}", block_id)))?;
            StepAction::BlockTime {
                block_id: block.id.clone(),
                start: block.start,
                end: block.end,
                reason: block.reason.clone(),
            }
        }
        StepAction::Noop { .. } => StepAction::noop("nothing to undo"),
    };
    Ok(undo)
}

/// Check an externally proposed action against the snapshot
///
/// Entity references must exist. `from` fields are overwritten with the
/// current snapshot values so the undo restores what was really there.
pub fn normalize(action: StepAction, snapshot: &ClinicSnapshot) -> Result<StepAction, PlanningError> {
    debug!(kind = %action.kind(), "normalize: called");
    let unknown = |entity: &str, id: &str| PlanningError::InvalidProposal(format!("unknown {} {}", entity, id));

    let action = match action {
        StepAction::MoveAppointment { appointment_id, to, .. } => {
            let appointment = snapshot
                .appointment(&appointment_id)
                .ok_or_else(|| unknown("appointment", &appointment_id))?;
            StepAction::MoveAppointment {
                from: appointment.start,
                appointment_id,
                to,
            }
        }
        StepAction::SetAppointmentStatus { appointment_id, to, .. } => {
            let appointment = snapshot
                .appointment(&appointment_id)
                .ok_or_else(|| unknown("appointment", &appointment_id))?;
            StepAction::SetAppointmentStatus {
                from: appointment.status,
                appointment_id,
                to,
            }
        }
        StepAction::SetInvoiceStatus { invoice_id, to, .. } => {
            let invoice = snapshot
                .invoice(&invoice_id)
                .ok_or_else(|| unknown("invoice", &invoice_id))?;
            StepAction::SetInvoiceStatus {
                from: invoice.status,
                invoice_id,
                to,
            }
        }
        StepAction::SendReminder { ref appointment_id } => {
            if snapshot.appointment(appointment_id).is_none() {
                return Err(unknown("appointment", appointment_id));
            }
            action
        }
        StepAction::NotifyPatient { ref patient_id, .. }
        | StepAction::VerifyInsurance { ref patient_id }
        | StepAction::CreateInvoice { ref patient_id, .. } => {
            if snapshot.patient(patient_id).is_none() {
                return Err(unknown("patient", patient_id));
            }
            action
        }
        other => other,
    };
    Ok(action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AppointmentStatus, NotifyChannel, TimeBlock};
    use chrono::{Duration, TimeZone, Utc};

    fn snapshot() -> ClinicSnapshot {
        ClinicSnapshot::demo(Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap())
    }

    #[test]
    fn test_status_change_reverses() {
        let action = StepAction::SetAppointmentStatus {
            appointment_id: "apt-1001".into(),
            from: AppointmentStatus::Scheduled,
            to: AppointmentStatus::Cancelled,
        };
        let undo = compensate(&action, &snapshot()).unwrap();
        assert_eq!(
            undo,
            StepAction::SetAppointmentStatus {
                appointment_id: "apt-1001".into(),
                from: AppointmentStatus::Cancelled,
                to: AppointmentStatus::Scheduled,
            }
        );
    }

    #[test]
    fn test_created_invoice_is_voided() {
        let action = StepAction::CreateInvoice {
            invoice_id: "inv-9".into(),
            patient_id: "pat-sarah".into(),
            amount_cents: 100,
            description: "x".into(),
        };
        assert!(matches!(
            compensate(&action, &snapshot()).unwrap(),
            StepAction::SetInvoiceStatus {
                to: InvoiceStatus::Void,
                ..
            }
        ));
    }

    #[test]
    fn test_notify_retraction_greets_patient() {
        let action = StepAction::NotifyPatient {
            patient_id: "pat-sarah".into(),
            channel: NotifyChannel::Sms,
            message: "moved".into(),
        };
        match compensate(&action, &snapshot()).unwrap() {
            StepAction::NotifyPatient { message, .. } => {
                assert_eq!(message, "Hi Sarah, please disregard our previous message.")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unblock_needs_known_block() {
        let mut snap = snapshot();
        let action = StepAction::UnblockTime { block_id: "blk-1".into() };
        assert!(compensate(&action, &snap).is_err());

        let start = Utc.with_ymd_and_hms(2026, 10, 20, 12, 0, 0).unwrap();
        snap.blocks.push(TimeBlock {
            id: "blk-1".into(),
            start,
            end: start + Duration::hours(1),
            reason: "lunch".into(),
        });
        assert!(matches!(
            compensate(&action, &snap).unwrap(),
            StepAction::BlockTime { ref reason, .. } if reason == "lunch"
        ));
    }

    #[test]
    fn test_normalize_overwrites_from() {
        let snap = snapshot();
        let stale = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2026, 10, 22, 14, 30, 0).unwrap();
        let action = StepAction::MoveAppointment {
            appointment_id: "apt-1001".into(),
            from: stale,
            to,
        };
        match normalize(action, &snap).unwrap() {
            StepAction::MoveAppointment { from, .. } => {
                assert_eq!(from, snap.appointment("apt-1001").unwrap().start)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_normalize_rejects_unknown_entities() {
        let snap = snapshot();
        let err = normalize(
            StepAction::VerifyInsurance {
                patient_id: "pat-nobody".into(),
            },
            &snap,
        )
        .unwrap_err();
        assert!(err.to_string().contains("pat-nobody"));
    }
}
