//! ActionContext - the live clinic state that step actions mutate

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::domain::{ClinicSnapshot, NotifyChannel};

/// Why a notification went out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Message,
    Reminder,
}

/// A message delivered to a patient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub patient_id: String,
    pub channel: NotifyChannel,
    pub kind: NotificationKind,
    pub message: String,
    pub sent_at: DateTime<Utc>,
}

/// Mutable clinic data plus the outbox of sent notifications
#[derive(Debug, Clone, Default)]
pub struct ClinicState {
    pub snapshot: ClinicSnapshot,
    pub outbox: Vec<Notification>,
}

/// Shared handle to the in-memory clinic
///
/// Only action handlers write through this handle; planners and the
/// conversation layer read copies via [`Clinic::snapshot`].
#[derive(Debug, Clone, Default)]
pub struct Clinic {
    inner: Arc<Mutex<ClinicState>>,
}

impl Clinic {
    pub fn new(snapshot: ClinicSnapshot) -> Self {
        debug!(
            patients = snapshot.patients.len(),
            appointments = snapshot.appointments.len(),
            "Clinic::new: called"
        );
        Self {
            inner: Arc::new(Mutex::new(ClinicState {
                snapshot,
                outbox: Vec::new(),
            })),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, ClinicState> {
        self.inner.lock().await
    }

    /// Copy of the current clinic data
    pub async fn snapshot(&self) -> ClinicSnapshot {
        self.inner.lock().await.snapshot.clone()
    }

    /// Copy of every notification sent so far
    pub async fn outbox(&self) -> Vec<Notification> {
        self.inner.lock().await.outbox.clone()
    }
}

/// Context passed to every action handler
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub clinic: Clinic,
    /// Plan on whose behalf the action runs (for logging)
    pub plan_id: Option<String>,
}

impl ActionContext {
    pub fn new(clinic: Clinic) -> Self {
        Self { clinic, plan_id: None }
    }

    /// Clone bound to a plan
    pub fn for_plan(&self, plan_id: impl Into<String>) -> Self {
        Self {
            clinic: self.clinic.clone(),
            plan_id: Some(plan_id.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Patient;

    #[tokio::test]
    async fn test_clinic_snapshot_is_a_copy() {
        let clinic = Clinic::new(ClinicSnapshot {
            patients: vec![Patient::new("p1", "Ada Lovelace")],
            ..Default::default()
        });
        let mut copy = clinic.snapshot().await;
        copy.patients.clear();
        assert_eq!(clinic.snapshot().await.patients.len(), 1);
    }

    #[tokio::test]
    async fn test_for_plan_shares_clinic() {
        let ctx = ActionContext::new(Clinic::default());
        let bound = ctx.for_plan("plan-1");
        bound.clinic.lock().await.snapshot.patients.push(Patient::new("p1", "Ada"));
        assert_eq!(ctx.clinic.snapshot().await.patients.len(), 1);
        assert_eq!(bound.plan_id.as_deref(), Some("plan-1"));
    }
}
