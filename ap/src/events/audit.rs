//! AuditLog - append-only record of what plans did to the clinic

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::AuditEvent;

/// Shared append-only audit log
///
/// Entries are only ever appended; readers get copies.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    entries: Arc<RwLock<Vec<AuditEvent>>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, event: AuditEvent) {
        debug!(kind = %event.kind(), plan_id = %event.plan_id(), "AuditLog::append: called");
        self.entries.write().await.push(event);
    }

    /// Every entry in append order
    pub async fn entries(&self) -> Vec<AuditEvent> {
        self.entries.read().await.clone()
    }

    /// Entries for one plan in append order
    pub async fn for_plan(&self, plan_id: &str) -> Vec<AuditEvent> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.plan_id() == plan_id)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
