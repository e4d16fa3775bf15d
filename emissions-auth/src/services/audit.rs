//! Audit sink: append-only action records.
//!
//! Audit writes are a side effect of primary operations and must never
//! fail them; errors are logged and swallowed.

use std::sync::Arc;
use uuid::Uuid;

use crate::models::{AuditAction, AuditEvent};
use crate::services::store::AuthStore;

#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn AuthStore>,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn AuthStore>) -> Self {
        Self { store }
    }

    /// Record an audit event, waiting for the write. Failures are
    /// logged, never propagated.
    pub async fn record(
        &self,
        actor_id: Option<Uuid>,
        action: AuditAction,
        target_type: &str,
        target_id: Option<Uuid>,
        diff: Option<serde_json::Value>,
    ) {
        let event = AuditEvent::new(actor_id, action, target_type, target_id, diff);
        if let Err(e) = self.store.insert_audit_event(&event).await {
            tracing::error!(
                error = %e,
                action = %event.action,
                "Failed to write audit event"
            );
        }
    }

    /// Record an audit event without waiting (fire and forget).
    pub fn record_async(
        &self,
        actor_id: Option<Uuid>,
        action: AuditAction,
        target_type: &str,
        target_id: Option<Uuid>,
        diff: Option<serde_json::Value>,
    ) {
        let store = self.store.clone();
        let event = AuditEvent::new(actor_id, action, target_type, target_id, diff);
        tokio::spawn(async move {
            if let Err(e) = store.insert_audit_event(&event).await {
                tracing::error!(
                    error = %e,
                    action = %event.action,
                    "Failed to write audit event"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::MockStore;

    #[tokio::test]
    async fn test_record_persists_event() {
        let store = Arc::new(MockStore::new());
        let audit = AuditRecorder::new(store.clone());
        let actor = Uuid::new_v4();

        audit
            .record(
                Some(actor),
                AuditAction::LoginSuccess,
                "user",
                Some(actor),
                None,
            )
            .await;

        let events = store.audit_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, "auth.login_success");
        assert_eq!(events[0].actor_id, Some(actor));
    }
}
