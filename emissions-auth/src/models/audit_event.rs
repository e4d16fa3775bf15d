//! Audit event model - append-only action log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Audit actions recorded by the auth core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    LoginSuccess,
    LoginFailure,
    RefreshRevoke,
    UserCreate,
    RoleAssign,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::LoginSuccess => "auth.login_success",
            AuditAction::LoginFailure => "auth.login_failure",
            AuditAction::RefreshRevoke => "auth.refresh_revoke",
            AuditAction::UserCreate => "user.create",
            AuditAction::RoleAssign => "role.assign",
        }
    }
}

/// Audit event entity. Write-only from the core's perspective.
#[derive(Debug, Clone, FromRow)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub target_type: String,
    pub target_id: Option<Uuid>,
    pub diff: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    /// Create a new audit event.
    pub fn new(
        actor_id: Option<Uuid>,
        action: AuditAction,
        target_type: impl Into<String>,
        target_id: Option<Uuid>,
        diff: Option<serde_json::Value>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            actor_id,
            action: action.as_str().to_string(),
            target_type: target_type.into(),
            target_id,
            diff,
            created_at: Utc::now(),
        }
    }
}
