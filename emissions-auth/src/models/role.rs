//! Role model - named permission bundles.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Role entity. `is_builtin` marks roles seeded at bootstrap that are
/// not intended for deletion.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Role {
    pub role_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_builtin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    /// Create a new role.
    pub fn new(name: String, description: Option<String>, is_builtin: bool) -> Self {
        let now = Utc::now();
        Self {
            role_id: Uuid::new_v4(),
            name,
            description,
            is_builtin,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Role-permission mapping.
#[derive(Debug, Clone, FromRow)]
pub struct RolePermission {
    pub role_id: Uuid,
    pub permission_id: Uuid,
}

/// Role with its permission names, for listing.
#[derive(Debug, Clone, Serialize)]
pub struct RoleWithPermissions {
    #[serde(flatten)]
    pub role: Role,
    pub permissions: Vec<String>,
}
