//! Permission model - atomic capability strings.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Permission entity. Immutable once created; unique on name.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Permission {
    pub permission_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Permission {
    /// Create a new permission.
    pub fn new(name: String, description: Option<String>) -> Self {
        Self {
            permission_id: Uuid::new_v4(),
            name,
            description,
            created_at: Utc::now(),
        }
    }
}
