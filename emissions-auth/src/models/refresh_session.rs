//! Refresh session model - one issued refresh-token lineage.
//!
//! Only a SHA-256 hash of the raw token is ever persisted or cached;
//! the secret half of the token exists solely in the client's hands.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use uuid::Uuid;

/// Refresh session entity. Never physically deleted; terminal states
/// are recorded via `revoked_at` (and `replaced_by_session_id` when the
/// session was rotated) so the lineage stays auditable.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshSession {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub replaced_by_session_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl RefreshSession {
    /// Create a new active session.
    pub fn new(session_id: Uuid, user_id: Uuid, token_hash: String, ttl_seconds: i64) -> Self {
        Self {
            session_id,
            user_id,
            token_hash,
            expires_at: Utc::now() + Duration::seconds(ttl_seconds),
            revoked_at: None,
            replaced_by_session_id: None,
            created_at: Utc::now(),
        }
    }

    /// Hash a raw token using SHA-256 (hex-encoded).
    pub fn hash_token(raw: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(raw.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Check if the session is expired.
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// Check if the session was revoked or rotated away.
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Check if the session is active (not expired, not revoked).
    /// Terminal states are never left once entered.
    pub fn is_active(&self) -> bool {
        !self.is_revoked() && !self.is_expired()
    }
}

/// Compact session record mirrored into the fast cache for low-latency
/// validation. The cache entry carries the same TTL as the session so
/// it self-expires in step with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedSession {
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl From<&RefreshSession> for CachedSession {
    fn from(s: &RefreshSession) -> Self {
        Self {
            user_id: s.user_id,
            token_hash: s.token_hash.clone(),
            expires_at: s.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_active() {
        let session = RefreshSession::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            RefreshSession::hash_token("raw"),
            3600,
        );

        assert!(session.is_active());
        assert!(!session.is_expired());
        assert!(!session.is_revoked());
    }

    #[test]
    fn test_expired_session_is_terminal() {
        let mut session =
            RefreshSession::new(Uuid::new_v4(), Uuid::new_v4(), "hash".to_string(), 3600);
        session.expires_at = Utc::now() - Duration::seconds(1);

        assert!(session.is_expired());
        assert!(!session.is_active());
    }

    #[test]
    fn test_revoked_session_is_terminal() {
        let mut session =
            RefreshSession::new(Uuid::new_v4(), Uuid::new_v4(), "hash".to_string(), 3600);
        session.revoked_at = Some(Utc::now());

        assert!(session.is_revoked());
        assert!(!session.is_active());
    }

    #[test]
    fn test_hash_token_is_stable() {
        let a = RefreshSession::hash_token("some-raw-token");
        let b = RefreshSession::hash_token("some-raw-token");
        let c = RefreshSession::hash_token("another-raw-token");

        assert_eq!(a, b);
        assert_ne!(a, c);
        // sha256 hex digest
        assert_eq!(a.len(), 64);
    }
}
