//! Refresh session store: create, validate, rotate and revoke
//! long-lived refresh sessions.
//!
//! Each session is backed by a durable row and a fast-cache shadow
//! keyed `refreshsession:{session_id}`. The shadow self-expires with
//! the session; cache misses fall back to the store and repopulate.
//! A raw refresh token is `{session_id}.{secret}`; only the SHA-256
//! hash of the whole raw token is ever stored.

use base64::Engine;
use chrono::{DateTime, Utc};
use rand::RngCore;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::models::{CachedSession, RefreshSession};
use crate::services::cache::Cache;
use crate::services::error::ServiceError;
use crate::services::jwt::TokenSigner;
use crate::services::store::AuthStore;

fn session_key(session_id: Uuid) -> String {
    format!("refreshsession:{}", session_id)
}

/// Result of creating a session. `refresh_token` is the only copy of
/// the raw token that will ever exist.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session_id: Uuid,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Successfully validated session.
#[derive(Debug, Clone, Copy)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Result of a rotation: fresh access token plus the successor session.
#[derive(Debug, Clone)]
pub struct RotatedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn AuthStore>,
    cache: Arc<dyn Cache>,
    signer: TokenSigner,
    refresh_ttl_seconds: i64,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn AuthStore>,
        cache: Arc<dyn Cache>,
        signer: TokenSigner,
        refresh_ttl_seconds: i64,
    ) -> Self {
        Self {
            store,
            cache,
            signer,
            refresh_ttl_seconds,
        }
    }

    /// Create a new refresh session for a user.
    ///
    /// The session row is durable; the cache mirror is best-effort and
    /// repopulated lazily if the write is lost.
    pub async fn create(&self, user_id: Uuid) -> Result<IssuedSession, ServiceError> {
        let session_id = Uuid::new_v4();
        let mut secret_bytes = [0u8; 48];
        rand::thread_rng().fill_bytes(&mut secret_bytes);
        let secret = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(secret_bytes);
        let raw_token = format!("{}.{}", session_id, secret);

        let session = RefreshSession::new(
            session_id,
            user_id,
            RefreshSession::hash_token(&raw_token),
            self.refresh_ttl_seconds,
        );

        self.store
            .insert_refresh_session(&session)
            .await
            .map_err(ServiceError::Database)?;

        let mirror = CachedSession::from(&session);
        let payload = serde_json::to_string(&mirror)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!(e)))?;
        if let Err(e) = self
            .cache
            .set_ex(&session_key(session_id), &payload, self.refresh_ttl_seconds)
            .await
        {
            tracing::warn!(session_id = %session_id, error = %e, "Failed to mirror session into cache");
        }

        Ok(IssuedSession {
            session_id,
            refresh_token: raw_token,
            expires_at: session.expires_at,
        })
    }

    /// Validate a raw refresh token: cache first, store fallback with
    /// lazy repopulation, constant-time hash comparison, expiry check.
    pub async fn validate(&self, raw_token: &str) -> Result<SessionInfo, ServiceError> {
        let session_id = match parse_session_id(raw_token) {
            Some(id) => id,
            None => return Err(ServiceError::InvalidRefreshToken),
        };
        let key = session_key(session_id);

        let cached = match self.cache.get(&key).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Cache lookup failed, falling back to store");
                None
            }
        };

        let mut record: Option<CachedSession> =
            cached.and_then(|v| serde_json::from_str(&v).ok());

        if record.is_none() {
            let session = self
                .store
                .find_refresh_session(session_id)
                .await
                .map_err(ServiceError::Database)?
                .ok_or(ServiceError::InvalidRefreshToken)?;

            if session.is_revoked() {
                return Err(ServiceError::InvalidRefreshToken);
            }

            let mirror = CachedSession::from(&session);
            let remaining = (session.expires_at - Utc::now()).num_seconds();
            if remaining > 0 {
                match serde_json::to_string(&mirror) {
                    Ok(payload) => {
                        if let Err(e) = self.cache.set_ex(&key, &payload, remaining).await {
                            tracing::warn!(session_id = %session_id, error = %e, "Failed to repopulate session cache");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(session_id = %session_id, error = %e, "Failed to serialize session mirror");
                    }
                }
            }
            record = Some(mirror);
        }

        let record = record.ok_or(ServiceError::InvalidRefreshToken)?;

        let presented = RefreshSession::hash_token(raw_token);
        let hashes_match: bool = presented
            .as_bytes()
            .ct_eq(record.token_hash.as_bytes())
            .into();
        if !hashes_match {
            tracing::warn!(session_id = %session_id, "Refresh token hash mismatch");
            return Err(ServiceError::InvalidRefreshToken);
        }

        if record.expires_at <= Utc::now() {
            return Err(ServiceError::InvalidRefreshToken);
        }

        Ok(SessionInfo {
            session_id,
            user_id: record.user_id,
            expires_at: record.expires_at,
        })
    }

    /// Rotate a refresh token: validate the old one, create a successor
    /// for the same user, terminate the old session with a pointer to
    /// the successor, evict its cache entry, and issue a fresh access
    /// token stamped with the supplied permission version.
    ///
    /// A raw token can be rotated at most once; any reuse of an
    /// already-rotated or revoked token fails.
    pub async fn rotate(
        &self,
        old_raw_token: &str,
        permission_version: Option<i64>,
    ) -> Result<RotatedTokens, ServiceError> {
        let info = self.validate(old_raw_token).await?;

        let successor = self.create(info.user_id).await?;

        self.store
            .mark_session_replaced(info.session_id, successor.session_id, Utc::now())
            .await
            .map_err(ServiceError::Database)?;

        // Eviction must not be skipped: a surviving cache entry would
        // keep the rotated token valid until its TTL elapses.
        self.cache
            .del(&session_key(info.session_id))
            .await
            .map_err(ServiceError::Cache)?;

        let access_token = self.signer.issue(info.user_id, permission_version)?;

        tracing::info!(user_id = %info.user_id, old_session = %info.session_id,
            new_session = %successor.session_id, "Refresh session rotated");

        Ok(RotatedTokens {
            access_token,
            refresh_token: successor.refresh_token,
            expires_at: successor.expires_at,
        })
    }

    /// Idempotently revoke a session and evict its cache entry.
    pub async fn revoke(&self, session_id: Uuid) -> Result<(), ServiceError> {
        self.store
            .revoke_session(session_id, Utc::now())
            .await
            .map_err(ServiceError::Database)?;
        self.cache
            .del(&session_key(session_id))
            .await
            .map_err(ServiceError::Cache)?;
        Ok(())
    }

    /// Revoke by raw token. An unparsable token is a no-op, mirroring
    /// the idempotent contract of `revoke`.
    pub async fn revoke_by_token(&self, raw_token: &str) -> Result<(), ServiceError> {
        match parse_session_id(raw_token) {
            Some(session_id) => self.revoke(session_id).await,
            None => Ok(()),
        }
    }

    /// Refresh session lifetime in seconds.
    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }
}

fn parse_session_id(raw_token: &str) -> Option<Uuid> {
    let (prefix, _secret) = raw_token.split_once('.')?;
    prefix.parse::<Uuid>().ok()
}
