//! Inbound authentication facade and authorization gate.
//!
//! Ties the credential verifier, token signer, session store, and
//! permission cache together into the operations a transport layer
//! calls per request.

use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::models::AuditAction;
use crate::services::audit::AuditRecorder;
use crate::services::credentials::CredentialVerifier;
use crate::services::error::ServiceError;
use crate::services::jwt::{TokenSigner, VerifiedAccess};
use crate::services::permissions::PermissionService;
use crate::services::sessions::SessionService;

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone)]
pub struct AuthService {
    credentials: CredentialVerifier,
    sessions: SessionService,
    permissions: PermissionService,
    signer: TokenSigner,
    audit: AuditRecorder,
}

impl AuthService {
    pub fn new(
        credentials: CredentialVerifier,
        sessions: SessionService,
        permissions: PermissionService,
        signer: TokenSigner,
        audit: AuditRecorder,
    ) -> Self {
        Self {
            credentials,
            sessions,
            permissions,
            signer,
            audit,
        }
    }

    /// Exchange a username/password pair for a token pair.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenResponse, ServiceError> {
        let user = self.credentials.verify(username, password).await?;
        let access_token = self.signer.issue(user.user_id, None)?;
        let session = self.sessions.create(user.user_id).await?;

        Ok(TokenResponse {
            access_token,
            refresh_token: session.refresh_token,
            token_type: "Bearer".to_string(),
            expires_at: session.expires_at,
        })
    }

    /// Rotate a refresh token, returning a fresh token pair. The
    /// presented token is dead after this call succeeds.
    pub async fn refresh(&self, raw_token: &str) -> Result<TokenResponse, ServiceError> {
        let rotated = self.sessions.rotate(raw_token, None).await?;
        Ok(TokenResponse {
            access_token: rotated.access_token,
            refresh_token: rotated.refresh_token,
            token_type: "Bearer".to_string(),
            expires_at: rotated.expires_at,
        })
    }

    /// Revoke the session behind a refresh token. Unknown or malformed
    /// tokens are treated as already revoked.
    pub async fn revoke(&self, raw_token: &str, caller: Option<Uuid>) -> Result<(), ServiceError> {
        self.sessions.revoke_by_token(raw_token).await?;
        self.audit
            .record(
                caller,
                AuditAction::RefreshRevoke,
                "refresh_session",
                None,
                Some(json!({ "token": "revoked" })),
            )
            .await;
        Ok(())
    }

    /// Verify a `Bearer <token>` header value.
    pub fn authenticate(&self, bearer_header: &str) -> Result<VerifiedAccess, ServiceError> {
        let token = bearer_header
            .strip_prefix("Bearer ")
            .ok_or(ServiceError::Unauthenticated)?;
        self.signer.verify(token.trim())
    }

    /// Check that a user currently holds a permission.
    pub async fn authorize(&self, user_id: Uuid, required: &str) -> Result<(), ServiceError> {
        let granted = self.permissions.effective_permissions(user_id).await?;
        if granted.contains(required) {
            Ok(())
        } else {
            Err(ServiceError::Forbidden)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cache::MockCache;
    use crate::services::store::MockStore;
    use crate::services::users::UserService;
    use std::sync::Arc;

    fn build(store: Arc<MockStore>, cache: Arc<MockCache>) -> (AuthService, UserService) {
        let signer = TokenSigner::new("test-secret", 900);
        let audit = AuditRecorder::new(store.clone());
        let permissions = PermissionService::new(store.clone(), cache.clone(), 3600);
        let sessions = SessionService::new(store.clone(), cache.clone(), signer.clone(), 3600);
        let credentials = CredentialVerifier::new(store.clone(), audit.clone());
        let users = UserService::new(store.clone(), permissions.clone(), audit.clone(), 4);
        (
            AuthService::new(credentials, sessions, permissions, signer, audit),
            users,
        )
    }

    #[tokio::test]
    async fn test_login_refresh_reuse_flow() {
        let store = Arc::new(MockStore::new());
        let cache = Arc::new(MockCache::new());
        let (auth, users) = build(store.clone(), cache.clone());

        users
            .create_user(None, "alice", "Abcdef1!", &[])
            .await
            .unwrap();

        // Wrong password never leaks whether the user exists
        assert!(matches!(
            auth.login("alice", "Abcdef2!").await,
            Err(ServiceError::Unauthenticated)
        ));

        let tokens = auth.login("alice", "Abcdef1!").await.unwrap();
        assert_eq!(tokens.token_type, "Bearer");

        let verified = auth
            .authenticate(&format!("Bearer {}", tokens.access_token))
            .unwrap();
        assert_eq!(verified.permission_version, 0);

        let rotated = auth.refresh(&tokens.refresh_token).await.unwrap();
        assert_ne!(rotated.refresh_token, tokens.refresh_token);

        // The original refresh token died during rotation
        assert!(matches!(
            auth.refresh(&tokens.refresh_token).await,
            Err(ServiceError::InvalidRefreshToken)
        ));

        // The rotated one is still live
        auth.refresh(&rotated.refresh_token).await.unwrap();
    }

    #[tokio::test]
    async fn test_authenticate_rejects_malformed_headers() {
        let store = Arc::new(MockStore::new());
        let cache = Arc::new(MockCache::new());
        let (auth, _) = build(store, cache);

        for header in ["", "Bearer", "Basic abc", "bearer lowercase-scheme"] {
            assert!(matches!(
                auth.authenticate(header),
                Err(ServiceError::Unauthenticated)
            ));
        }
    }

    #[tokio::test]
    async fn test_authorize_reflects_role_grants() {
        let store = Arc::new(MockStore::new());
        let cache = Arc::new(MockCache::new());
        let (auth, users) = build(store.clone(), cache.clone());
        let seeder = PermissionService::new(store.clone(), cache.clone(), 3600);
        seeder.seed_builtins().await.unwrap();

        let created = users
            .create_user(None, "viewer", "Abcdef1!", &["VIEWER".to_string()])
            .await
            .unwrap();

        auth.authorize(created.user_id, "emissions.read")
            .await
            .unwrap();
        assert!(matches!(
            auth.authorize(created.user_id, "emissions.delete").await,
            Err(ServiceError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent_and_audited() {
        let store = Arc::new(MockStore::new());
        let cache = Arc::new(MockCache::new());
        let (auth, users) = build(store.clone(), cache.clone());

        let created = users
            .create_user(None, "alice", "Abcdef1!", &[])
            .await
            .unwrap();
        let tokens = auth.login("alice", "Abcdef1!").await.unwrap();

        auth.revoke(&tokens.refresh_token, Some(created.user_id))
            .await
            .unwrap();
        assert!(matches!(
            auth.refresh(&tokens.refresh_token).await,
            Err(ServiceError::InvalidRefreshToken)
        ));

        // A second revoke of the same token is a no-op
        auth.revoke(&tokens.refresh_token, Some(created.user_id))
            .await
            .unwrap();

        let events = store.audit_events();
        assert_eq!(
            events
                .iter()
                .filter(|e| e.action == "auth.refresh_revoke")
                .count(),
            2
        );
    }
}
