//! Credential verifier: username/password checks with audit trail.
//!
//! Unknown username and wrong password are indistinguishable to the
//! caller; only the audit log records which one happened.

use serde_json::json;
use std::sync::Arc;

use crate::models::{AuditAction, User};
use crate::services::audit::AuditRecorder;
use crate::services::error::ServiceError;
use crate::services::store::AuthStore;
use crate::utils::{verify_password, Password, PasswordHashString};

#[derive(Clone)]
pub struct CredentialVerifier {
    store: Arc<dyn AuthStore>,
    audit: AuditRecorder,
}

impl CredentialVerifier {
    pub fn new(store: Arc<dyn AuthStore>, audit: AuditRecorder) -> Self {
        Self { store, audit }
    }

    /// Verify a username/password pair. Returns the user on success;
    /// every failure mode is `Unauthenticated`.
    pub async fn verify(&self, username: &str, password: &str) -> Result<User, ServiceError> {
        let user = match self
            .store
            .find_user_by_username(username)
            .await
            .map_err(ServiceError::Database)?
        {
            Some(user) => user,
            None => {
                self.audit
                    .record(
                        None,
                        AuditAction::LoginFailure,
                        "user",
                        None,
                        Some(json!({ "username": username })),
                    )
                    .await;
                return Err(ServiceError::Unauthenticated);
            }
        };

        let verified = verify_password(
            &Password::new(password.to_string()),
            &PasswordHashString::new(user.password_hash.clone()),
        );

        if verified.is_err() {
            self.audit
                .record(
                    Some(user.user_id),
                    AuditAction::LoginFailure,
                    "user",
                    Some(user.user_id),
                    None,
                )
                .await;
            return Err(ServiceError::Unauthenticated);
        }

        self.audit
            .record(
                Some(user.user_id),
                AuditAction::LoginSuccess,
                "user",
                Some(user.user_id),
                None,
            )
            .await;

        Ok(user)
    }
}
