//! User provisioning and role assignment.

use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{AuditAction, RoleWithPermissions, SanitizedUser, User};
use crate::services::audit::AuditRecorder;
use crate::services::error::ServiceError;
use crate::services::permissions::PermissionService;
use crate::services::store::AuthStore;
use crate::utils::{hash_password, password_policy_message, validate_password_policy, Password};

const MAX_USERNAME_LENGTH: usize = 50;

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn AuthStore>,
    permissions: PermissionService,
    audit: AuditRecorder,
    bcrypt_cost: u32,
}

impl UserService {
    pub fn new(
        store: Arc<dyn AuthStore>,
        permissions: PermissionService,
        audit: AuditRecorder,
        bcrypt_cost: u32,
    ) -> Self {
        Self {
            store,
            permissions,
            audit,
            bcrypt_cost,
        }
    }

    /// Create a user, optionally assigning initial roles by name.
    pub async fn create_user(
        &self,
        actor_id: Option<Uuid>,
        username: &str,
        password: &str,
        role_names: &[String],
    ) -> Result<SanitizedUser, ServiceError> {
        let username = username.trim();
        if username.is_empty() || username.len() > MAX_USERNAME_LENGTH {
            return Err(ServiceError::Validation(format!(
                "username must be between 1 and {} characters",
                MAX_USERNAME_LENGTH
            )));
        }
        if !validate_password_policy(password) {
            return Err(ServiceError::Validation(
                password_policy_message().to_string(),
            ));
        }
        if self
            .store
            .find_user_by_username(username)
            .await
            .map_err(ServiceError::Database)?
            .is_some()
        {
            return Err(ServiceError::UsernameTaken);
        }

        let hash = hash_password(&Password::new(password.to_string()), self.bcrypt_cost)
            .map_err(ServiceError::Internal)?;
        let user = User::new(username.to_string(), hash.into_string());
        self.store
            .insert_user(&user)
            .await
            .map_err(ServiceError::Database)?;

        for name in role_names {
            self.assign_role_inner(actor_id, user.user_id, name).await?;
        }

        self.audit
            .record(
                actor_id,
                AuditAction::UserCreate,
                "user",
                Some(user.user_id),
                Some(json!({ "username": user.username, "roles": role_names })),
            )
            .await;

        Ok(user.into())
    }

    /// Assign a role to an existing user and invalidate their cached
    /// permission set.
    pub async fn assign_role(
        &self,
        actor_id: Option<Uuid>,
        user_id: Uuid,
        role_name: &str,
    ) -> Result<(), ServiceError> {
        if self
            .store
            .find_user_by_id(user_id)
            .await
            .map_err(ServiceError::Database)?
            .is_none()
        {
            return Err(ServiceError::Validation("user not found".to_string()));
        }
        self.assign_role_inner(actor_id, user_id, role_name).await
    }

    async fn assign_role_inner(
        &self,
        actor_id: Option<Uuid>,
        user_id: Uuid,
        role_name: &str,
    ) -> Result<(), ServiceError> {
        let role = self
            .store
            .find_role_by_name(role_name)
            .await
            .map_err(ServiceError::Database)?
            .ok_or_else(|| ServiceError::Validation(format!("unknown role: {}", role_name)))?;

        self.store
            .assign_user_role(user_id, role.role_id, actor_id)
            .await
            .map_err(ServiceError::Database)?;

        // The assignment is durable; a failed invalidation only delays
        // the new permissions until the version key is bumped.
        if let Err(err) = self.permissions.invalidate(user_id).await {
            tracing::warn!(
                user_id = %user_id,
                error = %err,
                "role assigned but permission cache invalidation failed"
            );
        }

        self.audit
            .record(
                actor_id,
                AuditAction::RoleAssign,
                "user",
                Some(user_id),
                Some(json!({ "roleId": role.role_id })),
            )
            .await;

        Ok(())
    }

    pub async fn list_roles(&self) -> Result<Vec<RoleWithPermissions>, ServiceError> {
        self.store
            .list_roles_with_permissions()
            .await
            .map_err(ServiceError::Database)
    }
}
