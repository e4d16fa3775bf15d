//! Permission cache: version-stamped effective-permission lookup.
//!
//! Cache keys embed a per-user version counter, so invalidation is a
//! single INCR: old entries are orphaned and age out via their TTL
//! without ever being enumerated.

use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::services::cache::Cache;
use crate::services::error::ServiceError;
use crate::services::store::AuthStore;

/// Builtin permission catalogue seeded at bootstrap.
pub const BUILTIN_PERMISSIONS: &[&str] = &[
    "emissions.create",
    "emissions.read",
    "emissions.update",
    "emissions.delete",
    "audit.read",
    "users.manage",
    "roles.manage",
];

/// Builtin roles and their permission subsets.
pub const BUILTIN_ROLES: &[(&str, &str, &[&str])] = &[
    ("ADMIN", "Full access", BUILTIN_PERMISSIONS),
    (
        "DATA_ENTRY",
        "Create and manage emissions",
        &["emissions.create", "emissions.read", "emissions.update"],
    ),
    ("VIEWER", "Read-only access", &["emissions.read"]),
    (
        "AUDITOR",
        "View emissions and audits",
        &["emissions.read", "audit.read"],
    ),
];

fn version_key(user_id: Uuid) -> String {
    format!("permversion:user:{}", user_id)
}

fn set_key(user_id: Uuid, version: i64) -> String {
    format!("permset:user:{}:v{}", user_id, version)
}

#[derive(Clone)]
pub struct PermissionService {
    store: Arc<dyn AuthStore>,
    cache: Arc<dyn Cache>,
    cache_ttl_seconds: i64,
}

impl PermissionService {
    pub fn new(store: Arc<dyn AuthStore>, cache: Arc<dyn Cache>, cache_ttl_seconds: i64) -> Self {
        Self {
            store,
            cache,
            cache_ttl_seconds,
        }
    }

    /// Resolve the effective permission set for a user: the union of
    /// permission names across all assigned roles.
    ///
    /// The nil user id short-circuits to an empty set. When the cache
    /// is unreachable the lookup degrades to a direct store query.
    pub async fn effective_permissions(
        &self,
        user_id: Uuid,
    ) -> Result<BTreeSet<String>, ServiceError> {
        if user_id.is_nil() {
            return Ok(BTreeSet::new());
        }

        let version = match self.cache.get(&version_key(user_id)).await {
            Ok(Some(v)) => v.parse::<i64>().unwrap_or(1),
            Ok(None) => {
                if let Err(e) = self.cache.set(&version_key(user_id), "1").await {
                    tracing::warn!(user_id = %user_id, error = %e, "Failed to initialize permission version");
                }
                1
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Permission cache unreachable, querying store directly");
                return self.load_from_store(user_id).await;
            }
        };

        let key = set_key(user_id, version);
        if let Ok(Some(cached)) = self.cache.get(&key).await {
            if let Ok(names) = serde_json::from_str::<Vec<String>>(&cached) {
                return Ok(names.into_iter().collect());
            }
            // Unparsable entry falls through to the store
        }

        let permissions = self.load_from_store(user_id).await?;

        match serde_json::to_string(&permissions.iter().collect::<Vec<_>>()) {
            Ok(payload) => {
                if let Err(e) = self
                    .cache
                    .set_ex(&key, &payload, self.cache_ttl_seconds)
                    .await
                {
                    tracing::warn!(user_id = %user_id, error = %e, "Failed to cache permission set");
                }
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Failed to serialize permission set");
            }
        }

        Ok(permissions)
    }

    async fn load_from_store(&self, user_id: Uuid) -> Result<BTreeSet<String>, ServiceError> {
        let names = self
            .store
            .permission_names_for_user(user_id)
            .await
            .map_err(ServiceError::Database)?;
        Ok(names.into_iter().collect())
    }

    /// Invalidate every cached permission set for a user by bumping the
    /// version counter. Previously cached sets become unreachable and
    /// expire via their TTL.
    pub async fn invalidate(&self, user_id: Uuid) -> Result<(), ServiceError> {
        if user_id.is_nil() {
            return Ok(());
        }
        self.cache
            .incr(&version_key(user_id))
            .await
            .map_err(ServiceError::Cache)?;
        Ok(())
    }

    /// Idempotently seed the builtin permission and role catalogues.
    /// Safe to invoke repeatedly; duplicate links are swallowed.
    pub async fn seed_builtins(&self) -> Result<(), ServiceError> {
        for name in BUILTIN_PERMISSIONS {
            self.store
                .upsert_permission(name, None)
                .await
                .map_err(ServiceError::Database)?;
        }

        for &(name, description, permissions) in BUILTIN_ROLES {
            let role = self
                .store
                .upsert_role(name, Some(description), true)
                .await
                .map_err(ServiceError::Database)?;

            for permission_name in permissions {
                let permission = self
                    .store
                    .upsert_permission(permission_name, None)
                    .await
                    .map_err(ServiceError::Database)?;
                self.store
                    .link_role_permission(role.role_id, permission.permission_id)
                    .await
                    .map_err(ServiceError::Database)?;
            }
        }

        tracing::info!("Builtin permissions and roles seeded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cache::{MockCache, UnreachableCache};
    use crate::services::store::{AuthStore, MockStore};

    async fn user_with_roles(store: &MockStore, roles: &[(&str, &[&str])]) -> Uuid {
        let user_id = Uuid::new_v4();
        for (role_name, perms) in roles {
            let role = store.upsert_role(role_name, None, false).await.unwrap();
            for perm in *perms {
                let p = store.upsert_permission(perm, None).await.unwrap();
                store
                    .link_role_permission(role.role_id, p.permission_id)
                    .await
                    .unwrap();
            }
            store
                .assign_user_role(user_id, role.role_id, None)
                .await
                .unwrap();
        }
        user_id
    }

    #[tokio::test]
    async fn test_union_across_roles_deduplicates() {
        let store = Arc::new(MockStore::new());
        let user_id = user_with_roles(&store, &[("a", &["x", "y"]), ("b", &["y", "z"])]).await;
        let perms = PermissionService::new(store, Arc::new(MockCache::new()), 3600);

        let set = perms.effective_permissions(user_id).await.unwrap();
        let expected: BTreeSet<String> =
            ["x", "y", "z"].iter().map(|s| s.to_string()).collect();
        assert_eq!(set, expected);
    }

    #[tokio::test]
    async fn test_nil_user_yields_empty_set() {
        let perms = PermissionService::new(
            Arc::new(MockStore::new()),
            Arc::new(MockCache::new()),
            3600,
        );
        assert!(perms
            .effective_permissions(Uuid::nil())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_cached_set_served_without_store() {
        let store = Arc::new(MockStore::new());
        let cache = Arc::new(MockCache::new());
        let user_id = user_with_roles(&store, &[("viewer", &["emissions.read"])]).await;
        let perms = PermissionService::new(store.clone(), cache.clone(), 3600);

        let first = perms.effective_permissions(user_id).await.unwrap();
        // Remove the role behind the cache's back; the cached set wins
        // until invalidation or TTL expiry.
        let second = perms.effective_permissions(user_id).await.unwrap();
        assert_eq!(first, second);
        assert!(cache.get(&set_key(user_id, 1)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalidate_orphans_stale_entries() {
        let store = Arc::new(MockStore::new());
        let cache = Arc::new(MockCache::new());
        let user_id = user_with_roles(&store, &[("viewer", &["emissions.read"])]).await;
        let perms = PermissionService::new(store.clone(), cache.clone(), 3600);

        let before = perms.effective_permissions(user_id).await.unwrap();
        assert_eq!(before.len(), 1);

        // Grant another role, then invalidate
        let role = store.upsert_role("auditor", None, false).await.unwrap();
        let p = store.upsert_permission("audit.read", None).await.unwrap();
        store
            .link_role_permission(role.role_id, p.permission_id)
            .await
            .unwrap();
        store
            .assign_user_role(user_id, role.role_id, None)
            .await
            .unwrap();
        perms.invalidate(user_id).await.unwrap();

        // The old entry still physically exists but is never consulted
        assert!(cache.get(&set_key(user_id, 1)).await.unwrap().is_some());
        let after = perms.effective_permissions(user_id).await.unwrap();
        assert!(after.contains("audit.read"));
        assert_eq!(after.len(), 2);
    }

    #[tokio::test]
    async fn test_cache_outage_falls_back_to_store() {
        let store = Arc::new(MockStore::new());
        let user_id = user_with_roles(&store, &[("viewer", &["emissions.read"])]).await;
        let perms = PermissionService::new(store, Arc::new(UnreachableCache), 3600);

        let set = perms.effective_permissions(user_id).await.unwrap();
        assert!(set.contains("emissions.read"));
    }

    #[tokio::test]
    async fn test_seed_builtins_is_idempotent() {
        let store = Arc::new(MockStore::new());
        let perms = PermissionService::new(store.clone(), Arc::new(MockCache::new()), 3600);

        perms.seed_builtins().await.unwrap();
        perms.seed_builtins().await.unwrap();

        let roles = store.list_roles_with_permissions().await.unwrap();
        assert_eq!(roles.len(), BUILTIN_ROLES.len());

        let admin = roles.iter().find(|r| r.role.name == "ADMIN").unwrap();
        assert!(admin.role.is_builtin);
        assert_eq!(admin.permissions.len(), BUILTIN_PERMISSIONS.len());

        let viewer = roles.iter().find(|r| r.role.name == "VIEWER").unwrap();
        assert_eq!(viewer.permissions, vec!["emissions.read".to_string()]);
    }
}
