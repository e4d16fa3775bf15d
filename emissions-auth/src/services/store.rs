//! Persistent-store seam: Postgres in production, in-memory mock in tests.
//!
//! Seeding paths use upsert semantics so retried writes stay
//! idempotent. Refresh sessions are never deleted; termination only
//! sets `revoked_at` (and `replaced_by_session_id` on rotation).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::{
    AuditEvent, Permission, RefreshSession, Role, RoleWithPermissions, User, UserRole,
};

#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, anyhow::Error>;
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, anyhow::Error>;
    async fn insert_user(&self, user: &User) -> Result<(), anyhow::Error>;

    async fn insert_refresh_session(&self, session: &RefreshSession) -> Result<(), anyhow::Error>;
    async fn find_refresh_session(
        &self,
        session_id: Uuid,
    ) -> Result<Option<RefreshSession>, anyhow::Error>;
    /// Mark a session rotated: set `revoked_at` and point at the successor.
    async fn mark_session_replaced(
        &self,
        session_id: Uuid,
        replaced_by: Uuid,
        revoked_at: DateTime<Utc>,
    ) -> Result<(), anyhow::Error>;
    /// Mark a session revoked. No-op when already terminal.
    async fn revoke_session(
        &self,
        session_id: Uuid,
        revoked_at: DateTime<Utc>,
    ) -> Result<(), anyhow::Error>;

    /// Union of permission names across all roles assigned to the user.
    async fn permission_names_for_user(&self, user_id: Uuid) -> Result<Vec<String>, anyhow::Error>;
    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, anyhow::Error>;
    async fn upsert_permission(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Permission, anyhow::Error>;
    async fn upsert_role(
        &self,
        name: &str,
        description: Option<&str>,
        is_builtin: bool,
    ) -> Result<Role, anyhow::Error>;
    async fn link_role_permission(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), anyhow::Error>;
    async fn assign_user_role(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        assigned_by: Option<Uuid>,
    ) -> Result<(), anyhow::Error>;
    async fn list_roles_with_permissions(&self) -> Result<Vec<RoleWithPermissions>, anyhow::Error>;

    async fn insert_audit_event(&self, event: &AuditEvent) -> Result<(), anyhow::Error>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self, anyhow::Error> {
        tracing::info!("Connecting to PostgreSQL");
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to PostgreSQL: {}", e))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> Result<(), anyhow::Error> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!("migration failed: {}", e))
    }
}

#[async_trait]
impl AuthStore for PostgresStore {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, anyhow::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, anyhow::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))
    }

    async fn insert_user(&self, user: &User) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, username, password_hash, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user.user_id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    async fn insert_refresh_session(&self, session: &RefreshSession) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            INSERT INTO refresh_sessions
                (session_id, user_id, token_hash, expires_at, revoked_at,
                 replaced_by_session_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(session.session_id)
        .bind(session.user_id)
        .bind(&session.token_hash)
        .bind(session.expires_at)
        .bind(session.revoked_at)
        .bind(session.replaced_by_session_id)
        .bind(session.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    async fn find_refresh_session(
        &self,
        session_id: Uuid,
    ) -> Result<Option<RefreshSession>, anyhow::Error> {
        sqlx::query_as::<_, RefreshSession>(
            "SELECT * FROM refresh_sessions WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))
    }

    async fn mark_session_replaced(
        &self,
        session_id: Uuid,
        replaced_by: Uuid,
        revoked_at: DateTime<Utc>,
    ) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            UPDATE refresh_sessions
            SET revoked_at = $2, replaced_by_session_id = $3
            WHERE session_id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(session_id)
        .bind(revoked_at)
        .bind(replaced_by)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    async fn revoke_session(
        &self,
        session_id: Uuid,
        revoked_at: DateTime<Utc>,
    ) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            UPDATE refresh_sessions
            SET revoked_at = $2
            WHERE session_id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(session_id)
        .bind(revoked_at)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    async fn permission_names_for_user(&self, user_id: Uuid) -> Result<Vec<String>, anyhow::Error> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT p.name
            FROM user_roles ur
            JOIN role_permissions rp ON rp.role_id = ur.role_id
            JOIN permissions p ON p.permission_id = rp.permission_id
            WHERE ur.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, anyhow::Error> {
        sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))
    }

    async fn upsert_permission(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Permission, anyhow::Error> {
        sqlx::query_as::<_, Permission>(
            r#"
            INSERT INTO permissions (permission_id, name, description, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(description)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))
    }

    async fn upsert_role(
        &self,
        name: &str,
        description: Option<&str>,
        is_builtin: bool,
    ) -> Result<Role, anyhow::Error> {
        sqlx::query_as::<_, Role>(
            r#"
            INSERT INTO roles (role_id, name, description, is_builtin, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (name) DO UPDATE
                SET description = EXCLUDED.description,
                    is_builtin = EXCLUDED.is_builtin,
                    updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(description)
        .bind(is_builtin)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))
    }

    async fn link_role_permission(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            INSERT INTO role_permissions (role_id, permission_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(role_id)
        .bind(permission_id)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    async fn assign_user_role(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        assigned_by: Option<Uuid>,
    ) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role_id, assigned_by, assigned_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(role_id)
        .bind(assigned_by)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    async fn list_roles_with_permissions(&self) -> Result<Vec<RoleWithPermissions>, anyhow::Error> {
        let roles = sqlx::query_as::<_, Role>("SELECT * FROM roles ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;

        let mut out = Vec::with_capacity(roles.len());
        for role in roles {
            let permissions = sqlx::query_scalar::<_, String>(
                r#"
                SELECT p.name
                FROM role_permissions rp
                JOIN permissions p ON p.permission_id = rp.permission_id
                WHERE rp.role_id = $1
                ORDER BY p.name
                "#,
            )
            .bind(role.role_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
            out.push(RoleWithPermissions { role, permissions });
        }
        Ok(out)
    }

    async fn insert_audit_event(&self, event: &AuditEvent) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            INSERT INTO audit_log
                (event_id, actor_id, action, target_type, target_id, diff, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.event_id)
        .bind(event.actor_id)
        .bind(&event.action)
        .bind(&event.target_type)
        .bind(event.target_id)
        .bind(&event.diff)
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!("database health check failed: {}", e))?;
        Ok(())
    }
}

#[derive(Default)]
struct MockTables {
    users: Vec<User>,
    sessions: HashMap<Uuid, RefreshSession>,
    roles: Vec<Role>,
    permissions: Vec<Permission>,
    role_permissions: Vec<(Uuid, Uuid)>,
    user_roles: Vec<UserRole>,
    audit_log: Vec<AuditEvent>,
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MockStore {
    tables: Mutex<MockTables>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded audit events, for assertions.
    pub fn audit_events(&self) -> Vec<AuditEvent> {
        self.tables.lock().unwrap().audit_log.clone()
    }

    /// Direct session lookup, for assertions on terminal state.
    pub fn session(&self, session_id: Uuid) -> Option<RefreshSession> {
        self.tables.lock().unwrap().sessions.get(&session_id).cloned()
    }

    /// Force a stored session past its expiry, simulating time passing.
    pub fn expire_session(&self, session_id: Uuid) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(s) = tables.sessions.get_mut(&session_id) {
            s.expires_at = Utc::now() - chrono::Duration::seconds(1);
        }
    }
}

#[async_trait]
impl AuthStore for MockStore {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, anyhow::Error> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, anyhow::Error> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.iter().find(|u| u.user_id == user_id).cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<(), anyhow::Error> {
        let mut tables = self.tables.lock().unwrap();
        if tables.users.iter().any(|u| u.username == user.username) {
            return Err(anyhow::anyhow!("duplicate username"));
        }
        tables.users.push(user.clone());
        Ok(())
    }

    async fn insert_refresh_session(&self, session: &RefreshSession) -> Result<(), anyhow::Error> {
        let mut tables = self.tables.lock().unwrap();
        tables.sessions.insert(session.session_id, session.clone());
        Ok(())
    }

    async fn find_refresh_session(
        &self,
        session_id: Uuid,
    ) -> Result<Option<RefreshSession>, anyhow::Error> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.sessions.get(&session_id).cloned())
    }

    async fn mark_session_replaced(
        &self,
        session_id: Uuid,
        replaced_by: Uuid,
        revoked_at: DateTime<Utc>,
    ) -> Result<(), anyhow::Error> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(s) = tables.sessions.get_mut(&session_id) {
            if s.revoked_at.is_none() {
                s.revoked_at = Some(revoked_at);
                s.replaced_by_session_id = Some(replaced_by);
            }
        }
        Ok(())
    }

    async fn revoke_session(
        &self,
        session_id: Uuid,
        revoked_at: DateTime<Utc>,
    ) -> Result<(), anyhow::Error> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(s) = tables.sessions.get_mut(&session_id) {
            if s.revoked_at.is_none() {
                s.revoked_at = Some(revoked_at);
            }
        }
        Ok(())
    }

    async fn permission_names_for_user(&self, user_id: Uuid) -> Result<Vec<String>, anyhow::Error> {
        let tables = self.tables.lock().unwrap();
        let mut names = Vec::new();
        for ur in tables.user_roles.iter().filter(|ur| ur.user_id == user_id) {
            for (role_id, permission_id) in &tables.role_permissions {
                if *role_id != ur.role_id {
                    continue;
                }
                if let Some(p) = tables
                    .permissions
                    .iter()
                    .find(|p| p.permission_id == *permission_id)
                {
                    if !names.contains(&p.name) {
                        names.push(p.name.clone());
                    }
                }
            }
        }
        Ok(names)
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, anyhow::Error> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.roles.iter().find(|r| r.name == name).cloned())
    }

    async fn upsert_permission(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Permission, anyhow::Error> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(p) = tables.permissions.iter().find(|p| p.name == name) {
            return Ok(p.clone());
        }
        let permission = Permission::new(name.to_string(), description.map(|d| d.to_string()));
        tables.permissions.push(permission.clone());
        Ok(permission)
    }

    async fn upsert_role(
        &self,
        name: &str,
        description: Option<&str>,
        is_builtin: bool,
    ) -> Result<Role, anyhow::Error> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(r) = tables.roles.iter_mut().find(|r| r.name == name) {
            r.description = description.map(|d| d.to_string());
            r.is_builtin = is_builtin;
            r.updated_at = Utc::now();
            return Ok(r.clone());
        }
        let role = Role::new(
            name.to_string(),
            description.map(|d| d.to_string()),
            is_builtin,
        );
        tables.roles.push(role.clone());
        Ok(role)
    }

    async fn link_role_permission(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), anyhow::Error> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.role_permissions.contains(&(role_id, permission_id)) {
            tables.role_permissions.push((role_id, permission_id));
        }
        Ok(())
    }

    async fn assign_user_role(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        assigned_by: Option<Uuid>,
    ) -> Result<(), anyhow::Error> {
        let mut tables = self.tables.lock().unwrap();
        if !tables
            .user_roles
            .iter()
            .any(|ur| ur.user_id == user_id && ur.role_id == role_id)
        {
            tables.user_roles.push(UserRole {
                user_id,
                role_id,
                assigned_by,
                assigned_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn list_roles_with_permissions(&self) -> Result<Vec<RoleWithPermissions>, anyhow::Error> {
        let tables = self.tables.lock().unwrap();
        let mut roles: Vec<Role> = tables.roles.clone();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles
            .into_iter()
            .map(|role| {
                let mut permissions: Vec<String> = tables
                    .role_permissions
                    .iter()
                    .filter(|(role_id, _)| *role_id == role.role_id)
                    .filter_map(|(_, permission_id)| {
                        tables
                            .permissions
                            .iter()
                            .find(|p| p.permission_id == *permission_id)
                            .map(|p| p.name.clone())
                    })
                    .collect();
                permissions.sort();
                RoleWithPermissions { role, permissions }
            })
            .collect())
    }

    async fn insert_audit_event(&self, event: &AuditEvent) -> Result<(), anyhow::Error> {
        let mut tables = self.tables.lock().unwrap();
        tables.audit_log.push(event.clone());
        Ok(())
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}
