pub mod config;
pub mod models;
pub mod services;
pub mod utils;

use std::sync::Arc;

use service_core::error::AppError;

use crate::config::AuthConfig;
use crate::services::audit::AuditRecorder;
use crate::services::auth::AuthService;
use crate::services::cache::RedisCache;
use crate::services::credentials::CredentialVerifier;
use crate::services::jwt::TokenSigner;
use crate::services::permissions::PermissionService;
use crate::services::rate_limit::FixedWindowLimiter;
use crate::services::sessions::SessionService;
use crate::services::store::PostgresStore;
use crate::services::users::UserService;

/// Fully wired service graph, shared across request handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub users: UserService,
    pub sessions: SessionService,
    pub permissions: PermissionService,
    pub limiter: FixedWindowLimiter,
}

/// Connect to the backing stores and assemble the service graph.
///
/// Runs pending migrations and seeds the builtin role catalogue, so a
/// fresh database is usable immediately after this returns.
pub async fn build_state(config: &AuthConfig) -> Result<AppState, AppError> {
    let store = PostgresStore::connect(&config.database.url).await?;
    store.migrate().await?;
    let store = Arc::new(store);

    let cache = Arc::new(RedisCache::connect(&config.redis.url).await?);

    let signer = TokenSigner::new(
        &config.tokens.access_secret,
        config.tokens.access_ttl_seconds,
    );
    let audit = AuditRecorder::new(store.clone());
    let permissions = PermissionService::new(
        store.clone(),
        cache.clone(),
        config.security.permission_cache_ttl_seconds,
    );
    permissions.seed_builtins().await?;

    let sessions = SessionService::new(
        store.clone(),
        cache.clone(),
        signer.clone(),
        config.tokens.refresh_ttl_seconds,
    );
    let credentials = CredentialVerifier::new(store.clone(), audit.clone());
    let users = UserService::new(
        store.clone(),
        permissions.clone(),
        audit.clone(),
        config.security.bcrypt_cost,
    );
    let limiter = FixedWindowLimiter::new(
        cache.clone(),
        config.rate_limit.prefix.clone(),
        config.rate_limit.window_seconds as i64,
        config.rate_limit.max_requests as i64,
    );
    let auth = AuthService::new(
        credentials,
        sessions.clone(),
        permissions.clone(),
        signer,
        audit,
    );

    Ok(AppState {
        auth,
        users,
        sessions,
        permissions,
        limiter,
    })
}
