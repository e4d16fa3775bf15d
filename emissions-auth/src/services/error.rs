use service_core::error::AppError;
use thiserror::Error;

/// Internal error taxonomy for the auth core.
///
/// Credential and refresh-token failures are deliberately generic:
/// callers never learn whether a username was unknown, a password was
/// wrong, or a session was revoked versus expired.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Unauthenticated")]
    Unauthenticated,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Forbidden")]
    Forbidden,

    #[error("Rate limited, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Username already exists")]
    UsernameTaken,

    #[error("Database error: {0}")]
    Database(anyhow::Error),

    #[error("Cache error: {0}")]
    Cache(anyhow::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unauthenticated => AppError::Unauthenticated,
            ServiceError::InvalidRefreshToken => AppError::InvalidRefreshToken,
            ServiceError::Forbidden => AppError::Forbidden,
            ServiceError::RateLimited {
                retry_after_seconds,
            } => AppError::RateLimited("rate_limited".to_string(), Some(retry_after_seconds)),
            ServiceError::Validation(msg) => AppError::ValidationError(msg),
            ServiceError::UsernameTaken => {
                AppError::Conflict(anyhow::anyhow!("username already exists"))
            }
            ServiceError::Database(e) => AppError::DatabaseError(e),
            ServiceError::Cache(e) => AppError::InternalError(e),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}
