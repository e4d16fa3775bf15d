pub mod audit;
pub mod auth;
pub mod cache;
pub mod credentials;
pub mod error;
pub mod jwt;
pub mod permissions;
pub mod rate_limit;
pub mod sessions;
pub mod store;
pub mod users;

pub use audit::AuditRecorder;
pub use auth::{AuthService, TokenResponse};
pub use cache::{Cache, RedisCache};
pub use credentials::CredentialVerifier;
pub use error::ServiceError;
pub use jwt::{TokenSigner, VerifiedAccess};
pub use permissions::PermissionService;
pub use rate_limit::FixedWindowLimiter;
pub use sessions::SessionService;
pub use store::{AuthStore, PostgresStore};
pub use users::UserService;
