pub mod audit_event;
pub mod permission;
pub mod refresh_session;
pub mod role;
pub mod user;

pub use audit_event::{AuditAction, AuditEvent};
pub use permission::Permission;
pub use refresh_session::{CachedSession, RefreshSession};
pub use role::{Role, RolePermission, RoleWithPermissions};
pub use user::{SanitizedUser, User, UserRole};
