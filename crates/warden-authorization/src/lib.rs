//! Hybrid RBAC + ABAC authorization for warden.
//!
//! - [`PermissionEngine`]: additive role permissions with a grants-all bypass
//! - [`PolicyEngine`]: attribute rules bound to features
//! - [`AuthorizationOrchestrator`]: identity → RBAC → ABAC → audit, per request
//! - [`AuditRecorder`]: append-only trail and on-read statistics
//! - [`AccessAdminService`]: administration of all of the above

pub mod abac;
pub mod admin;
pub mod audit;
pub mod error;
pub mod identity;
pub mod orchestrator;
pub mod policy_evaluator;
pub mod roles;
pub mod types;

pub use admin::{AccessAdminService, PermissionPatch};
pub use audit::{AccessStats, AuditDispatch, AuditRecorder, SessionStats, ViolationStats};
pub use error::{AuthorizationError, Result};
pub use identity::{
    bearer_token, cookie_value, IdentityResolver, ACCESS_TOKEN_COOKIE, HEADER_USER_ACTIVE,
    HEADER_USER_EMAIL, HEADER_USER_ID, HEADER_USER_NAME, IDENTITY_HEADERS,
};
pub use orchestrator::{AccessRequest, AuthorizationOrchestrator, OrchestratorConfig};
pub use policy_evaluator::{AbacDecision, PolicyEngine, PolicyResolver};
pub use roles::{PermissionEngine, RbacOutcome, RoleResolver};
pub use types::*;
