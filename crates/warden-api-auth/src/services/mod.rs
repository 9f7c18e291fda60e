//! Services behind the authentication endpoints.

pub mod auth_service;
pub mod token_service;
pub mod validation;

pub use auth_service::{CredentialLifecycleService, LifecycleConfig, SessionContext};
pub use token_service::{hash_token, RefreshRejection, TokenPair, TokenService};
