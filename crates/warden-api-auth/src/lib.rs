//! Credential lifecycle and HTTP surface for warden.
//!
//! - [`CredentialLifecycleService`]: registration, login, logout, refresh
//!   rotation, password change and reset, bulk registration
//! - [`auth_router`]: the `/auth/*` endpoints
//! - [`middleware::authorize`]: runs the authorization orchestrator per request
//! - [`ApiAuthError`]: the boundary error formatter
//!
//! # Example
//!
//! ```rust,ignore
//! let app = Router::new()
//!     .merge(auth_router(auth_state))
//!     .merge(protected_routes.layer(from_fn_with_state(authorize_state, authorize)))
//!     .layer(from_fn(log_errors));
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod router;
pub mod services;

pub use error::{error_response, ApiAuthError, ApiResult, ErrorReport};
pub use handlers::CookieConfig;
pub use middleware::{authorize, log_errors, AuthorizeState, CurrentUser};
pub use router::{auth_router, AuthState};
pub use services::{
    CredentialLifecycleService, LifecycleConfig, SessionContext, TokenPair, TokenService,
};
