//! Authentication API router.
//!
//! - POST /auth/register
//! - POST /auth/register/bulk
//! - POST /auth/login
//! - POST /auth/refresh
//! - POST /auth/logout
//! - POST /auth/change-password
//! - GET  /auth/me

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Extension, Router};
use warden_authorization::IdentityResolver;

use crate::handlers::{
    bulk_register_handler, login_handler, logout_handler, me_handler, password_change_handler,
    refresh_handler, register_handler, CookieConfig,
};
use crate::services::CredentialLifecycleService;

/// Everything the `/auth` routes need.
#[derive(Clone)]
pub struct AuthState {
    pub lifecycle: Arc<CredentialLifecycleService>,
    pub identity: Arc<IdentityResolver>,
    pub cookies: CookieConfig,
}

impl AuthState {
    pub fn new(lifecycle: Arc<CredentialLifecycleService>, identity: Arc<IdentityResolver>) -> Self {
        Self {
            lifecycle,
            identity,
            cookies: CookieConfig::default(),
        }
    }

    #[must_use]
    pub fn with_cookies(mut self, cookies: CookieConfig) -> Self {
        self.cookies = cookies;
        self
    }
}

/// Routes nested under `/auth`. Not wrapped by the authorization layer:
/// `/me` and `/change-password` authenticate through [`CurrentUser`](crate::middleware::CurrentUser).
pub fn auth_router(state: AuthState) -> Router {
    let routes = Router::new()
        .route("/register", post(register_handler))
        .route("/register/bulk", post(bulk_register_handler))
        .route("/login", post(login_handler))
        .route("/refresh", post(refresh_handler))
        .route("/logout", post(logout_handler))
        .route("/change-password", post(password_change_handler))
        .route("/me", get(me_handler))
        .layer(Extension(state.lifecycle))
        .layer(Extension(state.identity))
        .layer(Extension(state.cookies));

    Router::new().nest("/auth", routes)
}
