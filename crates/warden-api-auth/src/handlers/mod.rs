//! Endpoint handlers for `/auth/*`.

pub mod login;
pub mod logout;
pub mod me;
pub mod password_change;
pub mod refresh;
pub mod register;

use axum::extract::rejection::JsonRejection;
use axum::Json;

use crate::error::{ApiAuthError, ApiResult};

pub use login::login_handler;
pub use logout::logout_handler;
pub use me::me_handler;
pub use password_change::password_change_handler;
pub use refresh::refresh_handler;
pub use register::{bulk_register_handler, register_handler};

/// Cookie settings for the refresh token.
#[derive(Debug, Clone, Copy)]
pub struct CookieConfig {
    /// Adds `Secure`; on in production.
    pub secure: bool,
    pub max_age: u64,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            secure: false,
            max_age: crate::middleware::refresh_cookie::REFRESH_COOKIE_MAX_AGE,
        }
    }
}

/// Unwrap a JSON body, turning extractor rejections into validation errors.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiAuthError::validation("body", rejection.body_text()))
}
