//! The `refreshToken` cookie: HttpOnly, SameSite=Strict, Path=/.

use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderValue};
use warden_authorization::cookie_value;

pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

/// Seven days, matching the refresh token lifetime.
pub const REFRESH_COOKIE_MAX_AGE: u64 = 604_800;

#[must_use]
pub fn create_refresh_cookie(token: &str, max_age: u64, secure: bool) -> String {
    let secure_flag = if secure { "; Secure" } else { "" };
    format!(
        "{REFRESH_COOKIE_NAME}={token}; HttpOnly{secure_flag}; SameSite=Strict; Path=/; Max-Age={max_age}"
    )
}

#[must_use]
pub fn clear_refresh_cookie(secure: bool) -> String {
    let secure_flag = if secure { "; Secure" } else { "" };
    format!("{REFRESH_COOKIE_NAME}=; HttpOnly{secure_flag}; SameSite=Strict; Path=/; Max-Age=0")
}

pub fn set_cookie(headers: &mut HeaderMap, cookie: &str) {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            headers.append(SET_COOKIE, value);
        }
        Err(e) => tracing::warn!(error = %e, "Refusing to emit malformed Set-Cookie header"),
    }
}

/// Refresh token from the request cookies, if any.
pub fn extract_refresh_cookie(headers: &HeaderMap) -> Option<String> {
    cookie_value(headers, REFRESH_COOKIE_NAME).map(str::to_string)
}
