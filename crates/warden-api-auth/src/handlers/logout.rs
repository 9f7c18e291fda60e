//! POST /auth/logout

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::{Extension, Json};
use warden_core::ApiEnvelope;

use super::refresh::presented_refresh_token;
use super::CookieConfig;
use crate::error::ApiResult;
use crate::middleware::client_info::ClientContext;
use crate::middleware::refresh_cookie::{clear_refresh_cookie, set_cookie};
use crate::models::RefreshRequest;
use crate::services::CredentialLifecycleService;

/// Revoke the refresh token and clear the cookie. Succeeds even when no
/// live token was presented.
pub async fn logout_handler(
    Extension(lifecycle): Extension<Arc<CredentialLifecycleService>>,
    Extension(cookies): Extension<CookieConfig>,
    ClientContext(ctx): ClientContext,
    request_headers: HeaderMap,
    body: Option<Json<RefreshRequest>>,
) -> ApiResult<(HeaderMap, Json<ApiEnvelope<()>>)> {
    if let Some(token) = presented_refresh_token(&request_headers, body) {
        lifecycle.logout(&token, &ctx).await?;
    }

    let mut headers = HeaderMap::new();
    set_cookie(&mut headers, &clear_refresh_cookie(cookies.secure));
    Ok((headers, Json(ApiEnvelope::message("Logged out"))))
}
