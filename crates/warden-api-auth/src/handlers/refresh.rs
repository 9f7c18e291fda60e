//! POST /auth/refresh

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::{Extension, Json};
use warden_core::ApiEnvelope;

use super::CookieConfig;
use crate::error::{ApiAuthError, ApiResult};
use crate::middleware::client_info::ClientContext;
use crate::middleware::refresh_cookie::{create_refresh_cookie, extract_refresh_cookie, set_cookie};
use crate::models::{RefreshRequest, TokenResponse};
use crate::services::CredentialLifecycleService;

/// Rotate the refresh token taken from the JSON body or the cookie.
pub async fn refresh_handler(
    Extension(lifecycle): Extension<Arc<CredentialLifecycleService>>,
    Extension(cookies): Extension<CookieConfig>,
    ClientContext(ctx): ClientContext,
    request_headers: HeaderMap,
    body: Option<Json<RefreshRequest>>,
) -> ApiResult<(HeaderMap, Json<ApiEnvelope<TokenResponse>>)> {
    let token = presented_refresh_token(&request_headers, body)
        .ok_or_else(|| ApiAuthError::Unauthorized("Refresh token required".to_string()))?;

    let tokens = lifecycle.refresh(&token, &ctx).await?;

    let mut headers = HeaderMap::new();
    set_cookie(
        &mut headers,
        &create_refresh_cookie(&tokens.refresh_token, cookies.max_age, cookies.secure),
    );
    Ok((headers, Json(ApiEnvelope::ok(tokens))))
}

/// Body value first, then the cookie.
pub(crate) fn presented_refresh_token(
    headers: &HeaderMap,
    body: Option<Json<RefreshRequest>>,
) -> Option<String> {
    body.and_then(|Json(request)| request.refresh_token)
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .or_else(|| extract_refresh_cookie(headers))
}
