//! POST /auth/login

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use axum::{Extension, Json};
use warden_core::ApiEnvelope;

use super::{json_body, CookieConfig};
use crate::error::ApiResult;
use crate::middleware::client_info::ClientContext;
use crate::middleware::refresh_cookie::{create_refresh_cookie, set_cookie};
use crate::models::{LoginRequest, TokenResponse};
use crate::services::CredentialLifecycleService;

/// Authenticate with email and password. Issues a token pair and sets the
/// refresh cookie.
pub async fn login_handler(
    Extension(lifecycle): Extension<Arc<CredentialLifecycleService>>,
    Extension(cookies): Extension<CookieConfig>,
    ClientContext(ctx): ClientContext,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<(HeaderMap, Json<ApiEnvelope<TokenResponse>>)> {
    let request = json_body(body)?;
    let tokens = lifecycle.login(request, &ctx).await?;

    let mut headers = HeaderMap::new();
    set_cookie(
        &mut headers,
        &create_refresh_cookie(&tokens.refresh_token, cookies.max_age, cookies.secure),
    );
    Ok((headers, Json(ApiEnvelope::ok_with_message(tokens, "Login successful"))))
}
