//! POST /auth/change-password

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use axum::{Extension, Json};
use warden_core::ApiEnvelope;

use super::{json_body, CookieConfig};
use crate::error::ApiResult;
use crate::middleware::client_info::ClientContext;
use crate::middleware::current_user::CurrentUser;
use crate::middleware::refresh_cookie::{clear_refresh_cookie, set_cookie};
use crate::models::ChangePasswordRequest;
use crate::services::CredentialLifecycleService;

/// Change the caller's password. Every session is revoked, so the refresh
/// cookie is cleared too.
pub async fn password_change_handler(
    Extension(lifecycle): Extension<Arc<CredentialLifecycleService>>,
    Extension(cookies): Extension<CookieConfig>,
    CurrentUser(user): CurrentUser,
    ClientContext(ctx): ClientContext,
    body: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> ApiResult<(HeaderMap, Json<ApiEnvelope<()>>)> {
    let request = json_body(body)?;
    lifecycle.change_password(user.id, request, &ctx).await?;

    let mut headers = HeaderMap::new();
    set_cookie(&mut headers, &clear_refresh_cookie(cookies.secure));
    Ok((headers, Json(ApiEnvelope::message("Password changed; please sign in again"))))
}
