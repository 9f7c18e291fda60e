//! GET /auth/me

use std::sync::Arc;

use axum::{Extension, Json};
use warden_core::ApiEnvelope;

use crate::error::ApiResult;
use crate::middleware::current_user::CurrentUser;
use crate::models::MeResponse;
use crate::services::CredentialLifecycleService;

pub async fn me_handler(
    Extension(lifecycle): Extension<Arc<CredentialLifecycleService>>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<ApiEnvelope<MeResponse>>> {
    Ok(Json(ApiEnvelope::ok(lifecycle.me(user.id).await?)))
}
