//! POST /auth/register and POST /auth/register/bulk.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::{Extension, Json};
use warden_core::ApiEnvelope;
use warden_db::models::UserProfile;

use super::json_body;
use crate::error::ApiResult;
use crate::models::{BulkRegisterRequest, BulkRegisterResult, RegisterRequest};
use crate::services::CredentialLifecycleService;

pub async fn register_handler(
    Extension(lifecycle): Extension<Arc<CredentialLifecycleService>>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiEnvelope<UserProfile>>)> {
    let request = json_body(body)?;
    let profile = lifecycle.register(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiEnvelope::ok_with_message(profile, "User registered")),
    ))
}

pub async fn bulk_register_handler(
    Extension(lifecycle): Extension<Arc<CredentialLifecycleService>>,
    body: Result<Json<BulkRegisterRequest>, JsonRejection>,
) -> ApiResult<Json<ApiEnvelope<BulkRegisterResult>>> {
    let request = json_body(body)?;
    let result = lifecycle.bulk_register(request).await?;
    let message = format!(
        "{} registered, {} failed",
        result.successful.len(),
        result.failed.len()
    );
    Ok(Json(ApiEnvelope::ok_with_message(result, message)))
}
