//! Operational routes: health and audit statistics.

use axum::extract::rejection::QueryRejection;
use axum::extract::Query;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde_json::{json, Value};
use warden_api_auth::{ApiAuthError, ApiResult};
use warden_authorization::{AccessStats, AuditRecorder, SessionStats, ViolationStats};
use warden_core::ApiEnvelope;
use warden_db::models::AuditQuery;

pub fn health_router() -> Router {
    Router::new().route("/health", get(health_handler))
}

/// Statistics routes. Callers layer authorization on top.
pub fn audit_router(audit: AuditRecorder) -> Router {
    Router::new()
        .route("/audit/access-stats", get(access_stats_handler))
        .route("/audit/violation-stats", get(violation_stats_handler))
        .route("/audit/session-stats", get(session_stats_handler))
        .layer(Extension(audit))
}

async fn health_handler() -> Json<ApiEnvelope<Value>> {
    Json(ApiEnvelope::ok(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

fn audit_query(query: Result<Query<AuditQuery>, QueryRejection>) -> ApiResult<AuditQuery> {
    let Query(query) = query.map_err(|e| ApiAuthError::validation("query", e.body_text()))?;
    if let (Some(since), Some(until)) = (query.since, query.until) {
        if since >= until {
            return Err(ApiAuthError::validation("since", "must be before 'until'"));
        }
    }
    Ok(query)
}

async fn access_stats_handler(
    Extension(audit): Extension<AuditRecorder>,
    query: Result<Query<AuditQuery>, QueryRejection>,
) -> ApiResult<Json<ApiEnvelope<AccessStats>>> {
    let stats = audit.access_stats(&audit_query(query)?).await?;
    Ok(Json(ApiEnvelope::ok(stats)))
}

async fn violation_stats_handler(
    Extension(audit): Extension<AuditRecorder>,
    query: Result<Query<AuditQuery>, QueryRejection>,
) -> ApiResult<Json<ApiEnvelope<ViolationStats>>> {
    let stats = audit.violation_stats(&audit_query(query)?).await?;
    Ok(Json(ApiEnvelope::ok(stats)))
}

async fn session_stats_handler(
    Extension(audit): Extension<AuditRecorder>,
    query: Result<Query<AuditQuery>, QueryRejection>,
) -> ApiResult<Json<ApiEnvelope<SessionStats>>> {
    let stats = audit.session_stats(&audit_query(query)?).await?;
    Ok(Json(ApiEnvelope::ok(stats)))
}
