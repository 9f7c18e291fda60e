//! Extractor for routes that need an authenticated caller but no feature
//! permission (`/auth/me`, `/auth/change-password`).

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::Response;
use warden_authorization::IdentityResolver;
use warden_core::WardenError;
use warden_db::models::User;

use crate::error::error_response;

#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(resolver) = parts.extensions.get::<Arc<IdentityResolver>>().cloned() else {
            tracing::error!("IdentityResolver missing from request extensions");
            return Err(error_response(
                &WardenError::internal("identity resolver not configured"),
                "identity resolver not configured".to_string(),
            ));
        };

        resolver
            .resolve(&parts.headers)
            .await
            .map(CurrentUser)
            .map_err(|denial| error_response(&WardenError::from(&denial), denial.reason))
    }
}
