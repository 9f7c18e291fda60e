//! API error type and the single boundary formatter.
//!
//! Every handler error funnels through [`ApiAuthError`] →
//! [`WardenError`] → the `{success:false, message, error}` envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use warden_auth::AuthError;
use warden_authorization::AuthorizationError;
use warden_core::{ApiEnvelope, WardenError};
use warden_db::DbError;

#[derive(Debug, thiserror::Error)]
pub enum ApiAuthError {
    #[error("Validation error on field '{field}': {message}")]
    Validation { field: String, message: String },

    /// Login failure. Never says which of email or password was wrong.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Token(#[from] AuthError),

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiAuthError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<ApiAuthError> for WardenError {
    fn from(err: ApiAuthError) -> Self {
        match err {
            ApiAuthError::Validation { field, message } => WardenError::validation(field, message),
            ApiAuthError::InvalidCredentials => WardenError::authentication("Invalid credentials"),
            ApiAuthError::Unauthorized(reason) => WardenError::authentication(reason),
            ApiAuthError::Forbidden(reason) => WardenError::authorization(reason),
            ApiAuthError::Conflict(msg) => WardenError::conflict(msg),
            ApiAuthError::NotFound(what) => WardenError::NotFound {
                resource: what,
                id: None,
            },
            ApiAuthError::Token(e) => e.into(),
            ApiAuthError::Authorization(e) => e.into(),
            ApiAuthError::Database(e) => e.into(),
            ApiAuthError::Internal(msg) => WardenError::internal(msg),
        }
    }
}

/// Attached to error responses so the logging layer can report them with
/// request context.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub code: &'static str,
    pub detail: String,
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        let detail = self.to_string();
        error_response(&WardenError::from(self), detail)
    }
}

/// Format any taxonomy error as an envelope response.
pub fn error_response(err: &WardenError, detail: String) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, Json(ApiEnvelope::from_error(err))).into_response();
    response.extensions_mut().insert(ErrorReport {
        code: err.error_code(),
        detail,
    });
    response
}

pub type ApiResult<T> = Result<T, ApiAuthError>;
