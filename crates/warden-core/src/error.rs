//! Error Types
//!
//! `WardenError` is the one taxonomy the HTTP boundary knows how to format.
//! Every crate-local error converts into it; nothing deeper in the stack
//! builds wire-shaped errors by hand.
//!
//! ```
//! use warden_core::WardenError;
//!
//! let err = WardenError::validation("email", "Invalid email format");
//! assert_eq!(err.status_code(), 400);
//! assert_eq!(err.error_code(), "validation_error");
//! ```

use serde::Serialize;
use std::fmt::Display;
use thiserror::Error;

/// Standardized error type for warden.
#[derive(Debug, Clone, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WardenError {
    /// Bad input shape or format. Maps to HTTP 400.
    #[error("Validation error on field '{field}': {message}")]
    Validation {
        /// The field that failed validation
        field: String,
        /// Description of the validation failure
        message: String,
    },

    /// Well-formed input that breaks a business rule. Maps to HTTP 422.
    #[error("Unprocessable: {message}")]
    Unprocessable { message: String },

    /// Missing, invalid or expired credential, or inactive user. Maps to HTTP 401.
    #[error("Authentication failed: {reason}")]
    Authentication { reason: String },

    /// Valid identity without the required grant. Maps to HTTP 403.
    #[error("Access denied: {reason}")]
    Authorization { reason: String },

    /// Maps to HTTP 404.
    #[error("{resource} not found{}", id.as_ref().map(|i| format!(": {i}")).unwrap_or_default())]
    NotFound {
        resource: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// Duplicate unique key. Maps to HTTP 409.
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Maps to HTTP 429.
    #[error("Too many requests")]
    RateLimited {
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after_secs: Option<u64>,
    },

    /// A downstream service failed. Maps to HTTP 502.
    #[error("External service error: {message}")]
    ExternalService { message: String },

    /// The persistence layer failed. Maps to HTTP 500.
    #[error("Database error: {message}")]
    Database { message: String },

    /// Anything unexpected. Maps to HTTP 500.
    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl WardenError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn authentication(reason: impl Into<String>) -> Self {
        Self::Authentication {
            reason: reason.into(),
        }
    }

    pub fn authorization(reason: impl Into<String>) -> Self {
        Self::Authorization {
            reason: reason.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>, id: impl Display) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: Some(id.to_string()),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::Unprocessable { .. } => 422,
            Self::Authentication { .. } => 401,
            Self::Authorization { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 409,
            Self::RateLimited { .. } => 429,
            Self::ExternalService { .. } => 502,
            Self::Database { .. } | Self::Internal { .. } => 500,
        }
    }

    /// Stable machine-readable code used in the envelope's `error` field.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::Unprocessable { .. } => "unprocessable_entity",
            Self::Authentication { .. } => "authentication_error",
            Self::Authorization { .. } => "authorization_error",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::RateLimited { .. } => "rate_limited",
            Self::ExternalService { .. } => "external_service_error",
            Self::Database { .. } => "database_error",
            Self::Internal { .. } => "internal_server_error",
        }
    }

    /// Server faults. Their detail is logged but never sent to the client.
    #[must_use]
    pub fn is_server_fault(&self) -> bool {
        self.status_code() >= 500
    }

    /// Message that is safe to put on the wire.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Database { .. } | Self::Internal { .. } => "Internal server error".to_string(),
            Self::ExternalService { .. } => "Upstream service unavailable".to_string(),
            Self::Authentication { reason } | Self::Authorization { reason } => reason.clone(),
            other => other.to_string(),
        }
    }
}

/// Type alias for Results using `WardenError`.
pub type Result<T> = std::result::Result<T, WardenError>;
