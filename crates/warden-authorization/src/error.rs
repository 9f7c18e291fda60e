//! Error types for the authorization engine.
//!
//! Denials are not errors: they are returned as [`crate::Decision::Deny`].
//! These variants cover administration failures and faults while reading
//! authorization data.

use thiserror::Error;
use warden_core::WardenError;
use warden_db::DbError;

#[derive(Debug, Error)]
pub enum AuthorizationError {
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error on field '{field}': {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// A stored policy rule cannot be interpreted.
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("Repository error: {0}")]
    Repository(#[from] DbError),
}

impl AuthorizationError {
    pub(crate) fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

impl From<AuthorizationError> for WardenError {
    fn from(err: AuthorizationError) -> Self {
        match err {
            AuthorizationError::NotFound { resource, id } => WardenError::not_found(resource, id),
            AuthorizationError::Conflict(msg) => WardenError::conflict(msg),
            AuthorizationError::Validation { field, message } => {
                WardenError::validation(field, message)
            }
            AuthorizationError::InvalidPolicy(msg) => WardenError::validation("value", msg),
            AuthorizationError::Repository(db) => db.into(),
        }
    }
}

/// Convenience Result type for the authorization engine.
pub type Result<T> = std::result::Result<T, AuthorizationError>;
