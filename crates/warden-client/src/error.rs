//! Client error type.
//!
//! Errors are `Clone` so one refresh outcome can be handed to every waiter.

use thiserror::Error;
use warden_core::WardenError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("Not signed in")]
    NotAuthenticated,

    /// The refresh token was rejected. Stored credentials have been deleted
    /// and the user must sign in again.
    #[error("Session expired; please sign in again")]
    SessionExpired,

    /// The server answered the refresh with a non-success status.
    #[error("Refresh rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error("Credential storage error: {0}")]
    CredentialStorage(String),

    /// The task performing the shared refresh ended without an outcome.
    #[error("Token refresh aborted")]
    RefreshAborted,
}

impl ClientError {
    /// Whether the server refused the refresh token itself. Throttling,
    /// timeouts and server faults leave the session intact.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, ClientError::Rejected { status: 400 | 401 | 403, .. })
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::InvalidResponse(e.to_string())
        } else {
            ClientError::Network(e.to_string())
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::CredentialStorage(e.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::CredentialStorage(format!("Invalid credential data: {e}"))
    }
}

impl From<ClientError> for WardenError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::NotAuthenticated | ClientError::SessionExpired => {
                WardenError::authentication(err.to_string())
            }
            ClientError::Rejected { .. } | ClientError::Network(_) | ClientError::InvalidResponse(_) => {
                WardenError::ExternalService {
                    message: err.to_string(),
                }
            }
            ClientError::CredentialStorage(_) | ClientError::RefreshAborted => {
                WardenError::internal(err.to_string())
            }
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
