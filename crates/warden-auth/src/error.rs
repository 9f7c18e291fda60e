//! Error types for token and password operations.

use thiserror::Error;
use warden_core::WardenError;

/// Authentication error types.
///
/// The three token variants are the verification failures callers branch on.
/// Everything else is an operational fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Token cannot be parsed, or its claims are structurally wrong.
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// Token signature does not match the secret.
    #[error("Invalid token signature")]
    SignatureInvalid,

    /// `exp` is strictly before the verification instant.
    #[error("Token has expired")]
    Expired,

    /// An access token was presented where a refresh token was expected, or vice versa.
    #[error("Unexpected token type: expected {expected}")]
    WrongKind { expected: &'static str },

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Password hashing failed: {0}")]
    HashingFailed(String),

    #[error("Invalid password hash format")]
    InvalidHashFormat,
}

impl AuthError {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        matches!(self, AuthError::Expired)
    }

    #[must_use]
    pub fn is_signature_invalid(&self) -> bool {
        matches!(self, AuthError::SignatureInvalid)
    }

    /// Check if this error is a token verification failure (as opposed to an
    /// operational fault such as a bad key).
    #[must_use]
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            AuthError::Malformed(_)
                | AuthError::SignatureInvalid
                | AuthError::Expired
                | AuthError::WrongKind { .. }
        )
    }

    /// Short tag used in audit reasons and logs.
    #[must_use]
    pub fn reason_tag(&self) -> &'static str {
        match self {
            AuthError::Malformed(_) | AuthError::WrongKind { .. } => "malformed",
            AuthError::SignatureInvalid => "signature_invalid",
            AuthError::Expired => "expired",
            AuthError::InvalidKey(_) => "invalid_key",
            AuthError::HashingFailed(_) | AuthError::InvalidHashFormat => "hashing_failed",
        }
    }
}

impl From<AuthError> for WardenError {
    fn from(err: AuthError) -> Self {
        if err.is_verification_failure() {
            WardenError::authentication("Invalid or expired token")
        } else {
            WardenError::internal(err.to_string())
        }
    }
}
