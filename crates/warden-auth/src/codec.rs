//! Configured token codec: secrets and lifetimes bundled for services.

use crate::claims::{TokenClaims, TokenKind};
use crate::error::AuthError;
use crate::jwt;
use chrono::Utc;
use std::fmt;
use std::time::Duration;
use warden_core::UserId;

/// Default access token lifetime (15 minutes).
pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(15 * 60);

/// Default refresh token lifetime (7 days).
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Clone)]
pub struct TokenConfig {
    pub access_secret: Vec<u8>,
    pub refresh_secret: Vec<u8>,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl TokenConfig {
    pub fn new(access_secret: impl Into<Vec<u8>>, refresh_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_ttl: DEFAULT_ACCESS_TTL,
            refresh_ttl: DEFAULT_REFRESH_TTL,
        }
    }
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_secret", &"[REDACTED]")
            .field("refresh_secret", &"[REDACTED]")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

/// Issues and verifies access and refresh tokens with separate secrets.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    config: TokenConfig,
}

impl TokenCodec {
    #[must_use]
    pub fn new(config: TokenConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        self.config.access_ttl
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        self.config.refresh_ttl
    }

    pub fn issue_access(&self, user_id: UserId, email: &str) -> Result<String, AuthError> {
        self.issue_kind(user_id, email, TokenKind::Access, Utc::now().timestamp())
    }

    pub fn issue_refresh(&self, user_id: UserId, email: &str) -> Result<String, AuthError> {
        self.issue_kind(user_id, email, TokenKind::Refresh, Utc::now().timestamp())
    }

    /// Issue a token of `kind` as if at `iat`.
    pub fn issue_kind(
        &self,
        user_id: UserId,
        email: &str,
        kind: TokenKind,
        iat: i64,
    ) -> Result<String, AuthError> {
        let claims = TokenClaims::builder()
            .user_id(user_id)
            .email(email)
            .kind(kind)
            .issued_at(iat)
            .build();
        let (secret, ttl) = self.material(kind);
        jwt::issue(&claims, secret, ttl)
    }

    pub fn verify_access(&self, token: &str) -> Result<TokenClaims, AuthError> {
        self.verify_kind_at(token, TokenKind::Access, Utc::now().timestamp())
    }

    pub fn verify_refresh(&self, token: &str) -> Result<TokenClaims, AuthError> {
        self.verify_kind_at(token, TokenKind::Refresh, Utc::now().timestamp())
    }

    pub fn verify_kind_at(
        &self,
        token: &str,
        kind: TokenKind,
        now: i64,
    ) -> Result<TokenClaims, AuthError> {
        let (secret, _) = self.material(kind);
        let claims = jwt::verify_at(token, secret, now)?;
        if claims.typ != kind {
            return Err(AuthError::WrongKind {
                expected: kind.as_str(),
            });
        }
        if claims.user_id().is_none() {
            return Err(AuthError::Malformed("subject is not a user id".to_string()));
        }
        Ok(claims)
    }

    fn material(&self, kind: TokenKind) -> (&[u8], Duration) {
        match kind {
            TokenKind::Access => (&self.config.access_secret, self.config.access_ttl),
            TokenKind::Refresh => (&self.config.refresh_secret, self.config.refresh_ttl),
        }
    }
}
