//! Token claims.
//!
//! Access and refresh tokens share one claim layout; `typ` tells them apart so
//! a refresh token can never be replayed as an access token.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_core::UserId;

/// What a token may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// Claims embedded in every warden token.
///
/// - `sub`: user ID rendered as a decimal string
/// - `email`: the user's email at issuance time
/// - `iat` / `exp`: Unix seconds
/// - `jti`: unique token ID
/// - `typ`: access or refresh
///
/// # Example
///
/// ```rust
/// use warden_auth::{TokenClaims, TokenKind};
/// use warden_core::UserId;
///
/// let claims = TokenClaims::builder()
///     .user_id(UserId::new(42))
///     .email("grace@example.com")
///     .kind(TokenKind::Refresh)
///     .issued_at(1_700_000_000)
///     .build();
///
/// assert_eq!(claims.sub, "42");
/// assert_eq!(claims.iat, 1_700_000_000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    pub sub: String,
    pub email: String,
    pub iat: i64,
    /// Set by [`crate::issue`] from `iat + ttl`.
    pub exp: i64,
    pub jti: String,
    pub typ: TokenKind,
}

impl TokenClaims {
    #[must_use]
    pub fn builder() -> TokenClaimsBuilder {
        TokenClaimsBuilder::default()
    }

    /// The subject parsed as a user ID. `None` when `sub` is not an integer.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.sub.parse().ok()
    }

    /// `exp < now`, strictly.
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.exp < now
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp())
    }
}

/// Builder for [`TokenClaims`].
#[derive(Debug, Default)]
pub struct TokenClaimsBuilder {
    sub: Option<String>,
    email: Option<String>,
    iat: Option<i64>,
    jti: Option<String>,
    typ: Option<TokenKind>,
}

impl TokenClaimsBuilder {
    #[must_use]
    pub fn user_id(mut self, id: UserId) -> Self {
        self.sub = Some(id.to_string());
        self
    }

    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Override the issue instant (defaults to now).
    #[must_use]
    pub fn issued_at(mut self, iat: i64) -> Self {
        self.iat = Some(iat);
        self
    }

    /// Override the token ID (defaults to a random UUID).
    #[must_use]
    pub fn jti(mut self, jti: impl Into<String>) -> Self {
        self.jti = Some(jti.into());
        self
    }

    #[must_use]
    pub fn kind(mut self, kind: TokenKind) -> Self {
        self.typ = Some(kind);
        self
    }

    #[must_use]
    pub fn build(self) -> TokenClaims {
        let iat = self.iat.unwrap_or_else(|| Utc::now().timestamp());
        TokenClaims {
            sub: self.sub.unwrap_or_default(),
            email: self.email.unwrap_or_default(),
            iat,
            exp: iat,
            jti: self.jti.unwrap_or_else(|| Uuid::new_v4().to_string()),
            typ: self.typ.unwrap_or(TokenKind::Access),
        }
    }
}
