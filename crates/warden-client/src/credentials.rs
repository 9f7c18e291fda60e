//! Token material held by a client.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token expiry.
    pub expires_at: DateTime<Utc>,
    /// Always "Bearer".
    pub token_type: String,
}

impl Credentials {
    /// `expires_in` seconds from now, clamped to the representable range.
    pub fn new(access_token: String, refresh_token: String, expires_in: i64) -> Self {
        let expires_at = expiry_after(expires_in).unwrap_or(if expires_in < 0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        });
        Self {
            access_token,
            refresh_token,
            expires_at,
            token_type: "Bearer".to_string(),
        }
    }

    /// Like [`Credentials::new`] for a lifetime reported by a server: a
    /// non-positive or out-of-range `expires_in` is an invalid response.
    pub fn try_new(access_token: String, refresh_token: String, expires_in: i64) -> ClientResult<Self> {
        if expires_in <= 0 {
            return Err(ClientError::InvalidResponse(format!(
                "expires_in must be positive, got {expires_in}"
            )));
        }
        let expires_at = expiry_after(expires_in).ok_or_else(|| {
            ClientError::InvalidResponse(format!("expires_in out of range: {expires_in}"))
        })?;
        Ok(Self {
            access_token,
            refresh_token,
            expires_at,
            token_type: "Bearer".to_string(),
        })
    }

    /// Build from a token pair, reading the expiry from the access token's
    /// own `exp` claim. The token is not verified.
    pub fn from_tokens(access_token: String, refresh_token: String) -> ClientResult<Self> {
        let claims = warden_auth::decode_unsafe(&access_token)
            .ok_or_else(|| ClientError::InvalidResponse("access token is not a JWT".to_string()))?;
        let expires_at = DateTime::from_timestamp(claims.exp, 0).ok_or_else(|| {
            ClientError::InvalidResponse("access token expiry out of range".to_string())
        })?;
        Ok(Self {
            access_token,
            refresh_token,
            expires_at,
            token_type: "Bearer".to_string(),
        })
    }

    /// Expired once the expiry instant has passed.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    #[must_use]
    pub fn expires_within(&self, threshold: Duration) -> bool {
        Utc::now()
            .checked_add_signed(threshold)
            .is_none_or(|at| self.is_expired_at(at))
    }

    /// Time until expiry, zero when already expired.
    #[must_use]
    pub fn remaining(&self) -> std::time::Duration {
        (self.expires_at - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
    }
}

fn expiry_after(seconds: i64) -> Option<DateTime<Utc>> {
    Utc::now().checked_add_signed(Duration::try_seconds(seconds)?)
}
