//! Identity resolution: who is making this request.
//!
//! Trusted `x-user-*` headers are honoured only when explicitly enabled, and
//! only for requests that passed through a layer which verified the token.
//! Otherwise the access token is read from `Authorization: Bearer` or the
//! `accessToken` cookie and verified here. The stored `is_active` flag is
//! re-checked on every request.

use std::sync::Arc;

use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::HeaderMap;
use warden_auth::TokenCodec;
use warden_core::UserId;
use warden_db::models::User;
use warden_db::UserRepository;

use crate::types::{Denial, DenialKind};

pub const HEADER_USER_ID: &str = "x-user-id";
pub const HEADER_USER_EMAIL: &str = "x-user-email";
pub const HEADER_USER_NAME: &str = "x-user-name";
pub const HEADER_USER_ACTIVE: &str = "x-user-active";

/// Every propagated identity header.
pub const IDENTITY_HEADERS: [&str; 4] = [
    HEADER_USER_ID,
    HEADER_USER_EMAIL,
    HEADER_USER_NAME,
    HEADER_USER_ACTIVE,
];

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";

/// Bearer token from the `Authorization` header. The scheme is case-insensitive.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Value of the named cookie across all `Cookie` headers.
#[must_use]
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

#[derive(Clone)]
pub struct IdentityResolver {
    codec: Arc<TokenCodec>,
    users: Arc<dyn UserRepository>,
    trust_headers: bool,
}

impl IdentityResolver {
    pub fn new(codec: Arc<TokenCodec>, users: Arc<dyn UserRepository>, trust_headers: bool) -> Self {
        Self {
            codec,
            users,
            trust_headers,
        }
    }

    /// Resolve the caller, or the 401-class denial explaining why not.
    pub async fn resolve(&self, headers: &HeaderMap) -> Result<User, Denial> {
        if self.trust_headers {
            if let Some(user_id) = trusted_user_id(headers) {
                let claimed_active = header_str(headers, HEADER_USER_ACTIVE)
                    .is_none_or(|v| !v.eq_ignore_ascii_case("false"));
                if !claimed_active {
                    return Err(Denial::new(DenialKind::InactiveUser, "user is inactive"));
                }
                return self.load_active(user_id).await;
            }
        }

        let token = bearer_token(headers)
            .or_else(|| cookie_value(headers, ACCESS_TOKEN_COOKIE))
            .ok_or_else(|| Denial::new(DenialKind::NoToken, "no token"))?;

        let claims = self.codec.verify_access(token).map_err(|e| {
            tracing::debug!(target: "authorization", reason = e.reason_tag(), "Token rejected");
            Denial::new(
                DenialKind::InvalidToken,
                format!("invalid token: {}", e.reason_tag()),
            )
        })?;

        let user_id = claims
            .user_id()
            .ok_or_else(|| Denial::new(DenialKind::InvalidToken, "invalid token: subject"))?;
        self.load_active(user_id).await
    }

    async fn load_active(&self, user_id: UserId) -> Result<User, Denial> {
        let user = match self.users.find_user_by_id(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                return Err(Denial::new(
                    DenialKind::InvalidToken,
                    "invalid token: unknown user",
                ))
            }
            Err(e) => {
                tracing::error!(
                    target: "authorization",
                    error = %e,
                    user_id = %user_id,
                    "User lookup failed, denying"
                );
                return Err(Denial::new(DenialKind::Internal, "identity lookup failed"));
            }
        };

        if !user.is_active {
            tracing::info!(target: "authorization", user_id = %user_id, "Inactive user rejected");
            return Err(Denial::new(DenialKind::InactiveUser, "user is inactive"));
        }
        Ok(user)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn trusted_user_id(headers: &HeaderMap) -> Option<UserId> {
    header_str(headers, HEADER_USER_ID)?.trim().parse().ok()
}
