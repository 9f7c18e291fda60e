//! Signed token encoding, verification and unverified introspection.
//!
//! Tokens are HS256 JWTs. Expiry is checked by hand after signature
//! verification so that the rule is exactly `exp < now` with no leeway, and
//! so that tests can verify at an arbitrary instant.

use crate::claims::TokenClaims;
use crate::error::AuthError;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::time::Duration;

const ALGORITHM: Algorithm = Algorithm::HS256;

/// Sign `claims` with `secret`, stamping `exp = iat + ttl`.
///
/// # Errors
///
/// - `AuthError::InvalidKey` if the secret is empty
/// - `AuthError::Malformed` if the claims cannot be serialized
pub fn issue(claims: &TokenClaims, secret: &[u8], ttl: Duration) -> Result<String, AuthError> {
    if secret.is_empty() {
        return Err(AuthError::InvalidKey("signing secret is empty".to_string()));
    }

    let ttl_secs = i64::try_from(ttl.as_secs())
        .map_err(|_| AuthError::Malformed("ttl out of range".to_string()))?;
    let stamped = TokenClaims {
        exp: claims.iat.saturating_add(ttl_secs),
        ..claims.clone()
    };

    encode(
        &Header::new(ALGORITHM),
        &stamped,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| AuthError::Malformed(format!("Encoding failed: {e}")))
}

/// Verify signature and expiry against the current time.
///
/// # Errors
///
/// - `AuthError::Malformed` - not a JWT, bad base64/JSON, missing claims
/// - `AuthError::SignatureInvalid` - signature or algorithm mismatch
/// - `AuthError::Expired` - `exp < now`
pub fn verify(token: &str, secret: &[u8]) -> Result<TokenClaims, AuthError> {
    verify_at(token, secret, Utc::now().timestamp())
}

/// [`verify`] at an explicit Unix-seconds instant.
pub fn verify_at(token: &str, secret: &[u8], now: i64) -> Result<TokenClaims, AuthError> {
    if secret.is_empty() {
        return Err(AuthError::InvalidKey("verification secret is empty".to_string()));
    }

    let mut validation = Validation::new(ALGORITHM);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.set_required_spec_claims(&["exp", "sub"]);

    let data = decode::<TokenClaims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(map_jwt_error)?;

    if data.claims.is_expired_at(now) {
        return Err(AuthError::Expired);
    }

    Ok(data.claims)
}

/// Parse claims without checking the signature or expiry.
///
/// For display purposes only (countdowns, proactive refresh scheduling).
/// Never feed the result into an authorization decision.
#[must_use]
pub fn decode_unsafe(token: &str) -> Option<TokenClaims> {
    let mut validation = Validation::new(ALGORITHM);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .map(|data| data.claims)
}

/// Time left before `exp`, zero once expired, `None` if the token cannot be parsed.
#[must_use]
pub fn remaining_ttl(token: &str) -> Option<Duration> {
    remaining_ttl_at(token, Utc::now().timestamp())
}

#[must_use]
pub fn remaining_ttl_at(token: &str, now: i64) -> Option<Duration> {
    let claims = decode_unsafe(token)?;
    let secs = u64::try_from(claims.exp.saturating_sub(now)).unwrap_or(0);
    Some(Duration::from_secs(secs))
}

/// True when the token expires within `threshold`. Unparseable tokens count as expiring.
#[must_use]
pub fn will_expire_within(token: &str, threshold: Duration) -> bool {
    remaining_ttl(token).is_none_or(|left| left <= threshold)
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;

    match err.kind() {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => AuthError::SignatureInvalid,
        ErrorKind::InvalidToken => AuthError::Malformed("Malformed token".to_string()),
        ErrorKind::Base64(_) => AuthError::Malformed("Invalid base64 encoding".to_string()),
        ErrorKind::Json(_) => AuthError::Malformed("Invalid JSON in claims".to_string()),
        ErrorKind::Utf8(_) => AuthError::Malformed("Invalid UTF-8 in token".to_string()),
        ErrorKind::MissingRequiredClaim(claim) => {
            AuthError::Malformed(format!("Missing required claim: {claim}"))
        }
        _ => AuthError::Malformed(format!("Token validation failed: {err}")),
    }
}
