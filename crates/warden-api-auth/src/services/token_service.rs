//! Access/refresh token pairs and server-side refresh token records.
//!
//! Refresh tokens are signed JWTs, but a token is only honoured while its
//! SHA-256 hash has a live, unrevoked record. Rotation revokes the presented
//! token and issues a new pair.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use warden_auth::{TokenClaims, TokenCodec};
use warden_core::UserId;
use warden_db::models::{NewRefreshToken, RefreshTokenRecord, User};
use warden_db::RefreshTokenRepository;

use crate::error::{ApiAuthError, ApiResult};

/// Hex SHA-256 of a token; the only form persisted.
#[must_use]
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[must_use]
pub fn verify_token_hash_constant_time(provided_token: &str, stored_hash: &str) -> bool {
    hash_token(provided_token)
        .as_bytes()
        .ct_eq(stored_hash.as_bytes())
        .into()
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Why a refresh token was not accepted. All map to 401 on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshRejection {
    Invalid,
    Expired,
    Revoked,
    Unknown,
}

impl RefreshRejection {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RefreshRejection::Invalid => "invalid_token",
            RefreshRejection::Expired => "token_expired",
            RefreshRejection::Revoked => "token_revoked",
            RefreshRejection::Unknown => "unknown_token",
        }
    }
}

impl From<RefreshRejection> for ApiAuthError {
    fn from(_: RefreshRejection) -> Self {
        ApiAuthError::Unauthorized("Invalid or expired refresh token".to_string())
    }
}

/// A refresh token that passed every check.
#[derive(Debug, Clone)]
pub struct RedeemedToken {
    pub record: RefreshTokenRecord,
    pub claims: TokenClaims,
}

#[derive(Clone)]
pub struct TokenService {
    codec: Arc<TokenCodec>,
    store: Arc<dyn RefreshTokenRepository>,
}

impl TokenService {
    pub fn new(codec: Arc<TokenCodec>, store: Arc<dyn RefreshTokenRepository>) -> Self {
        Self { codec, store }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Issue an access + refresh pair and record the refresh token.
    pub async fn issue_pair(&self, user: &User) -> ApiResult<TokenPair> {
        let access_token = self.codec.issue_access(user.id, &user.email)?;
        let refresh_token = self.codec.issue_refresh(user.id, &user.email)?;
        let refresh_ttl = chrono::Duration::from_std(self.codec.refresh_ttl())
            .map_err(|e| ApiAuthError::Internal(format!("refresh ttl out of range: {e}")))?;
        let refresh_expires_at = Utc::now() + refresh_ttl;

        self.store
            .insert_refresh_token(NewRefreshToken {
                user_id: user.id,
                token_hash: hash_token(&refresh_token),
                expires_at: refresh_expires_at,
            })
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.codec.access_ttl().as_secs(),
            refresh_expires_at,
        })
    }

    /// Check signature, expiry and the server-side record.
    ///
    /// An expired token that still has a live record is revoked here.
    pub async fn redeem(&self, token: &str) -> ApiResult<Result<RedeemedToken, RefreshRejection>> {
        let claims = match self.codec.verify_refresh(token) {
            Ok(claims) => claims,
            Err(e) if e.is_expired() => {
                self.revoke_if_live(token).await?;
                return Ok(Err(RefreshRejection::Expired));
            }
            Err(_) => return Ok(Err(RefreshRejection::Invalid)),
        };

        let Some(record) = self.store.find_refresh_token_by_hash(&hash_token(token)).await? else {
            return Ok(Err(RefreshRejection::Unknown));
        };
        if !verify_token_hash_constant_time(token, &record.token_hash)
            || claims.user_id() != Some(record.user_id)
        {
            return Ok(Err(RefreshRejection::Invalid));
        }
        if record.is_revoked() {
            tracing::warn!(
                user_id = %record.user_id,
                "Revoked refresh token presented"
            );
            return Ok(Err(RefreshRejection::Revoked));
        }
        let now = Utc::now();
        if record.is_expired_at(now) {
            self.store.revoke_refresh_token(record.id, now).await?;
            return Ok(Err(RefreshRejection::Expired));
        }

        Ok(Ok(RedeemedToken { record, claims }))
    }

    /// Revoke one token. Returns its owner when something was revoked.
    pub async fn revoke(&self, token: &str) -> ApiResult<Option<UserId>> {
        self.revoke_if_live(token).await
    }

    pub async fn revoke_record(&self, record: &RefreshTokenRecord) -> ApiResult<bool> {
        Ok(self.store.revoke_refresh_token(record.id, Utc::now()).await?)
    }

    pub async fn revoke_all(&self, user_id: UserId) -> ApiResult<u64> {
        Ok(self
            .store
            .revoke_user_refresh_tokens(user_id, Utc::now())
            .await?)
    }

    async fn revoke_if_live(&self, token: &str) -> ApiResult<Option<UserId>> {
        let Some(record) = self.store.find_refresh_token_by_hash(&hash_token(token)).await? else {
            return Ok(None);
        };
        if record.is_revoked() {
            return Ok(None);
        }
        let revoked = self.store.revoke_refresh_token(record.id, Utc::now()).await?;
        Ok(revoked.then_some(record.user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_auth::{TokenConfig, TokenKind};
    use warden_db::models::{Department, NewUser, Region};
    use warden_db::{InMemoryStore, UserRepository};

    fn codec() -> Arc<TokenCodec> {
        Arc::new(TokenCodec::new(TokenConfig::new(
            b"token-service-access-secret-0123456789ab".to_vec(),
            b"token-service-refresh-secret-0123456789a".to_vec(),
        )))
    }

    async fn setup() -> (TokenService, Arc<InMemoryStore>, User) {
        let store = Arc::new(InMemoryStore::new());
        let user = store
            .create_user(NewUser {
                email: "tok@example.com".into(),
                name: "Tok".into(),
                password_hash: "x".into(),
                department: Department::It,
                region: Region::North,
                level: 1,
                custom_attributes: serde_json::json!({}),
            })
            .await
            .unwrap();
        (TokenService::new(codec(), store.clone()), store, user)
    }

    #[test]
    fn test_hash_token_is_hex_sha256() {
        let hash = hash_token("abc");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(verify_token_hash_constant_time("abc", &hash));
        assert!(!verify_token_hash_constant_time("abd", &hash));
    }

    #[tokio::test]
    async fn test_issued_refresh_token_redeems_once_revoked_fails() {
        let (service, _, user) = setup().await;
        let pair = service.issue_pair(&user).await.unwrap();
        assert_eq!(pair.expires_in, 900);

        let redeemed = service.redeem(&pair.refresh_token).await.unwrap().unwrap();
        assert_eq!(redeemed.record.user_id, user.id);

        assert_eq!(service.revoke(&pair.refresh_token).await.unwrap(), Some(user.id));
        assert_eq!(
            service.redeem(&pair.refresh_token).await.unwrap().unwrap_err(),
            RefreshRejection::Revoked
        );
        assert_eq!(service.revoke(&pair.refresh_token).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_access_token_is_not_a_refresh_token() {
        let (service, _, user) = setup().await;
        let pair = service.issue_pair(&user).await.unwrap();
        assert_eq!(
            service.redeem(&pair.access_token).await.unwrap().unwrap_err(),
            RefreshRejection::Invalid
        );
    }

    #[tokio::test]
    async fn test_unrecorded_token_is_unknown() {
        let (service, _, user) = setup().await;
        let stray = service.codec().issue_refresh(user.id, &user.email).unwrap();
        assert_eq!(
            service.redeem(&stray).await.unwrap().unwrap_err(),
            RefreshRejection::Unknown
        );
    }

    #[tokio::test]
    async fn test_expired_token_is_revoked_on_discovery() {
        let (service, store, user) = setup().await;
        let old = service
            .codec()
            .issue_kind(user.id, &user.email, TokenKind::Refresh, Utc::now().timestamp() - 8 * 86_400)
            .unwrap();
        store
            .insert_refresh_token(NewRefreshToken {
                user_id: user.id,
                token_hash: hash_token(&old),
                expires_at: Utc::now() - chrono::Duration::days(1),
            })
            .await
            .unwrap();

        assert_eq!(
            service.redeem(&old).await.unwrap().unwrap_err(),
            RefreshRejection::Expired
        );
        let record = store
            .find_refresh_token_by_hash(&hash_token(&old))
            .await
            .unwrap()
            .unwrap();
        assert!(record.is_revoked());
    }

    #[tokio::test]
    async fn test_revoke_all() {
        let (service, _, user) = setup().await;
        let a = service.issue_pair(&user).await.unwrap();
        let b = service.issue_pair(&user).await.unwrap();
        assert_eq!(service.revoke_all(user.id).await.unwrap(), 2);
        for pair in [a, b] {
            assert!(service.redeem(&pair.refresh_token).await.unwrap().is_err());
        }
    }
}
