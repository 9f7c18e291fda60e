//! Credential lifecycle: registration, login, logout, refresh rotation and
//! password changes.
//!
//! Login failures are always reported as [`ApiAuthError::InvalidCredentials`];
//! the precise reason only reaches the session log.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde_json::json;
use warden_auth::{PasswordHasher, TokenCodec};
use warden_authorization::AuditRecorder;
use warden_core::{UserId, WardenError};
use warden_db::models::{
    ChangeAction, NewChangeHistory, NewSessionLog, NewUser, Role, SessionAction, User,
    UserProfile,
};
use warden_db::{RefreshTokenRepository, Repository};

use crate::error::{ApiAuthError, ApiResult};
use crate::models::{
    validate_request, BulkFailure, BulkRegisterRequest, BulkRegisterResult,
    ChangePasswordRequest, LoginRequest, MeResponse, RegisterRequest, TokenResponse,
};
use crate::services::token_service::{RedeemedToken, RefreshRejection, TokenPair, TokenService};
use crate::services::validation::{
    normalize_email, validate_email, validate_name, validate_password_for,
    PasswordValidationError, PasswordValidationResult, PersonalInfo,
};

pub const DEFAULT_ROLE: &str = "USER";
pub const DEFAULT_BULK_MAX: usize = 100;
pub const DEFAULT_BULK_CHUNK_SIZE: usize = 5;
pub const DEFAULT_BULK_CHUNK_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Role assigned when a registration names none.
    pub default_role: String,
    pub bulk_max: usize,
    pub bulk_chunk_size: usize,
    pub bulk_chunk_delay: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            default_role: DEFAULT_ROLE.to_string(),
            bulk_max: DEFAULT_BULK_MAX,
            bulk_chunk_size: DEFAULT_BULK_CHUNK_SIZE,
            bulk_chunk_delay: DEFAULT_BULK_CHUNK_DELAY,
        }
    }
}

/// Client details recorded on session log entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Clone)]
pub struct CredentialLifecycleService {
    store: Arc<dyn Repository>,
    tokens: TokenService,
    audit: AuditRecorder,
    hasher: PasswordHasher,
    config: LifecycleConfig,
}

impl CredentialLifecycleService {
    pub fn new<S: Repository + 'static>(
        store: Arc<S>,
        codec: Arc<TokenCodec>,
        audit: AuditRecorder,
        config: LifecycleConfig,
    ) -> Self {
        let refresh_store: Arc<dyn RefreshTokenRepository> = store.clone();
        Self {
            store,
            tokens: TokenService::new(codec, refresh_store),
            audit,
            hasher: PasswordHasher::default(),
            config,
        }
    }

    #[must_use]
    pub fn with_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Register a user and assign the requested or default role.
    ///
    /// # Errors
    ///
    /// - `ApiAuthError::Validation` for malformed input, a rejected password
    ///   or an unknown role name
    /// - `ApiAuthError::Conflict` if the email is taken
    pub async fn register(&self, request: RegisterRequest) -> ApiResult<UserProfile> {
        validate_request(&request)?;
        validate_name(&request.name).map_err(|msg| ApiAuthError::validation("name", msg))?;
        validate_email(&request.email)
            .map_err(|e| ApiAuthError::validation("email", e.to_string()))?;

        let email = normalize_email(&request.email);
        let custom_attributes = match request.custom_attributes {
            None => json!({}),
            Some(value) if value.is_object() => value,
            Some(_) => {
                return Err(ApiAuthError::validation(
                    "custom_attributes",
                    "must be a JSON object",
                ))
            }
        };

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(ApiAuthError::Conflict("Email already registered".to_string()));
        }

        let info = PersonalInfo {
            name: &request.name,
            email: &email,
            department: request.department,
            region: request.region,
        };
        reject_invalid_password(&validate_password_for(&request.password, &info))?;

        let role = self.resolve_role(request.role.as_deref()).await?;
        let password_hash = self.hasher.hash(&request.password)?;

        let user = self
            .store
            .create_user_with_role(
                NewUser {
                    email,
                    name: request.name.trim().to_string(),
                    password_hash,
                    department: request.department,
                    region: request.region,
                    level: request.level,
                    custom_attributes,
                },
                role.map(|role| role.id),
            )
            .await?;

        let profile = user.profile();
        self.changed(
            None,
            user.id,
            ChangeAction::Create,
            None,
            serde_json::to_value(&profile).ok(),
        )
        .await;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(profile)
    }

    async fn resolve_role(&self, requested: Option<&str>) -> ApiResult<Option<Role>> {
        let name = requested.map_or(self.config.default_role.as_str(), str::trim);
        let role = self.store.find_role_by_name(name).await?;
        match (role, requested) {
            (Some(role), _) => Ok(Some(role)),
            (None, Some(_)) => Err(ApiAuthError::validation("role", "Unknown role")),
            (None, None) => {
                tracing::warn!(role = %name, "Default role does not exist; user left without roles");
                Ok(None)
            }
        }
    }

    /// Verify credentials and issue a token pair.
    pub async fn login(&self, request: LoginRequest, ctx: &SessionContext) -> ApiResult<TokenResponse> {
        validate_request(&request)?;
        let email = normalize_email(&request.email);

        let Some(user) = self.store.find_user_by_email(&email).await? else {
            tracing::debug!(email = %email, "Login attempt for unknown email");
            self.session(SessionAction::Login, None, Some(&email), Err("unknown_email"), ctx)
                .await;
            return Err(ApiAuthError::InvalidCredentials);
        };

        let matches = self
            .hasher
            .verify(&request.password, &user.password_hash)
            .map_err(|e| {
                tracing::error!(user_id = %user.id, error = %e, "Password verification error");
                ApiAuthError::Internal("password verification failed".to_string())
            })?;
        if !matches {
            tracing::debug!(user_id = %user.id, "Invalid password attempt");
            self.session(SessionAction::Login, Some(user.id), Some(&email), Err("invalid_password"), ctx)
                .await;
            return Err(ApiAuthError::InvalidCredentials);
        }

        if !user.is_active {
            tracing::warn!(user_id = %user.id, "Login attempt for inactive account");
            self.session(SessionAction::Login, Some(user.id), Some(&email), Err("inactive_user"), ctx)
                .await;
            return Err(ApiAuthError::InvalidCredentials);
        }

        let pair = self.tokens.issue_pair(&user).await?;
        self.session(SessionAction::Login, Some(user.id), Some(&email), Ok(()), ctx)
            .await;
        tracing::info!(user_id = %user.id, "User logged in");
        Ok(token_response(pair, &user))
    }

    /// Revoke a refresh token. Returns whether a live token was revoked.
    pub async fn logout(&self, refresh_token: &str, ctx: &SessionContext) -> ApiResult<bool> {
        match self.tokens.revoke(refresh_token).await? {
            Some(user_id) => {
                self.session(SessionAction::Logout, Some(user_id), None, Ok(()), ctx)
                    .await;
                tracing::info!(user_id = %user_id, "User logged out");
                Ok(true)
            }
            None => {
                self.session(SessionAction::Logout, None, None, Err("token_not_active"), ctx)
                    .await;
                Ok(false)
            }
        }
    }

    /// Rotate a refresh token: the presented token is revoked and a new pair issued.
    pub async fn refresh(&self, refresh_token: &str, ctx: &SessionContext) -> ApiResult<TokenResponse> {
        let redeemed = match self.tokens.redeem(refresh_token).await? {
            Ok(redeemed) => redeemed,
            Err(rejection) => {
                self.session(SessionAction::TokenRefresh, None, None, Err(rejection.as_str()), ctx)
                    .await;
                return Err(rejection.into());
            }
        };
        self.rotate(redeemed, ctx).await
    }

    /// Only the caller whose revoke flips the record gets a new pair; a
    /// concurrent redemption of the same token loses here.
    async fn rotate(&self, redeemed: RedeemedToken, ctx: &SessionContext) -> ApiResult<TokenResponse> {
        let user_id = redeemed.record.user_id;
        if !self.tokens.revoke_record(&redeemed.record).await? {
            tracing::warn!(user_id = %user_id, "Refresh token already rotated");
            let rejection = RefreshRejection::Revoked;
            self.session(SessionAction::TokenRefresh, Some(user_id), None, Err(rejection.as_str()), ctx)
                .await;
            return Err(rejection.into());
        }

        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .filter(|user| user.is_active);
        let Some(user) = user else {
            self.session(SessionAction::TokenRefresh, Some(user_id), None, Err("inactive_user"), ctx)
                .await;
            return Err(ApiAuthError::Unauthorized(
                "Invalid or expired refresh token".to_string(),
            ));
        };

        let pair = self.tokens.issue_pair(&user).await?;
        self.session(SessionAction::TokenRefresh, Some(user.id), Some(&user.email), Ok(()), ctx)
            .await;
        Ok(token_response(pair, &user))
    }

    /// Change the caller's own password. All refresh tokens are revoked.
    pub async fn change_password(
        &self,
        user_id: UserId,
        request: ChangePasswordRequest,
        ctx: &SessionContext,
    ) -> ApiResult<()> {
        validate_request(&request)?;
        let user = self.load_user(user_id).await?;

        let current_ok = self
            .hasher
            .verify(&request.current_password, &user.password_hash)?;
        if !current_ok {
            return Err(ApiAuthError::validation(
                "current_password",
                "Current password is incorrect",
            ));
        }
        if request.new_password == request.current_password {
            return Err(ApiAuthError::validation(
                "new_password",
                PasswordValidationError::SameAsCurrent.to_string(),
            ));
        }

        self.replace_password(&user, &request.new_password, Some(user_id), ctx)
            .await?;
        tracing::info!(user_id = %user_id, "Password changed");
        Ok(())
    }

    /// Administrative reset. Skips the current-password checks.
    pub async fn reset_password(
        &self,
        actor: UserId,
        user_id: UserId,
        new_password: &str,
    ) -> ApiResult<()> {
        let user = self.load_user(user_id).await?;
        self.replace_password(&user, new_password, Some(actor), &SessionContext::default())
            .await?;
        tracing::info!(user_id = %user_id, actor_id = %actor, "Password reset by administrator");
        Ok(())
    }

    async fn replace_password(
        &self,
        user: &User,
        new_password: &str,
        actor: Option<UserId>,
        ctx: &SessionContext,
    ) -> ApiResult<()> {
        let info = PersonalInfo {
            name: &user.name,
            email: &user.email,
            department: user.department,
            region: user.region,
        };
        reject_invalid_password(&validate_password_for(new_password, &info))?;

        let password_hash = self.hasher.hash(new_password)?;
        self.store
            .update_user_password(user.id, &password_hash)
            .await?;

        let revoked = self.tokens.revoke_all(user.id).await?;
        self.session(SessionAction::TokenRevoke, Some(user.id), Some(&user.email), Ok(()), ctx)
            .await;
        tracing::debug!(user_id = %user.id, revoked, "Refresh tokens revoked after password change");

        self.changed(
            actor,
            user.id,
            ChangeAction::Update,
            None,
            Some(json!({ "password": "changed" })),
        )
        .await;
        Ok(())
    }

    /// Register many users with per-item isolation.
    ///
    /// The batch is rejected as a whole when empty, oversized, or when it
    /// repeats an email.
    pub async fn bulk_register(&self, request: BulkRegisterRequest) -> ApiResult<BulkRegisterResult> {
        let items = request.users;
        if items.is_empty() {
            return Err(ApiAuthError::validation("users", "Batch must not be empty"));
        }
        if items.len() > self.config.bulk_max {
            return Err(ApiAuthError::validation(
                "users",
                format!("Batch exceeds the maximum of {} users", self.config.bulk_max),
            ));
        }

        let duplicates = duplicate_emails(&items);
        if !duplicates.is_empty() {
            return Err(ApiAuthError::validation(
                "users",
                format!(
                    "Duplicate emails in batch: {}",
                    duplicates.into_iter().collect::<Vec<_>>().join(", ")
                ),
            ));
        }

        let mut result = BulkRegisterResult::default();
        let indexed: Vec<(usize, RegisterRequest)> = items.into_iter().enumerate().collect();
        let chunk_size = self.config.bulk_chunk_size.max(1);

        for (n, chunk) in indexed.chunks(chunk_size).enumerate() {
            if n > 0 && !self.config.bulk_chunk_delay.is_zero() {
                tokio::time::sleep(self.config.bulk_chunk_delay).await;
            }

            let outcomes = join_all(chunk.iter().cloned().map(|(index, item)| async move {
                let email = item.email.clone();
                (index, email, self.register(item).await)
            }))
            .await;

            for (index, email, outcome) in outcomes {
                match outcome {
                    Ok(profile) => result.successful.push(profile),
                    Err(e) => result.failed.push(BulkFailure {
                        index,
                        email,
                        reason: bulk_failure_reason(e),
                    }),
                }
            }
        }

        tracing::info!(
            successful = result.successful.len(),
            failed = result.failed.len(),
            "Bulk registration finished"
        );
        Ok(result)
    }

    /// Profile and role names of an authenticated user.
    pub async fn me(&self, user_id: UserId) -> ApiResult<MeResponse> {
        let user = self.load_user(user_id).await?;
        let roles = self
            .store
            .find_roles_by_user_id(user_id)
            .await?
            .into_iter()
            .map(|role| role.name)
            .collect();
        Ok(MeResponse {
            user: user.profile(),
            roles,
        })
    }

    async fn load_user(&self, user_id: UserId) -> ApiResult<User> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| ApiAuthError::NotFound("user".to_string()))
    }

    async fn session(
        &self,
        action: SessionAction,
        user_id: Option<UserId>,
        email: Option<&str>,
        outcome: Result<(), &str>,
        ctx: &SessionContext,
    ) {
        self.audit
            .log_session(NewSessionLog {
                user_id,
                email: email.map(str::to_string),
                action,
                success: outcome.is_ok(),
                failure_reason: outcome.err().map(str::to_string),
                ip_address: ctx.ip_address.clone(),
                user_agent: ctx.user_agent.clone(),
                created_at: Utc::now(),
            })
            .await;
    }

    async fn changed(
        &self,
        actor: Option<UserId>,
        user_id: UserId,
        action: ChangeAction,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    ) {
        self.audit
            .log_change_history(NewChangeHistory {
                actor_id: actor,
                entity_type: "user".to_string(),
                entity_id: user_id.to_string(),
                action,
                before,
                after,
                created_at: Utc::now(),
            })
            .await;
    }
}

/// Public message for a failed bulk item.
fn bulk_failure_reason(err: ApiAuthError) -> String {
    match err {
        ApiAuthError::Validation { field, message } => format!("{field}: {message}"),
        other => WardenError::from(other).public_message(),
    }
}

fn reject_invalid_password(result: &PasswordValidationResult) -> ApiResult<()> {
    if result.is_valid {
        return Ok(());
    }
    let message = result
        .errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    Err(ApiAuthError::validation("password", message))
}

fn duplicate_emails(items: &[RegisterRequest]) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    items
        .iter()
        .map(|item| normalize_email(&item.email))
        .filter(|email| !seen.insert(email.clone()))
        .collect()
}

fn token_response(pair: TokenPair, user: &User) -> TokenResponse {
    TokenResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: pair.expires_in,
        user: user.profile(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_auth::TokenConfig;
    use warden_authorization::AuditDispatch;
    use warden_db::models::AuditQuery;
    use warden_db::InMemoryStore;

    fn service() -> CredentialLifecycleService {
        let store = Arc::new(InMemoryStore::new());
        let codec = Arc::new(TokenCodec::new(TokenConfig::new(
            b"lifecycle-test-access-secret-0123456789abcd".to_vec(),
            b"lifecycle-test-refresh-secret-0123456789abc".to_vec(),
        )));
        let audit = AuditRecorder::new(store.clone(), AuditDispatch::Inline);
        CredentialLifecycleService::new(store, codec, audit, LifecycleConfig::default())
            .with_hasher(PasswordHasher::with_params(8, 1, 1).unwrap())
    }

    fn item(email: &str) -> RegisterRequest {
        serde_json::from_value(json!({
            "name": "Bulk User",
            "email": email,
            "password": "Quasar#2024zz",
            "department": "SALES",
            "region": "EAST",
        }))
        .unwrap()
    }

    #[test]
    fn test_duplicate_emails_are_case_insensitive() {
        let items = vec![
            item("a@example.com"),
            item("b@example.com"),
            item(" A@Example.com "),
        ];
        let dups = duplicate_emails(&items);
        assert_eq!(dups.into_iter().collect::<Vec<_>>(), vec!["a@example.com"]);
    }

    #[test]
    fn test_bulk_failure_reason_names_field() {
        let reason = bulk_failure_reason(ApiAuthError::validation("email", "Invalid email format"));
        assert_eq!(reason, "email: Invalid email format");
    }

    #[test]
    fn test_password_rejection_joins_errors() {
        let result = PasswordValidationResult {
            is_valid: false,
            strength: crate::services::validation::PasswordStrength::Weak,
            errors: vec![
                PasswordValidationError::MissingDigit,
                PasswordValidationError::TooWeak,
            ],
        };
        let err = reject_invalid_password(&result).unwrap_err();
        assert!(matches!(err, ApiAuthError::Validation { ref field, .. } if field == "password"));
    }

    #[tokio::test]
    async fn test_concurrent_redemptions_rotate_once() {
        let svc = service();
        let ctx = SessionContext::default();
        svc.register(item("rotate@example.com")).await.unwrap();
        let login = svc
            .login(
                LoginRequest {
                    email: "rotate@example.com".into(),
                    password: "Quasar#2024zz".into(),
                },
                &ctx,
            )
            .await
            .unwrap();

        // Both callers pass redemption before either revokes.
        let first = svc.tokens.redeem(&login.refresh_token).await.unwrap().unwrap();
        let second = svc.tokens.redeem(&login.refresh_token).await.unwrap().unwrap();

        svc.rotate(first, &ctx).await.unwrap();
        let err = svc.rotate(second, &ctx).await.unwrap_err();
        assert!(matches!(err, ApiAuthError::Unauthorized(_)));

        let refreshes: Vec<_> = svc
            .audit
            .session_logs(&AuditQuery::default())
            .await
            .unwrap()
            .into_iter()
            .filter(|log| log.action == SessionAction::TokenRefresh)
            .collect();
        assert_eq!(refreshes.iter().filter(|log| log.success).count(), 1);
        assert!(refreshes
            .iter()
            .any(|log| !log.success && log.failure_reason.as_deref() == Some("token_revoked")));
    }
}
