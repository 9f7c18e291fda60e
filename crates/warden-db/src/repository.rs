//! Repository capability consumed by the authorization core.
//!
//! Each trait covers one aggregate. [`Repository`] is the union, implemented
//! automatically for any type that provides all of them.

use crate::error::DbResult;
use crate::models::{
    AccessLog, AccessLogSummary, AuditQuery, ChangeHistory, Feature, FeatureReferences,
    NewAccessLog, NewChangeHistory, NewFeature, NewPolicyRule, NewPolicyViolation,
    NewRefreshToken, NewRole, NewRouteFeature, NewSessionLog, NewUser, PolicyRule,
    PolicyViolation, RefreshTokenRecord, Role, RoleFeature, RoleUpdate, RouteFeature, SessionLog,
    SessionLogSummary, User, UserAttributesUpdate, ViolationSummary,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use warden_core::{FeatureId, PolicyId, RoleId, UserId};

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Case-insensitive lookup.
    async fn find_user_by_email(&self, email: &str) -> DbResult<Option<User>>;

    async fn find_user_by_id(&self, id: UserId) -> DbResult<Option<User>>;

    /// Fails with `DbError::Conflict` when the email is taken (case-insensitively).
    async fn create_user(&self, user: NewUser) -> DbResult<User>;

    /// Create the user and, when `role_id` is given, assign that role in the
    /// same unit of work. Nothing is persisted if either step fails; an
    /// unknown role yields `DbError::NotFound`.
    async fn create_user_with_role(
        &self,
        user: NewUser,
        role_id: Option<RoleId>,
    ) -> DbResult<User>;

    async fn update_user_password(&self, id: UserId, password_hash: &str) -> DbResult<()>;

    async fn update_user_attributes(
        &self,
        id: UserId,
        update: &UserAttributesUpdate,
    ) -> DbResult<User>;

    async fn set_user_active(&self, id: UserId, active: bool) -> DbResult<User>;
}

#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn find_roles_by_user_id(&self, user_id: UserId) -> DbResult<Vec<Role>>;

    async fn find_role_by_id(&self, id: RoleId) -> DbResult<Option<Role>>;

    async fn find_role_by_name(&self, name: &str) -> DbResult<Option<Role>>;

    async fn create_role(&self, role: NewRole) -> DbResult<Role>;

    async fn update_role(&self, id: RoleId, update: &RoleUpdate) -> DbResult<Role>;

    /// Fails with `DbError::Conflict` while any user holds the role.
    async fn delete_role(&self, id: RoleId) -> DbResult<()>;

    async fn count_role_assignments(&self, id: RoleId) -> DbResult<i64>;

    /// Returns `false` when the assignment already existed.
    async fn assign_role(&self, user_id: UserId, role_id: RoleId) -> DbResult<bool>;

    /// Returns `false` when there was nothing to revoke.
    async fn revoke_role(&self, user_id: UserId, role_id: RoleId) -> DbResult<bool>;
}

#[async_trait]
pub trait FeatureRepository: Send + Sync {
    async fn find_feature_by_name(&self, name: &str) -> DbResult<Option<Feature>>;

    async fn find_feature_by_id(&self, id: FeatureId) -> DbResult<Option<Feature>>;

    async fn create_feature(&self, feature: NewFeature) -> DbResult<Feature>;

    /// Fails with `DbError::Conflict` while referenced.
    async fn delete_feature(&self, id: FeatureId) -> DbResult<()>;

    async fn count_feature_references(&self, id: FeatureId) -> DbResult<FeatureReferences>;

    async fn find_role_feature(
        &self,
        role_id: RoleId,
        feature_id: FeatureId,
    ) -> DbResult<Option<RoleFeature>>;

    /// Insert or overwrite the (role, feature) cell.
    async fn upsert_role_feature(&self, cell: RoleFeature) -> DbResult<RoleFeature>;

    /// `method` is matched case-insensitively.
    async fn find_route_feature(&self, path: &str, method: &str)
        -> DbResult<Option<RouteFeature>>;

    /// Insert or repoint the (path, method) mapping.
    async fn upsert_route_feature(&self, route: NewRouteFeature) -> DbResult<RouteFeature>;
}

#[async_trait]
pub trait PolicyRepository: Send + Sync {
    async fn find_policies_for_feature(&self, feature_id: FeatureId) -> DbResult<Vec<PolicyRule>>;

    async fn create_policy(&self, rule: NewPolicyRule) -> DbResult<PolicyRule>;

    /// Returns `false` when no such policy existed.
    async fn delete_policy(&self, id: PolicyId) -> DbResult<bool>;
}

/// Append-only audit storage. There are deliberately no update or delete methods.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn append_access_log(&self, entry: NewAccessLog) -> DbResult<AccessLog>;

    async fn append_policy_violation(
        &self,
        entry: NewPolicyViolation,
    ) -> DbResult<PolicyViolation>;

    async fn append_change_history(&self, entry: NewChangeHistory) -> DbResult<ChangeHistory>;

    async fn append_session_log(&self, entry: NewSessionLog) -> DbResult<SessionLog>;

    /// Newest first.
    async fn list_access_logs(&self, query: &AuditQuery) -> DbResult<Vec<AccessLog>>;

    async fn list_policy_violations(&self, query: &AuditQuery) -> DbResult<Vec<PolicyViolation>>;

    async fn list_change_history(&self, query: &AuditQuery) -> DbResult<Vec<ChangeHistory>>;

    async fn list_session_logs(&self, query: &AuditQuery) -> DbResult<Vec<SessionLog>>;

    /// Aggregates over the whole window; `query.limit` does not apply.
    async fn summarize_access_logs(&self, query: &AuditQuery) -> DbResult<AccessLogSummary>;

    async fn summarize_policy_violations(&self, query: &AuditQuery)
        -> DbResult<ViolationSummary>;

    async fn summarize_session_logs(&self, query: &AuditQuery) -> DbResult<SessionLogSummary>;
}

#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    async fn insert_refresh_token(&self, token: NewRefreshToken) -> DbResult<RefreshTokenRecord>;

    async fn find_refresh_token_by_hash(&self, hash: &str)
        -> DbResult<Option<RefreshTokenRecord>>;

    /// Returns `false` when the token was already revoked or unknown.
    async fn revoke_refresh_token(&self, id: i64, at: DateTime<Utc>) -> DbResult<bool>;

    /// Revoke every live token for the user; returns how many were revoked.
    async fn revoke_user_refresh_tokens(&self, user_id: UserId, at: DateTime<Utc>) -> DbResult<u64>;
}

/// Every repository capability in one bound.
pub trait Repository:
    UserRepository
    + RoleRepository
    + FeatureRepository
    + PolicyRepository
    + AuditRepository
    + RefreshTokenRepository
{
}

impl<T> Repository for T where
    T: UserRepository
        + RoleRepository
        + FeatureRepository
        + PolicyRepository
        + AuditRepository
        + RefreshTokenRepository
{
}
