//! In-memory repository.
//!
//! Backs unit tests and local development. Enforces the same uniqueness and
//! referential rules as the PostgreSQL schema so that service-level behaviour
//! is identical across both stores.

use crate::error::{DbError, DbResult};
use crate::models::{
    AccessDecision, AccessLog, AccessLogSummary, AuditQuery, ChangeHistory, Feature,
    FeatureReferences, NewAccessLog, NewChangeHistory, NewFeature, NewPolicyRule,
    NewPolicyViolation, NewRefreshToken, NewRole, NewRouteFeature, NewSessionLog, NewUser,
    PolicyRule, PolicyViolation, RefreshTokenRecord, Role, RoleFeature, RoleUpdate, RouteFeature,
    SessionLog, SessionLogSummary, User, UserAttributesUpdate, UserRole, ViolationSummary,
};
use crate::repository::{
    AuditRepository, FeatureRepository, PolicyRepository, RefreshTokenRepository, RoleRepository,
    UserRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;
use warden_core::{FeatureId, PolicyId, RoleId, UserId};

#[derive(Debug, Default)]
struct Tables {
    next_id: i64,
    users: BTreeMap<UserId, User>,
    roles: BTreeMap<RoleId, Role>,
    user_roles: Vec<UserRole>,
    features: BTreeMap<FeatureId, Feature>,
    role_features: BTreeMap<(RoleId, FeatureId), RoleFeature>,
    route_features: BTreeMap<(String, String), RouteFeature>,
    policies: BTreeMap<PolicyId, PolicyRule>,
    refresh_tokens: BTreeMap<i64, RefreshTokenRecord>,
    access_logs: Vec<AccessLog>,
    violations: Vec<PolicyViolation>,
    changes: Vec<ChangeHistory>,
    sessions: Vec<SessionLog>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn insert_user(&mut self, user: NewUser) -> DbResult<User> {
        if self
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(DbError::Conflict("duplicate key (users_email_key)".to_string()));
        }
        let now = Utc::now();
        let id = UserId::new(self.next_id());
        let created = User {
            id,
            email: user.email,
            name: user.name,
            password_hash: user.password_hash,
            is_active: true,
            department: user.department,
            region: user.region,
            level: user.level,
            custom_attributes: user.custom_attributes,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(id, created.clone());
        Ok(created)
    }
}

/// Repository held entirely in process memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Newest first, then truncated to `limit`.
fn newest_first<T: Clone>(
    rows: &[T],
    query: &AuditQuery,
    key: impl Fn(&T) -> (Option<UserId>, DateTime<Utc>),
) -> Vec<T> {
    let limit = query
        .limit
        .and_then(|l| usize::try_from(l).ok())
        .unwrap_or(usize::MAX);
    rows.iter()
        .rev()
        .filter(|row| {
            let (user, at) = key(row);
            query.matches(user, at)
        })
        .take(limit)
        .cloned()
        .collect()
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn find_user_by_email(&self, email: &str) -> DbResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email.trim()))
            .cloned())
    }

    async fn find_user_by_id(&self, id: UserId) -> DbResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn create_user(&self, user: NewUser) -> DbResult<User> {
        let mut tables = self.tables.write().await;
        tables.insert_user(user)
    }

    async fn create_user_with_role(
        &self,
        user: NewUser,
        role_id: Option<RoleId>,
    ) -> DbResult<User> {
        let mut tables = self.tables.write().await;
        if let Some(role_id) = role_id {
            if !tables.roles.contains_key(&role_id) {
                return Err(DbError::NotFound(format!("role {role_id}")));
            }
        }
        let created = tables.insert_user(user)?;
        if let Some(role_id) = role_id {
            tables.user_roles.push(UserRole {
                user_id: created.id,
                role_id,
                assigned_at: created.created_at,
            });
        }
        Ok(created)
    }

    async fn update_user_password(&self, id: UserId, password_hash: &str) -> DbResult<()> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| DbError::NotFound(format!("user {id}")))?;
        password_hash.clone_into(&mut user.password_hash);
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn update_user_attributes(
        &self,
        id: UserId,
        update: &UserAttributesUpdate,
    ) -> DbResult<User> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| DbError::NotFound(format!("user {id}")))?;
        update.apply(user);
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn set_user_active(&self, id: UserId, active: bool) -> DbResult<User> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| DbError::NotFound(format!("user {id}")))?;
        user.is_active = active;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }
}

#[async_trait]
impl RoleRepository for InMemoryStore {
    async fn find_roles_by_user_id(&self, user_id: UserId) -> DbResult<Vec<Role>> {
        let tables = self.tables.read().await;
        Ok(tables
            .user_roles
            .iter()
            .filter(|ur| ur.user_id == user_id)
            .filter_map(|ur| tables.roles.get(&ur.role_id).cloned())
            .collect())
    }

    async fn find_role_by_id(&self, id: RoleId) -> DbResult<Option<Role>> {
        Ok(self.tables.read().await.roles.get(&id).cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> DbResult<Option<Role>> {
        let tables = self.tables.read().await;
        Ok(tables.roles.values().find(|r| r.name == name).cloned())
    }

    async fn create_role(&self, role: NewRole) -> DbResult<Role> {
        let mut tables = self.tables.write().await;
        if tables.roles.values().any(|r| r.name == role.name) {
            return Err(DbError::Conflict("duplicate key (roles_name_key)".to_string()));
        }
        let now = Utc::now();
        let id = RoleId::new(tables.next_id());
        let created = Role {
            id,
            name: role.name,
            description: role.description,
            grants_all: role.grants_all,
            created_at: now,
            updated_at: now,
        };
        tables.roles.insert(id, created.clone());
        Ok(created)
    }

    async fn update_role(&self, id: RoleId, update: &RoleUpdate) -> DbResult<Role> {
        let mut tables = self.tables.write().await;
        if let Some(name) = &update.name {
            if tables.roles.values().any(|r| r.id != id && &r.name == name) {
                return Err(DbError::Conflict("duplicate key (roles_name_key)".to_string()));
            }
        }
        let role = tables
            .roles
            .get_mut(&id)
            .ok_or_else(|| DbError::NotFound(format!("role {id}")))?;
        if let Some(name) = &update.name {
            role.name.clone_from(name);
        }
        if let Some(description) = &update.description {
            role.description = Some(description.clone());
        }
        if let Some(grants_all) = update.grants_all {
            role.grants_all = grants_all;
        }
        role.updated_at = Utc::now();
        Ok(role.clone())
    }

    async fn delete_role(&self, id: RoleId) -> DbResult<()> {
        let mut tables = self.tables.write().await;
        if tables.user_roles.iter().any(|ur| ur.role_id == id) {
            return Err(DbError::Conflict("still referenced (user_roles_role_id_fkey)".to_string()));
        }
        if tables.roles.remove(&id).is_none() {
            return Err(DbError::NotFound(format!("role {id}")));
        }
        tables.role_features.retain(|(role_id, _), _| *role_id != id);
        Ok(())
    }

    async fn count_role_assignments(&self, id: RoleId) -> DbResult<i64> {
        let tables = self.tables.read().await;
        let count = tables.user_roles.iter().filter(|ur| ur.role_id == id).count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn assign_role(&self, user_id: UserId, role_id: RoleId) -> DbResult<bool> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user_id) {
            return Err(DbError::NotFound(format!("user {user_id}")));
        }
        if !tables.roles.contains_key(&role_id) {
            return Err(DbError::NotFound(format!("role {role_id}")));
        }
        if tables
            .user_roles
            .iter()
            .any(|ur| ur.user_id == user_id && ur.role_id == role_id)
        {
            return Ok(false);
        }
        tables.user_roles.push(UserRole {
            user_id,
            role_id,
            assigned_at: Utc::now(),
        });
        Ok(true)
    }

    async fn revoke_role(&self, user_id: UserId, role_id: RoleId) -> DbResult<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.user_roles.len();
        tables
            .user_roles
            .retain(|ur| !(ur.user_id == user_id && ur.role_id == role_id));
        Ok(tables.user_roles.len() != before)
    }
}

#[async_trait]
impl FeatureRepository for InMemoryStore {
    async fn find_feature_by_name(&self, name: &str) -> DbResult<Option<Feature>> {
        let tables = self.tables.read().await;
        Ok(tables.features.values().find(|f| f.name == name).cloned())
    }

    async fn find_feature_by_id(&self, id: FeatureId) -> DbResult<Option<Feature>> {
        Ok(self.tables.read().await.features.get(&id).cloned())
    }

    async fn create_feature(&self, feature: NewFeature) -> DbResult<Feature> {
        let mut tables = self.tables.write().await;
        if tables.features.values().any(|f| f.name == feature.name) {
            return Err(DbError::Conflict("duplicate key (features_name_key)".to_string()));
        }
        let id = FeatureId::new(tables.next_id());
        let created = Feature {
            id,
            name: feature.name,
            description: feature.description,
            created_at: Utc::now(),
        };
        tables.features.insert(id, created.clone());
        Ok(created)
    }

    async fn delete_feature(&self, id: FeatureId) -> DbResult<()> {
        let mut tables = self.tables.write().await;
        let referenced = tables.role_features.keys().any(|(_, f)| *f == id)
            || tables.route_features.values().any(|r| r.feature_id == id);
        if referenced {
            return Err(DbError::Conflict("still referenced (features)".to_string()));
        }
        if tables.features.remove(&id).is_none() {
            return Err(DbError::NotFound(format!("feature {id}")));
        }
        tables.policies.retain(|_, p| p.feature_id != id);
        Ok(())
    }

    async fn count_feature_references(&self, id: FeatureId) -> DbResult<FeatureReferences> {
        let tables = self.tables.read().await;
        let role_features = tables.role_features.keys().filter(|(_, f)| *f == id).count();
        let route_features = tables
            .route_features
            .values()
            .filter(|r| r.feature_id == id)
            .count();
        Ok(FeatureReferences {
            role_features: i64::try_from(role_features).unwrap_or(i64::MAX),
            route_features: i64::try_from(route_features).unwrap_or(i64::MAX),
        })
    }

    async fn find_role_feature(
        &self,
        role_id: RoleId,
        feature_id: FeatureId,
    ) -> DbResult<Option<RoleFeature>> {
        let tables = self.tables.read().await;
        Ok(tables.role_features.get(&(role_id, feature_id)).copied())
    }

    async fn upsert_role_feature(&self, cell: RoleFeature) -> DbResult<RoleFeature> {
        let mut tables = self.tables.write().await;
        if !tables.roles.contains_key(&cell.role_id) {
            return Err(DbError::NotFound(format!("role {}", cell.role_id)));
        }
        if !tables.features.contains_key(&cell.feature_id) {
            return Err(DbError::NotFound(format!("feature {}", cell.feature_id)));
        }
        tables
            .role_features
            .insert((cell.role_id, cell.feature_id), cell);
        Ok(cell)
    }

    async fn find_route_feature(
        &self,
        path: &str,
        method: &str,
    ) -> DbResult<Option<RouteFeature>> {
        let tables = self.tables.read().await;
        Ok(tables
            .route_features
            .get(&(path.to_string(), method.to_ascii_uppercase()))
            .cloned())
    }

    async fn upsert_route_feature(&self, route: NewRouteFeature) -> DbResult<RouteFeature> {
        let mut tables = self.tables.write().await;
        if !tables.features.contains_key(&route.feature_id) {
            return Err(DbError::NotFound(format!("feature {}", route.feature_id)));
        }
        let method = route.method.to_ascii_uppercase();
        let key = (route.path.clone(), method.clone());
        let created_at = tables
            .route_features
            .get(&key)
            .map_or_else(Utc::now, |existing| existing.created_at);
        let mapped = RouteFeature {
            path: route.path,
            method,
            feature_id: route.feature_id,
            created_at,
        };
        tables.route_features.insert(key, mapped.clone());
        Ok(mapped)
    }
}

#[async_trait]
impl PolicyRepository for InMemoryStore {
    async fn find_policies_for_feature(&self, feature_id: FeatureId) -> DbResult<Vec<PolicyRule>> {
        let tables = self.tables.read().await;
        Ok(tables
            .policies
            .values()
            .filter(|p| p.feature_id == feature_id)
            .cloned()
            .collect())
    }

    async fn create_policy(&self, rule: NewPolicyRule) -> DbResult<PolicyRule> {
        let mut tables = self.tables.write().await;
        if !tables.features.contains_key(&rule.feature_id) {
            return Err(DbError::NotFound(format!("feature {}", rule.feature_id)));
        }
        let id = PolicyId::new(tables.next_id());
        let created = PolicyRule {
            id,
            feature_id: rule.feature_id,
            attribute: rule.attribute,
            operator: rule.operator,
            value: rule.value,
            description: rule.description,
            created_at: Utc::now(),
        };
        tables.policies.insert(id, created.clone());
        Ok(created)
    }

    async fn delete_policy(&self, id: PolicyId) -> DbResult<bool> {
        Ok(self.tables.write().await.policies.remove(&id).is_some())
    }
}

#[async_trait]
impl AuditRepository for InMemoryStore {
    async fn append_access_log(&self, entry: NewAccessLog) -> DbResult<AccessLog> {
        let mut tables = self.tables.write().await;
        let row = AccessLog {
            id: tables.next_id(),
            user_id: entry.user_id,
            role: entry.role,
            feature: entry.feature,
            path: entry.path,
            method: entry.method,
            decision: entry.decision,
            reason: entry.reason,
            created_at: entry.created_at,
        };
        tables.access_logs.push(row.clone());
        Ok(row)
    }

    async fn append_policy_violation(
        &self,
        entry: NewPolicyViolation,
    ) -> DbResult<PolicyViolation> {
        let mut tables = self.tables.write().await;
        let row = PolicyViolation {
            id: tables.next_id(),
            user_id: entry.user_id,
            feature_id: entry.feature_id,
            feature: entry.feature,
            policy_id: entry.policy_id,
            attribute: entry.attribute,
            expected_value: entry.expected_value,
            actual_value: entry.actual_value,
            created_at: entry.created_at,
        };
        tables.violations.push(row.clone());
        Ok(row)
    }

    async fn append_change_history(&self, entry: NewChangeHistory) -> DbResult<ChangeHistory> {
        let mut tables = self.tables.write().await;
        let row = ChangeHistory {
            id: tables.next_id(),
            actor_id: entry.actor_id,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            action: entry.action,
            before: entry.before,
            after: entry.after,
            created_at: entry.created_at,
        };
        tables.changes.push(row.clone());
        Ok(row)
    }

    async fn append_session_log(&self, entry: NewSessionLog) -> DbResult<SessionLog> {
        let mut tables = self.tables.write().await;
        let row = SessionLog {
            id: tables.next_id(),
            user_id: entry.user_id,
            email: entry.email,
            action: entry.action,
            success: entry.success,
            failure_reason: entry.failure_reason,
            ip_address: entry.ip_address,
            user_agent: entry.user_agent,
            created_at: entry.created_at,
        };
        tables.sessions.push(row.clone());
        Ok(row)
    }

    async fn list_access_logs(&self, query: &AuditQuery) -> DbResult<Vec<AccessLog>> {
        let tables = self.tables.read().await;
        Ok(newest_first(&tables.access_logs, query, |r| {
            (r.user_id, r.created_at)
        }))
    }

    async fn list_policy_violations(&self, query: &AuditQuery) -> DbResult<Vec<PolicyViolation>> {
        let tables = self.tables.read().await;
        Ok(newest_first(&tables.violations, query, |r| {
            (Some(r.user_id), r.created_at)
        }))
    }

    async fn list_change_history(&self, query: &AuditQuery) -> DbResult<Vec<ChangeHistory>> {
        let tables = self.tables.read().await;
        Ok(newest_first(&tables.changes, query, |r| {
            (r.actor_id, r.created_at)
        }))
    }

    async fn list_session_logs(&self, query: &AuditQuery) -> DbResult<Vec<SessionLog>> {
        let tables = self.tables.read().await;
        Ok(newest_first(&tables.sessions, query, |r| {
            (r.user_id, r.created_at)
        }))
    }

    async fn summarize_access_logs(&self, query: &AuditQuery) -> DbResult<AccessLogSummary> {
        let tables = self.tables.read().await;
        let mut summary = AccessLogSummary::default();
        let mut users = BTreeSet::new();
        let mut paths = BTreeSet::new();
        for row in tables
            .access_logs
            .iter()
            .filter(|r| query.matches(r.user_id, r.created_at))
        {
            summary.total += 1;
            if row.decision == AccessDecision::Allow {
                summary.allowed += 1;
            }
            if let Some(user_id) = row.user_id {
                users.insert(user_id);
            }
            paths.insert(row.path.as_str());
        }
        summary.unique_users = users.len() as u64;
        summary.unique_paths = paths.len() as u64;
        Ok(summary)
    }

    async fn summarize_policy_violations(
        &self,
        query: &AuditQuery,
    ) -> DbResult<ViolationSummary> {
        let tables = self.tables.read().await;
        let mut summary = ViolationSummary::default();
        let mut users = BTreeSet::new();
        for row in tables
            .violations
            .iter()
            .filter(|r| query.matches(Some(r.user_id), r.created_at))
        {
            summary.total += 1;
            *summary.by_attribute.entry(row.attribute.clone()).or_insert(0) += 1;
            users.insert(row.user_id);
        }
        summary.unique_users = users.len() as u64;
        Ok(summary)
    }

    async fn summarize_session_logs(&self, query: &AuditQuery) -> DbResult<SessionLogSummary> {
        let tables = self.tables.read().await;
        let mut summary = SessionLogSummary::default();
        for row in tables
            .sessions
            .iter()
            .filter(|r| query.matches(r.user_id, r.created_at))
        {
            summary.total += 1;
            if row.success {
                summary.successful += 1;
            }
            *summary
                .by_action
                .entry(row.action.as_str().to_string())
                .or_insert(0) += 1;
        }
        Ok(summary)
    }
}

#[async_trait]
impl RefreshTokenRepository for InMemoryStore {
    async fn insert_refresh_token(&self, token: NewRefreshToken) -> DbResult<RefreshTokenRecord> {
        let mut tables = self.tables.write().await;
        if tables
            .refresh_tokens
            .values()
            .any(|t| t.token_hash == token.token_hash)
        {
            return Err(DbError::Conflict(
                "duplicate key (refresh_tokens_token_hash_key)".to_string(),
            ));
        }
        let record = RefreshTokenRecord {
            id: tables.next_id(),
            user_id: token.user_id,
            token_hash: token.token_hash,
            expires_at: token.expires_at,
            revoked_at: None,
            created_at: Utc::now(),
        };
        tables.refresh_tokens.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_refresh_token_by_hash(
        &self,
        hash: &str,
    ) -> DbResult<Option<RefreshTokenRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .refresh_tokens
            .values()
            .find(|t| t.token_hash == hash)
            .cloned())
    }

    async fn revoke_refresh_token(&self, id: i64, at: DateTime<Utc>) -> DbResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.refresh_tokens.get_mut(&id) {
            Some(record) if record.revoked_at.is_none() => {
                record.revoked_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_user_refresh_tokens(&self, user_id: UserId, at: DateTime<Utc>) -> DbResult<u64> {
        let mut tables = self.tables.write().await;
        let mut revoked = 0;
        for record in tables
            .refresh_tokens
            .values_mut()
            .filter(|t| t.user_id == user_id && t.revoked_at.is_none())
        {
            record.revoked_at = Some(at);
            revoked += 1;
        }
        Ok(revoked)
    }
}
