//! PostgreSQL repository.
//!
//! Row structs mirror table columns with raw types; conversion into domain
//! models happens in one place per table so enum columns are validated on read.

use crate::error::{DbError, DbResult};
use crate::models::{
    AccessLog, AccessLogSummary, AuditQuery, ChangeHistory, Feature, FeatureReferences,
    NewAccessLog, NewChangeHistory, NewFeature, NewPolicyRule, NewPolicyViolation,
    NewRefreshToken, NewRole, NewRouteFeature, NewSessionLog, NewUser, PolicyRule,
    PolicyViolation, RefreshTokenRecord, Role, RoleFeature, RoleUpdate, RouteFeature, SessionLog,
    SessionLogSummary, User, UserAttributesUpdate, ViolationSummary,
};
use crate::pool::DbPool;
use crate::repository::{
    AuditRepository, FeatureRepository, PolicyRepository, RefreshTokenRepository, RoleRepository,
    UserRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::BTreeMap;
use warden_core::{FeatureId, PolicyId, RoleId, UserId};

/// Repository backed by a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn pg(&self) -> &sqlx::PgPool {
        self.pool.inner()
    }
}

fn corrupt(err: impl std::fmt::Display) -> DbError {
    DbError::Corrupt(err.to_string())
}

const USER_COLUMNS: &str = "id, email, name, password_hash, is_active, department, region, level, custom_attributes, created_at, updated_at";

#[derive(FromRow)]
struct UserRow {
    id: i64,
    email: String,
    name: String,
    password_hash: String,
    is_active: bool,
    department: String,
    region: String,
    level: i16,
    custom_attributes: Json<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = DbError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: UserId::new(row.id),
            email: row.email,
            name: row.name,
            password_hash: row.password_hash,
            is_active: row.is_active,
            department: row.department.parse().map_err(corrupt)?,
            region: row.region.parse().map_err(corrupt)?,
            level: row.level,
            custom_attributes: row.custom_attributes.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct RoleRow {
    id: i64,
    name: String,
    description: Option<String>,
    grants_all: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Role {
            id: RoleId::new(row.id),
            name: row.name,
            description: row.description,
            grants_all: row.grants_all,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct FeatureRow {
    id: i64,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<FeatureRow> for Feature {
    fn from(row: FeatureRow) -> Self {
        Feature {
            id: FeatureId::new(row.id),
            name: row.name,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct RoleFeatureRow {
    role_id: i64,
    feature_id: i64,
    can_create: bool,
    can_read: bool,
    can_update: bool,
    can_delete: bool,
}

impl From<RoleFeatureRow> for RoleFeature {
    fn from(row: RoleFeatureRow) -> Self {
        RoleFeature {
            role_id: RoleId::new(row.role_id),
            feature_id: FeatureId::new(row.feature_id),
            can_create: row.can_create,
            can_read: row.can_read,
            can_update: row.can_update,
            can_delete: row.can_delete,
        }
    }
}

#[derive(FromRow)]
struct RouteFeatureRow {
    path: String,
    method: String,
    feature_id: i64,
    created_at: DateTime<Utc>,
}

impl From<RouteFeatureRow> for RouteFeature {
    fn from(row: RouteFeatureRow) -> Self {
        RouteFeature {
            path: row.path,
            method: row.method,
            feature_id: FeatureId::new(row.feature_id),
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct PolicyRow {
    id: i64,
    feature_id: i64,
    attribute: String,
    operator: String,
    value: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PolicyRow> for PolicyRule {
    type Error = DbError;

    fn try_from(row: PolicyRow) -> Result<Self, Self::Error> {
        Ok(PolicyRule {
            id: PolicyId::new(row.id),
            feature_id: FeatureId::new(row.feature_id),
            attribute: row.attribute,
            operator: row.operator.parse().map_err(corrupt)?,
            value: row.value,
            description: row.description,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct RefreshTokenRow {
    id: i64,
    user_id: i64,
    token_hash: String,
    expires_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<RefreshTokenRow> for RefreshTokenRecord {
    fn from(row: RefreshTokenRow) -> Self {
        RefreshTokenRecord {
            id: row.id,
            user_id: UserId::new(row.user_id),
            token_hash: row.token_hash,
            expires_at: row.expires_at,
            revoked_at: row.revoked_at,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct AccessLogRow {
    id: i64,
    user_id: Option<i64>,
    role: Option<String>,
    feature: Option<String>,
    path: String,
    method: String,
    decision: String,
    reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AccessLogRow> for AccessLog {
    type Error = DbError;

    fn try_from(row: AccessLogRow) -> Result<Self, Self::Error> {
        Ok(AccessLog {
            id: row.id,
            user_id: row.user_id.map(UserId::new),
            role: row.role,
            feature: row.feature,
            path: row.path,
            method: row.method,
            decision: row.decision.parse().map_err(corrupt)?,
            reason: row.reason,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct ViolationRow {
    id: i64,
    user_id: i64,
    feature_id: Option<i64>,
    feature: String,
    policy_id: Option<i64>,
    attribute: String,
    expected_value: String,
    actual_value: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<ViolationRow> for PolicyViolation {
    fn from(row: ViolationRow) -> Self {
        PolicyViolation {
            id: row.id,
            user_id: UserId::new(row.user_id),
            feature_id: row.feature_id.map(FeatureId::new),
            feature: row.feature,
            policy_id: row.policy_id.map(PolicyId::new),
            attribute: row.attribute,
            expected_value: row.expected_value,
            actual_value: row.actual_value,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct ChangeRow {
    id: i64,
    actor_id: Option<i64>,
    entity_type: String,
    entity_id: String,
    action: String,
    before: Option<Json<serde_json::Value>>,
    after: Option<Json<serde_json::Value>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ChangeRow> for ChangeHistory {
    type Error = DbError;

    fn try_from(row: ChangeRow) -> Result<Self, Self::Error> {
        Ok(ChangeHistory {
            id: row.id,
            actor_id: row.actor_id.map(UserId::new),
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            action: row.action.parse().map_err(corrupt)?,
            before: row.before.map(|j| j.0),
            after: row.after.map(|j| j.0),
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct SessionRow {
    id: i64,
    user_id: Option<i64>,
    email: Option<String>,
    action: String,
    success: bool,
    failure_reason: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for SessionLog {
    type Error = DbError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(SessionLog {
            id: row.id,
            user_id: row.user_id.map(UserId::new),
            email: row.email,
            action: row.action.parse().map_err(corrupt)?,
            success: row.success,
            failure_reason: row.failure_reason,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            created_at: row.created_at,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> DbResult<Vec<T>>
where
    T: TryFrom<R, Error = DbError>,
{
    rows.into_iter().map(T::try_from).collect()
}

async fn insert_user<'e, E>(executor: E, user: &NewUser) -> DbResult<User>
where
    E: sqlx::PgExecutor<'e>,
{
    let row: UserRow = sqlx::query_as(&format!(
        r"
        INSERT INTO users (email, name, password_hash, department, region, level, custom_attributes)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {USER_COLUMNS}
        "
    ))
    .bind(&user.email)
    .bind(&user.name)
    .bind(&user.password_hash)
    .bind(user.department.as_str())
    .bind(user.region.as_str())
    .bind(user.level)
    .bind(Json(&user.custom_attributes))
    .fetch_one(executor)
    .await
    .map_err(DbError::from_query)?;
    row.try_into()
}

#[async_trait]
impl UserRepository for PgStore {
    async fn find_user_by_email(&self, email: &str) -> DbResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email.trim())
        .fetch_optional(self.pg())
        .await
        .map_err(DbError::from_query)?;
        row.map(User::try_from).transpose()
    }

    async fn find_user_by_id(&self, id: UserId) -> DbResult<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id.get())
                .fetch_optional(self.pg())
                .await
                .map_err(DbError::from_query)?;
        row.map(User::try_from).transpose()
    }

    async fn create_user(&self, user: NewUser) -> DbResult<User> {
        insert_user(self.pg(), &user).await
    }

    async fn create_user_with_role(
        &self,
        user: NewUser,
        role_id: Option<RoleId>,
    ) -> DbResult<User> {
        let mut tx = self.pg().begin().await.map_err(DbError::from_query)?;
        let created = insert_user(&mut *tx, &user).await?;
        if let Some(role_id) = role_id {
            sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2)")
                .bind(created.id.get())
                .bind(role_id.get())
                .execute(&mut *tx)
                .await
                .map_err(|e| match DbError::from_query(e) {
                    DbError::Conflict(_) => DbError::NotFound(format!("role {role_id}")),
                    other => other,
                })?;
        }
        tx.commit().await.map_err(DbError::from_query)?;
        Ok(created)
    }

    async fn update_user_password(&self, id: UserId, password_hash: &str) -> DbResult<()> {
        let result =
            sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
                .bind(id.get())
                .bind(password_hash)
                .execute(self.pg())
                .await
                .map_err(DbError::from_query)?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("user {id}")));
        }
        Ok(())
    }

    async fn update_user_attributes(
        &self,
        id: UserId,
        update: &UserAttributesUpdate,
    ) -> DbResult<User> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            r"
            UPDATE users SET
                name = COALESCE($2, name),
                department = COALESCE($3, department),
                region = COALESCE($4, region),
                level = COALESCE($5, level),
                custom_attributes = COALESCE($6, custom_attributes),
                updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(id.get())
        .bind(update.name.as_deref())
        .bind(update.department.map(|d| d.as_str()))
        .bind(update.region.map(|r| r.as_str()))
        .bind(update.level)
        .bind(update.custom_attributes.as_ref().map(Json))
        .fetch_optional(self.pg())
        .await
        .map_err(DbError::from_query)?;
        row.ok_or_else(|| DbError::NotFound(format!("user {id}")))?
            .try_into()
    }

    async fn set_user_active(&self, id: UserId, active: bool) -> DbResult<User> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "UPDATE users SET is_active = $2, updated_at = now() WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id.get())
        .bind(active)
        .fetch_optional(self.pg())
        .await
        .map_err(DbError::from_query)?;
        row.ok_or_else(|| DbError::NotFound(format!("user {id}")))?
            .try_into()
    }
}

#[async_trait]
impl RoleRepository for PgStore {
    async fn find_roles_by_user_id(&self, user_id: UserId) -> DbResult<Vec<Role>> {
        let rows: Vec<RoleRow> = sqlx::query_as(
            r"
            SELECT r.id, r.name, r.description, r.grants_all, r.created_at, r.updated_at
            FROM roles r
            JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = $1
            ",
        )
        .bind(user_id.get())
        .fetch_all(self.pg())
        .await
        .map_err(DbError::from_query)?;
        Ok(rows.into_iter().map(Role::from).collect())
    }

    async fn find_role_by_id(&self, id: RoleId) -> DbResult<Option<Role>> {
        let row: Option<RoleRow> = sqlx::query_as("SELECT * FROM roles WHERE id = $1")
            .bind(id.get())
            .fetch_optional(self.pg())
            .await
            .map_err(DbError::from_query)?;
        Ok(row.map(Role::from))
    }

    async fn find_role_by_name(&self, name: &str) -> DbResult<Option<Role>> {
        let row: Option<RoleRow> = sqlx::query_as("SELECT * FROM roles WHERE name = $1")
            .bind(name)
            .fetch_optional(self.pg())
            .await
            .map_err(DbError::from_query)?;
        Ok(row.map(Role::from))
    }

    async fn create_role(&self, role: NewRole) -> DbResult<Role> {
        let row: RoleRow = sqlx::query_as(
            "INSERT INTO roles (name, description, grants_all) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(&role.name)
        .bind(role.description.as_deref())
        .bind(role.grants_all)
        .fetch_one(self.pg())
        .await
        .map_err(DbError::from_query)?;
        Ok(row.into())
    }

    async fn update_role(&self, id: RoleId, update: &RoleUpdate) -> DbResult<Role> {
        let row: Option<RoleRow> = sqlx::query_as(
            r"
            UPDATE roles SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                grants_all = COALESCE($4, grants_all),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(id.get())
        .bind(update.name.as_deref())
        .bind(update.description.as_deref())
        .bind(update.grants_all)
        .fetch_optional(self.pg())
        .await
        .map_err(DbError::from_query)?;
        row.map(Role::from)
            .ok_or_else(|| DbError::NotFound(format!("role {id}")))
    }

    async fn delete_role(&self, id: RoleId) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id.get())
            .execute(self.pg())
            .await
            .map_err(DbError::from_query)?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("role {id}")));
        }
        Ok(())
    }

    async fn count_role_assignments(&self, id: RoleId) -> DbResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_roles WHERE role_id = $1")
            .bind(id.get())
            .fetch_one(self.pg())
            .await
            .map_err(DbError::from_query)?;
        Ok(count)
    }

    async fn assign_role(&self, user_id: UserId, role_id: RoleId) -> DbResult<bool> {
        let result = sqlx::query(
            "INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id.get())
        .bind(role_id.get())
        .execute(self.pg())
        .await
        .map_err(|e| match DbError::from_query(e) {
            DbError::Conflict(_) => DbError::NotFound(format!("user {user_id} or role {role_id}")),
            other => other,
        })?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_role(&self, user_id: UserId, role_id: RoleId) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2")
            .bind(user_id.get())
            .bind(role_id.get())
            .execute(self.pg())
            .await
            .map_err(DbError::from_query)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl FeatureRepository for PgStore {
    async fn find_feature_by_name(&self, name: &str) -> DbResult<Option<Feature>> {
        let row: Option<FeatureRow> = sqlx::query_as("SELECT * FROM features WHERE name = $1")
            .bind(name)
            .fetch_optional(self.pg())
            .await
            .map_err(DbError::from_query)?;
        Ok(row.map(Feature::from))
    }

    async fn find_feature_by_id(&self, id: FeatureId) -> DbResult<Option<Feature>> {
        let row: Option<FeatureRow> = sqlx::query_as("SELECT * FROM features WHERE id = $1")
            .bind(id.get())
            .fetch_optional(self.pg())
            .await
            .map_err(DbError::from_query)?;
        Ok(row.map(Feature::from))
    }

    async fn create_feature(&self, feature: NewFeature) -> DbResult<Feature> {
        let row: FeatureRow =
            sqlx::query_as("INSERT INTO features (name, description) VALUES ($1, $2) RETURNING *")
                .bind(&feature.name)
                .bind(feature.description.as_deref())
                .fetch_one(self.pg())
                .await
                .map_err(DbError::from_query)?;
        Ok(row.into())
    }

    async fn delete_feature(&self, id: FeatureId) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM features WHERE id = $1")
            .bind(id.get())
            .execute(self.pg())
            .await
            .map_err(DbError::from_query)?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("feature {id}")));
        }
        Ok(())
    }

    async fn count_feature_references(&self, id: FeatureId) -> DbResult<FeatureReferences> {
        let (role_features, route_features): (i64, i64) = sqlx::query_as(
            r"
            SELECT
                (SELECT COUNT(*) FROM role_features WHERE feature_id = $1),
                (SELECT COUNT(*) FROM route_features WHERE feature_id = $1)
            ",
        )
        .bind(id.get())
        .fetch_one(self.pg())
        .await
        .map_err(DbError::from_query)?;
        Ok(FeatureReferences {
            role_features,
            route_features,
        })
    }

    async fn find_role_feature(
        &self,
        role_id: RoleId,
        feature_id: FeatureId,
    ) -> DbResult<Option<RoleFeature>> {
        let row: Option<RoleFeatureRow> = sqlx::query_as(
            r"
            SELECT role_id, feature_id, can_create, can_read, can_update, can_delete
            FROM role_features
            WHERE role_id = $1 AND feature_id = $2
            ",
        )
        .bind(role_id.get())
        .bind(feature_id.get())
        .fetch_optional(self.pg())
        .await
        .map_err(DbError::from_query)?;
        Ok(row.map(RoleFeature::from))
    }

    async fn upsert_role_feature(&self, cell: RoleFeature) -> DbResult<RoleFeature> {
        let row: RoleFeatureRow = sqlx::query_as(
            r"
            INSERT INTO role_features (role_id, feature_id, can_create, can_read, can_update, can_delete)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (role_id, feature_id) DO UPDATE SET
                can_create = EXCLUDED.can_create,
                can_read = EXCLUDED.can_read,
                can_update = EXCLUDED.can_update,
                can_delete = EXCLUDED.can_delete,
                updated_at = now()
            RETURNING role_id, feature_id, can_create, can_read, can_update, can_delete
            ",
        )
        .bind(cell.role_id.get())
        .bind(cell.feature_id.get())
        .bind(cell.can_create)
        .bind(cell.can_read)
        .bind(cell.can_update)
        .bind(cell.can_delete)
        .fetch_one(self.pg())
        .await
        .map_err(DbError::from_query)?;
        Ok(row.into())
    }

    async fn find_route_feature(
        &self,
        path: &str,
        method: &str,
    ) -> DbResult<Option<RouteFeature>> {
        let row: Option<RouteFeatureRow> =
            sqlx::query_as("SELECT * FROM route_features WHERE path = $1 AND method = upper($2)")
                .bind(path)
                .bind(method)
                .fetch_optional(self.pg())
                .await
                .map_err(DbError::from_query)?;
        Ok(row.map(RouteFeature::from))
    }

    async fn upsert_route_feature(&self, route: NewRouteFeature) -> DbResult<RouteFeature> {
        let row: RouteFeatureRow = sqlx::query_as(
            r"
            INSERT INTO route_features (path, method, feature_id)
            VALUES ($1, upper($2), $3)
            ON CONFLICT (path, method) DO UPDATE SET feature_id = EXCLUDED.feature_id
            RETURNING *
            ",
        )
        .bind(&route.path)
        .bind(&route.method)
        .bind(route.feature_id.get())
        .fetch_one(self.pg())
        .await
        .map_err(DbError::from_query)?;
        Ok(row.into())
    }
}

#[async_trait]
impl PolicyRepository for PgStore {
    async fn find_policies_for_feature(&self, feature_id: FeatureId) -> DbResult<Vec<PolicyRule>> {
        let rows: Vec<PolicyRow> =
            sqlx::query_as("SELECT * FROM policy_rules WHERE feature_id = $1 ORDER BY id")
                .bind(feature_id.get())
                .fetch_all(self.pg())
                .await
                .map_err(DbError::from_query)?;
        convert_all(rows)
    }

    async fn create_policy(&self, rule: NewPolicyRule) -> DbResult<PolicyRule> {
        let row: PolicyRow = sqlx::query_as(
            r"
            INSERT INTO policy_rules (feature_id, attribute, operator, value, description)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            ",
        )
        .bind(rule.feature_id.get())
        .bind(&rule.attribute)
        .bind(rule.operator.as_str())
        .bind(&rule.value)
        .bind(rule.description.as_deref())
        .fetch_one(self.pg())
        .await
        .map_err(DbError::from_query)?;
        row.try_into()
    }

    async fn delete_policy(&self, id: PolicyId) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM policy_rules WHERE id = $1")
            .bind(id.get())
            .execute(self.pg())
            .await
            .map_err(DbError::from_query)?;
        Ok(result.rows_affected() > 0)
    }
}

/// Shared WHERE/ORDER/LIMIT tail for audit reads. `$1..$4` are bound by [`bind_query`].
fn audit_filter(user_column: &str) -> String {
    format!(
        r"
        WHERE ($1::BIGINT IS NULL OR {user_column} = $1)
          AND ($2::TIMESTAMPTZ IS NULL OR created_at >= $2)
          AND ($3::TIMESTAMPTZ IS NULL OR created_at < $3)
        ORDER BY created_at DESC, id DESC
        LIMIT $4
        "
    )
}

fn bind_query<'q, O>(
    query: sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments>,
    filter: &AuditQuery,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments> {
    query
        .bind(filter.user_id.map(UserId::get))
        .bind(filter.since)
        .bind(filter.until)
        .bind(filter.limit)
}

/// Same window as [`audit_filter`] without ordering or limit, for aggregates.
fn audit_window(user_column: &str) -> String {
    format!(
        r"
        WHERE ($1::BIGINT IS NULL OR {user_column} = $1)
          AND ($2::TIMESTAMPTZ IS NULL OR created_at >= $2)
          AND ($3::TIMESTAMPTZ IS NULL OR created_at < $3)
        "
    )
}

fn bind_window<'q, O>(
    query: sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments>,
    filter: &AuditQuery,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments> {
    query
        .bind(filter.user_id.map(UserId::get))
        .bind(filter.since)
        .bind(filter.until)
}

fn to_count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

fn tally(rows: Vec<(String, i64)>) -> BTreeMap<String, u64> {
    rows.into_iter().map(|(key, n)| (key, to_count(n))).collect()
}

#[async_trait]
impl AuditRepository for PgStore {
    async fn append_access_log(&self, entry: NewAccessLog) -> DbResult<AccessLog> {
        let row: AccessLogRow = sqlx::query_as(
            r"
            INSERT INTO access_logs (user_id, role, feature, path, method, decision, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            ",
        )
        .bind(entry.user_id.map(UserId::get))
        .bind(entry.role.as_deref())
        .bind(entry.feature.as_deref())
        .bind(&entry.path)
        .bind(&entry.method)
        .bind(entry.decision.as_str())
        .bind(entry.reason.as_deref())
        .bind(entry.created_at)
        .fetch_one(self.pg())
        .await
        .map_err(DbError::from_query)?;
        row.try_into()
    }

    async fn append_policy_violation(
        &self,
        entry: NewPolicyViolation,
    ) -> DbResult<PolicyViolation> {
        let row: ViolationRow = sqlx::query_as(
            r"
            INSERT INTO policy_violations
                (user_id, feature_id, feature, policy_id, attribute, expected_value, actual_value, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            ",
        )
        .bind(entry.user_id.get())
        .bind(entry.feature_id.map(FeatureId::get))
        .bind(&entry.feature)
        .bind(entry.policy_id.map(PolicyId::get))
        .bind(&entry.attribute)
        .bind(&entry.expected_value)
        .bind(entry.actual_value.as_deref())
        .bind(entry.created_at)
        .fetch_one(self.pg())
        .await
        .map_err(DbError::from_query)?;
        Ok(row.into())
    }

    async fn append_change_history(&self, entry: NewChangeHistory) -> DbResult<ChangeHistory> {
        let row: ChangeRow = sqlx::query_as(
            r"
            INSERT INTO change_history (actor_id, entity_type, entity_id, action, before, after, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            ",
        )
        .bind(entry.actor_id.map(UserId::get))
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(entry.action.as_str())
        .bind(entry.before.as_ref().map(Json))
        .bind(entry.after.as_ref().map(Json))
        .bind(entry.created_at)
        .fetch_one(self.pg())
        .await
        .map_err(DbError::from_query)?;
        row.try_into()
    }

    async fn append_session_log(&self, entry: NewSessionLog) -> DbResult<SessionLog> {
        let row: SessionRow = sqlx::query_as(
            r"
            INSERT INTO session_logs
                (user_id, email, action, success, failure_reason, ip_address, user_agent, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            ",
        )
        .bind(entry.user_id.map(UserId::get))
        .bind(entry.email.as_deref())
        .bind(entry.action.as_str())
        .bind(entry.success)
        .bind(entry.failure_reason.as_deref())
        .bind(entry.ip_address.as_deref())
        .bind(entry.user_agent.as_deref())
        .bind(entry.created_at)
        .fetch_one(self.pg())
        .await
        .map_err(DbError::from_query)?;
        row.try_into()
    }

    async fn list_access_logs(&self, query: &AuditQuery) -> DbResult<Vec<AccessLog>> {
        let sql = format!("SELECT * FROM access_logs {}", audit_filter("user_id"));
        let rows: Vec<AccessLogRow> = bind_query(sqlx::query_as(&sql), query)
            .fetch_all(self.pg())
            .await
            .map_err(DbError::from_query)?;
        convert_all(rows)
    }

    async fn list_policy_violations(&self, query: &AuditQuery) -> DbResult<Vec<PolicyViolation>> {
        let sql = format!("SELECT * FROM policy_violations {}", audit_filter("user_id"));
        let rows: Vec<ViolationRow> = bind_query(sqlx::query_as(&sql), query)
            .fetch_all(self.pg())
            .await
            .map_err(DbError::from_query)?;
        Ok(rows.into_iter().map(PolicyViolation::from).collect())
    }

    async fn list_change_history(&self, query: &AuditQuery) -> DbResult<Vec<ChangeHistory>> {
        let sql = format!("SELECT * FROM change_history {}", audit_filter("actor_id"));
        let rows: Vec<ChangeRow> = bind_query(sqlx::query_as(&sql), query)
            .fetch_all(self.pg())
            .await
            .map_err(DbError::from_query)?;
        convert_all(rows)
    }

    async fn list_session_logs(&self, query: &AuditQuery) -> DbResult<Vec<SessionLog>> {
        let sql = format!("SELECT * FROM session_logs {}", audit_filter("user_id"));
        let rows: Vec<SessionRow> = bind_query(sqlx::query_as(&sql), query)
            .fetch_all(self.pg())
            .await
            .map_err(DbError::from_query)?;
        convert_all(rows)
    }

    async fn summarize_access_logs(&self, query: &AuditQuery) -> DbResult<AccessLogSummary> {
        let sql = format!(
            r"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE decision = 'allow'),
                   COUNT(DISTINCT user_id),
                   COUNT(DISTINCT path)
            FROM access_logs {}
            ",
            audit_window("user_id")
        );
        let (total, allowed, users, paths): (i64, i64, i64, i64) =
            bind_window(sqlx::query_as(&sql), query)
                .fetch_one(self.pg())
                .await
                .map_err(DbError::from_query)?;
        Ok(AccessLogSummary {
            total: to_count(total),
            allowed: to_count(allowed),
            unique_users: to_count(users),
            unique_paths: to_count(paths),
        })
    }

    async fn summarize_policy_violations(
        &self,
        query: &AuditQuery,
    ) -> DbResult<ViolationSummary> {
        let window = audit_window("user_id");
        let totals_sql =
            format!("SELECT COUNT(*), COUNT(DISTINCT user_id) FROM policy_violations {window}");
        let (total, users): (i64, i64) = bind_window(sqlx::query_as(&totals_sql), query)
            .fetch_one(self.pg())
            .await
            .map_err(DbError::from_query)?;

        let by_sql = format!(
            "SELECT attribute, COUNT(*) FROM policy_violations {window} GROUP BY attribute"
        );
        let by_attribute: Vec<(String, i64)> = bind_window(sqlx::query_as(&by_sql), query)
            .fetch_all(self.pg())
            .await
            .map_err(DbError::from_query)?;

        Ok(ViolationSummary {
            total: to_count(total),
            by_attribute: tally(by_attribute),
            unique_users: to_count(users),
        })
    }

    async fn summarize_session_logs(&self, query: &AuditQuery) -> DbResult<SessionLogSummary> {
        let sql = format!(
            r"
            SELECT action, COUNT(*), COUNT(*) FILTER (WHERE success)
            FROM session_logs {}
            GROUP BY action
            ",
            audit_window("user_id")
        );
        let rows: Vec<(String, i64, i64)> = bind_window(sqlx::query_as(&sql), query)
            .fetch_all(self.pg())
            .await
            .map_err(DbError::from_query)?;

        let mut summary = SessionLogSummary::default();
        for (action, count, successful) in rows {
            summary.total += to_count(count);
            summary.successful += to_count(successful);
            summary.by_action.insert(action, to_count(count));
        }
        Ok(summary)
    }
}

#[async_trait]
impl RefreshTokenRepository for PgStore {
    async fn insert_refresh_token(&self, token: NewRefreshToken) -> DbResult<RefreshTokenRecord> {
        let row: RefreshTokenRow = sqlx::query_as(
            r"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            RETURNING *
            ",
        )
        .bind(token.user_id.get())
        .bind(&token.token_hash)
        .bind(token.expires_at)
        .fetch_one(self.pg())
        .await
        .map_err(DbError::from_query)?;
        Ok(row.into())
    }

    async fn find_refresh_token_by_hash(
        &self,
        hash: &str,
    ) -> DbResult<Option<RefreshTokenRecord>> {
        let row: Option<RefreshTokenRow> =
            sqlx::query_as("SELECT * FROM refresh_tokens WHERE token_hash = $1")
                .bind(hash)
                .fetch_optional(self.pg())
                .await
                .map_err(DbError::from_query)?;
        Ok(row.map(RefreshTokenRecord::from))
    }

    async fn revoke_refresh_token(&self, id: i64, at: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2 WHERE id = $1 AND revoked_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .execute(self.pg())
        .await
        .map_err(DbError::from_query)?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_user_refresh_tokens(&self, user_id: UserId, at: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2 WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id.get())
        .bind(at)
        .execute(self.pg())
        .await
        .map_err(DbError::from_query)?;
        Ok(result.rows_affected())
    }
}
