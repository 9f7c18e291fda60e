//! Access administration: roles, features, the permission matrix, route
//! mappings, policy rules and user attributes.
//!
//! Every mutation appends a ChangeHistory entry with before/after snapshots.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use warden_core::{FeatureId, PolicyId, RoleId, UserId};
use warden_db::models::user::{MAX_LEVEL, MIN_LEVEL};
use warden_db::models::{
    ChangeAction, CrudAction, Feature, NewChangeHistory, NewFeature, NewPolicyRule, NewRole,
    NewRouteFeature, PolicyRule, Role, RoleFeature, RoleUpdate, RouteFeature, User,
    UserAttributesUpdate, UserProfile,
};
use warden_db::Repository;

use crate::abac::validate_rule;
use crate::audit::AuditRecorder;
use crate::error::{AuthorizationError, Result};

/// Partial update of a permission matrix cell. `None` keeps the stored bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionPatch {
    pub create: Option<bool>,
    pub read: Option<bool>,
    pub update: Option<bool>,
    pub delete: Option<bool>,
}

impl PermissionPatch {
    #[must_use]
    pub fn grant(action: CrudAction) -> Self {
        Self::default().with(action, true)
    }

    #[must_use]
    pub fn with(mut self, action: CrudAction, allowed: bool) -> Self {
        let slot = match action {
            CrudAction::Create => &mut self.create,
            CrudAction::Read => &mut self.read,
            CrudAction::Update => &mut self.update,
            CrudAction::Delete => &mut self.delete,
        };
        *slot = Some(allowed);
        self
    }

    fn apply(&self, cell: &mut RoleFeature) {
        if let Some(v) = self.create {
            cell.can_create = v;
        }
        if let Some(v) = self.read {
            cell.can_read = v;
        }
        if let Some(v) = self.update {
            cell.can_update = v;
        }
        if let Some(v) = self.delete {
            cell.can_delete = v;
        }
    }
}

/// Administrative operations over authorization data.
#[derive(Clone)]
pub struct AccessAdminService {
    store: Arc<dyn Repository>,
    audit: AuditRecorder,
}

impl AccessAdminService {
    pub fn new(store: Arc<dyn Repository>, audit: AuditRecorder) -> Self {
        Self { store, audit }
    }

    // ---- roles ----

    pub async fn create_role(&self, actor: Option<UserId>, role: NewRole) -> Result<Role> {
        let name = required("name", &role.name)?;
        if self.store.find_role_by_name(&name).await?.is_some() {
            return Err(AuthorizationError::Conflict(format!(
                "role '{name}' already exists"
            )));
        }

        let created = self
            .store
            .create_role(NewRole {
                name,
                description: role.description,
                grants_all: role.grants_all,
            })
            .await?;
        self.changed(actor, "role", created.id, ChangeAction::Create, None, snapshot(&created))
            .await;
        Ok(created)
    }

    pub async fn update_role(
        &self,
        actor: Option<UserId>,
        id: RoleId,
        update: RoleUpdate,
    ) -> Result<Role> {
        let before = self.role(id).await?;
        let mut update = update;
        if let Some(name) = &update.name {
            let name = required("name", name)?;
            if let Some(other) = self.store.find_role_by_name(&name).await? {
                if other.id != id {
                    return Err(AuthorizationError::Conflict(format!(
                        "role '{name}' already exists"
                    )));
                }
            }
            update.name = Some(name);
        }

        let after = self.store.update_role(id, &update).await?;
        self.changed(
            actor,
            "role",
            id,
            ChangeAction::Update,
            snapshot(&before),
            snapshot(&after),
        )
        .await;
        Ok(after)
    }

    /// Rejected while any user holds the role.
    pub async fn delete_role(&self, actor: Option<UserId>, id: RoleId) -> Result<()> {
        let before = self.role(id).await?;
        let assigned = self.store.count_role_assignments(id).await?;
        if assigned > 0 {
            return Err(AuthorizationError::Conflict(format!(
                "role '{}' is assigned to {assigned} user(s)",
                before.name
            )));
        }

        self.store.delete_role(id).await?;
        self.changed(actor, "role", id, ChangeAction::Delete, snapshot(&before), None)
            .await;
        Ok(())
    }

    /// Returns `false` when the user already held the role.
    pub async fn assign_role(&self, actor: Option<UserId>, user: UserId, role: RoleId) -> Result<bool> {
        self.user(user).await?;
        let role = self.role(role).await?;
        let assigned = self.store.assign_role(user, role.id).await?;
        if assigned {
            let entry = serde_json::json!({ "user_id": user, "role": role.name });
            self.changed(actor, "user_role", format!("{user}:{}", role.id), ChangeAction::Create, None, Some(entry))
                .await;
        }
        Ok(assigned)
    }

    /// Returns `false` when the user did not hold the role.
    pub async fn revoke_role(&self, actor: Option<UserId>, user: UserId, role: RoleId) -> Result<bool> {
        let role = self.role(role).await?;
        let revoked = self.store.revoke_role(user, role.id).await?;
        if revoked {
            let entry = serde_json::json!({ "user_id": user, "role": role.name });
            self.changed(actor, "user_role", format!("{user}:{}", role.id), ChangeAction::Delete, Some(entry), None)
                .await;
        }
        Ok(revoked)
    }

    // ---- features and the permission matrix ----

    pub async fn create_feature(&self, actor: Option<UserId>, feature: NewFeature) -> Result<Feature> {
        let name = required("name", &feature.name)?;
        if self.store.find_feature_by_name(&name).await?.is_some() {
            return Err(AuthorizationError::Conflict(format!(
                "feature '{name}' already exists"
            )));
        }

        let created = self
            .store
            .create_feature(NewFeature {
                name,
                description: feature.description,
            })
            .await?;
        self.changed(actor, "feature", created.id, ChangeAction::Create, None, snapshot(&created))
            .await;
        Ok(created)
    }

    /// Rejected while any permission cell or route mapping points at the feature.
    pub async fn delete_feature(&self, actor: Option<UserId>, id: FeatureId) -> Result<()> {
        let before = self.feature(id).await?;
        let refs = self.store.count_feature_references(id).await?;
        if refs.is_referenced() {
            return Err(AuthorizationError::Conflict(format!(
                "feature '{}' is referenced by {} permission(s) and {} route(s)",
                before.name, refs.role_features, refs.route_features
            )));
        }

        self.store.delete_feature(id).await?;
        self.changed(actor, "feature", id, ChangeAction::Delete, snapshot(&before), None)
            .await;
        Ok(())
    }

    /// Upsert the (role, feature) cell. New cells start all-false.
    pub async fn set_permission(
        &self,
        actor: Option<UserId>,
        role: RoleId,
        feature: FeatureId,
        patch: PermissionPatch,
    ) -> Result<RoleFeature> {
        self.role(role).await?;
        self.feature(feature).await?;

        let existing = self.store.find_role_feature(role, feature).await?;
        let mut cell = existing.unwrap_or_else(|| RoleFeature::empty(role, feature));
        patch.apply(&mut cell);
        let stored = self.store.upsert_role_feature(cell).await?;

        let action = if existing.is_some() {
            ChangeAction::Update
        } else {
            ChangeAction::Create
        };
        self.changed(
            actor,
            "role_feature",
            format!("{role}:{feature}"),
            action,
            existing.as_ref().and_then(snapshot),
            snapshot(&stored),
        )
        .await;
        Ok(stored)
    }

    /// Point (path, method) at a feature, replacing any previous mapping.
    pub async fn map_route(
        &self,
        actor: Option<UserId>,
        route: NewRouteFeature,
    ) -> Result<RouteFeature> {
        let path = route.path.trim().to_string();
        if !path.starts_with('/') {
            return Err(AuthorizationError::validation("path", "must start with '/'"));
        }
        let method = route.method.trim().to_ascii_uppercase();
        if CrudAction::from_http_method(&method).is_none() {
            return Err(AuthorizationError::validation(
                "method",
                format!("unsupported method '{method}'"),
            ));
        }
        self.feature(route.feature_id).await?;

        let before = self.store.find_route_feature(&path, &method).await?;
        let stored = self
            .store
            .upsert_route_feature(NewRouteFeature {
                path: path.clone(),
                method: method.clone(),
                feature_id: route.feature_id,
            })
            .await?;
        let action = if before.is_some() {
            ChangeAction::Update
        } else {
            ChangeAction::Create
        };
        self.changed(
            actor,
            "route_feature",
            format!("{method} {path}"),
            action,
            before.as_ref().and_then(snapshot),
            snapshot(&stored),
        )
        .await;
        Ok(stored)
    }

    // ---- policies ----

    pub async fn add_policy(&self, actor: Option<UserId>, rule: NewPolicyRule) -> Result<PolicyRule> {
        let attribute = required("attribute", &rule.attribute)?;
        validate_rule(rule.operator, &rule.value)?;
        self.feature(rule.feature_id).await?;

        let created = self
            .store
            .create_policy(NewPolicyRule { attribute, ..rule })
            .await?;
        self.changed(actor, "policy", created.id, ChangeAction::Create, None, snapshot(&created))
            .await;
        Ok(created)
    }

    pub async fn remove_policy(&self, actor: Option<UserId>, id: PolicyId) -> Result<()> {
        if !self.store.delete_policy(id).await? {
            return Err(AuthorizationError::not_found("policy", id));
        }
        self.changed(actor, "policy", id, ChangeAction::Delete, None, None)
            .await;
        Ok(())
    }

    // ---- users ----

    pub async fn update_user_attributes(
        &self,
        actor: Option<UserId>,
        user: UserId,
        patch: UserAttributesUpdate,
    ) -> Result<UserProfile> {
        if patch.is_empty() {
            return Err(AuthorizationError::validation("body", "nothing to update"));
        }
        if let Some(level) = patch.level {
            if !(MIN_LEVEL..=MAX_LEVEL).contains(&level) {
                return Err(AuthorizationError::validation(
                    "level",
                    format!("must be between {MIN_LEVEL} and {MAX_LEVEL}"),
                ));
            }
        }
        if patch.custom_attributes.as_ref().is_some_and(|v| !v.is_object()) {
            return Err(AuthorizationError::validation(
                "custom_attributes",
                "must be a JSON object",
            ));
        }
        let mut patch = patch;
        if let Some(name) = &patch.name {
            patch.name = Some(required("name", name)?);
        }

        let before = self.user(user).await?.profile();
        let after = self.store.update_user_attributes(user, &patch).await?.profile();
        self.changed(
            actor,
            "user",
            user,
            ChangeAction::Update,
            snapshot(&before),
            snapshot(&after),
        )
        .await;
        Ok(after)
    }

    /// Soft enable/disable. Tokens of a disabled user stop working immediately.
    pub async fn set_user_active(
        &self,
        actor: Option<UserId>,
        user: UserId,
        active: bool,
    ) -> Result<UserProfile> {
        let before = self.user(user).await?.profile();
        let after = self.store.set_user_active(user, active).await?.profile();
        self.changed(
            actor,
            "user",
            user,
            ChangeAction::Update,
            snapshot(&before),
            snapshot(&after),
        )
        .await;
        Ok(after)
    }

    // ---- lookups ----

    async fn role(&self, id: RoleId) -> Result<Role> {
        self.store
            .find_role_by_id(id)
            .await?
            .ok_or_else(|| AuthorizationError::not_found("role", id))
    }

    async fn feature(&self, id: FeatureId) -> Result<Feature> {
        self.store
            .find_feature_by_id(id)
            .await?
            .ok_or_else(|| AuthorizationError::not_found("feature", id))
    }

    async fn user(&self, id: UserId) -> Result<User> {
        self.store
            .find_user_by_id(id)
            .await?
            .ok_or_else(|| AuthorizationError::not_found("user", id))
    }

    async fn changed(
        &self,
        actor: Option<UserId>,
        entity_type: &str,
        entity_id: impl ToString,
        action: ChangeAction,
        before: Option<Value>,
        after: Option<Value>,
    ) {
        self.audit
            .log_change_history(NewChangeHistory {
                actor_id: actor,
                entity_type: entity_type.to_string(),
                entity_id: entity_id.to_string(),
                action,
                before,
                after,
                created_at: Utc::now(),
            })
            .await;
    }
}

fn required(field: &'static str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AuthorizationError::validation(field, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn snapshot<T: Serialize>(value: &T) -> Option<Value> {
    serde_json::to_value(value).ok()
}
