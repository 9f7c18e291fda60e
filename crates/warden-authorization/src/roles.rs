//! RBAC: role resolution and the permission matrix check.
//!
//! Permissions are purely additive. A user's grant for (feature, action) is the
//! OR over every assigned role, and a `grants_all` role short-circuits the whole
//! check. Nothing is cached between calls.

use std::sync::Arc;

use async_trait::async_trait;
use warden_core::{RoleId, UserId};
use warden_db::models::{CrudAction, Feature, Role, RoleFeature};
use warden_db::{DbResult, FeatureRepository, RoleRepository};

use crate::error::Result;

/// Lookups the permission engine needs from storage.
#[async_trait]
pub trait RoleResolver: Send + Sync {
    async fn roles_for_user(&self, user_id: UserId) -> DbResult<Vec<Role>>;

    async fn feature_by_name(&self, name: &str) -> DbResult<Option<Feature>>;

    async fn permission_cell(
        &self,
        role_id: RoleId,
        feature: &Feature,
    ) -> DbResult<Option<RoleFeature>>;
}

#[async_trait]
impl<S> RoleResolver for S
where
    S: RoleRepository + FeatureRepository + ?Sized,
{
    async fn roles_for_user(&self, user_id: UserId) -> DbResult<Vec<Role>> {
        self.find_roles_by_user_id(user_id).await
    }

    async fn feature_by_name(&self, name: &str) -> DbResult<Option<Feature>> {
        self.find_feature_by_name(name).await
    }

    async fn permission_cell(
        &self,
        role_id: RoleId,
        feature: &Feature,
    ) -> DbResult<Option<RoleFeature>> {
        self.find_role_feature(role_id, feature.id).await
    }
}

/// Result of an RBAC evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RbacOutcome {
    /// A `grants_all` role matched; no feature lookup was made.
    GrantsAll { role: String },
    Granted { feature: Feature, role: String },
    Denied { feature: Feature },
    /// Fail-closed: the feature does not exist.
    UnknownFeature,
}

impl RbacOutcome {
    #[must_use]
    pub fn is_granted(&self) -> bool {
        matches!(self, RbacOutcome::GrantsAll { .. } | RbacOutcome::Granted { .. })
    }
}

/// Answers "can user U do action A on feature F".
#[derive(Clone)]
pub struct PermissionEngine {
    resolver: Arc<dyn RoleResolver>,
}

impl PermissionEngine {
    pub fn new(resolver: Arc<dyn RoleResolver>) -> Self {
        Self { resolver }
    }

    /// All roles assigned to the user, in no particular order.
    pub async fn get_user_roles(&self, user_id: UserId) -> Result<Vec<Role>> {
        Ok(self.resolver.roles_for_user(user_id).await?)
    }

    /// Boolean RBAC check. Lookup failures deny.
    pub async fn check(&self, user_id: UserId, feature: &str, action: CrudAction) -> bool {
        let outcome = match self.get_user_roles(user_id).await {
            Ok(roles) => self.evaluate(&roles, feature, action).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(outcome) => outcome.is_granted(),
            Err(e) => {
                tracing::error!(
                    target: "authorization",
                    error = %e,
                    user_id = %user_id,
                    feature,
                    "RBAC lookup failed, denying"
                );
                false
            }
        }
    }

    /// Evaluate with already-loaded roles, resolving the feature by name.
    pub async fn evaluate(
        &self,
        roles: &[Role],
        feature: &str,
        action: CrudAction,
    ) -> Result<RbacOutcome> {
        if let Some(role) = roles.iter().find(|r| r.grants_all) {
            return Ok(RbacOutcome::GrantsAll {
                role: role.name.clone(),
            });
        }

        let Some(resolved) = self.resolver.feature_by_name(feature).await? else {
            tracing::warn!(
                target: "authorization",
                feature,
                "Unknown feature, denying"
            );
            return Ok(RbacOutcome::UnknownFeature);
        };

        self.evaluate_feature(roles, resolved, action).await
    }

    /// Evaluate against a feature that has already been resolved.
    pub async fn evaluate_feature(
        &self,
        roles: &[Role],
        feature: Feature,
        action: CrudAction,
    ) -> Result<RbacOutcome> {
        if let Some(role) = roles.iter().find(|r| r.grants_all) {
            return Ok(RbacOutcome::GrantsAll {
                role: role.name.clone(),
            });
        }

        for role in roles {
            let cell = self.resolver.permission_cell(role.id, &feature).await?;
            if cell.is_some_and(|c| c.allows(action)) {
                return Ok(RbacOutcome::Granted {
                    feature,
                    role: role.name.clone(),
                });
            }
        }

        Ok(RbacOutcome::Denied { feature })
    }
}
