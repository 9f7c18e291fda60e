//! Idempotent startup seeding.
//!
//! Ensures the registration default role, an `ADMIN` role that grants every
//! feature, and the `audit` feature guarding the statistics routes.

use std::sync::Arc;

use warden_authorization::{AccessAdminService, AuthorizationError};
use warden_db::models::{Feature, NewFeature, NewRole, NewRouteFeature};
use warden_db::{FeatureRepository, Repository, RoleRepository};

pub const ADMIN_ROLE: &str = "ADMIN";
pub const AUDIT_FEATURE: &str = "audit";
pub const AUDIT_ROUTES: [&str; 3] = [
    "/audit/access-stats",
    "/audit/violation-stats",
    "/audit/session-stats",
];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapResult {
    pub roles_created: usize,
    pub feature_created: bool,
    pub routes_mapped: usize,
}

pub async fn bootstrap_system(
    store: Arc<dyn Repository>,
    admin: &AccessAdminService,
    default_role: &str,
) -> Result<BootstrapResult, AuthorizationError> {
    let mut result = BootstrapResult::default();

    for (name, grants_all) in [(default_role, false), (ADMIN_ROLE, true)] {
        if store.find_role_by_name(name).await?.is_none() {
            admin
                .create_role(
                    None,
                    NewRole {
                        name: name.to_string(),
                        description: None,
                        grants_all,
                    },
                )
                .await?;
            result.roles_created += 1;
        }
    }

    let audit = ensure_feature(&store, admin, &mut result).await?;
    for path in AUDIT_ROUTES {
        if store.find_route_feature(path, "GET").await?.is_none() {
            admin
                .map_route(
                    None,
                    NewRouteFeature {
                        path: path.to_string(),
                        method: "GET".to_string(),
                        feature_id: audit.id,
                    },
                )
                .await?;
            result.routes_mapped += 1;
        }
    }

    Ok(result)
}

async fn ensure_feature(
    store: &Arc<dyn Repository>,
    admin: &AccessAdminService,
    result: &mut BootstrapResult,
) -> Result<Feature, AuthorizationError> {
    if let Some(existing) = store.find_feature_by_name(AUDIT_FEATURE).await? {
        return Ok(existing);
    }
    result.feature_created = true;
    admin
        .create_feature(
            None,
            NewFeature {
                name: AUDIT_FEATURE.to_string(),
                description: Some("Audit statistics".to_string()),
            },
        )
        .await
}
