//! Features, the RBAC permission matrix, and route-to-feature mappings.

use super::text_enum;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_core::{FeatureId, RoleId};

/// A protected capability, e.g. `user_management`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub id: FeatureId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFeature {
    pub name: String,
    pub description: Option<String>,
}

/// How many rows still point at a feature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureReferences {
    pub role_features: i64,
    pub route_features: i64,
}

impl FeatureReferences {
    #[must_use]
    pub fn is_referenced(&self) -> bool {
        self.role_features > 0 || self.route_features > 0
    }
}

/// The four operations a RoleFeature cell can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrudAction {
    Create,
    Read,
    Update,
    Delete,
}

text_enum!(CrudAction, "action", {
    Create => "create",
    Read => "read",
    Update => "update",
    Delete => "delete",
});

impl CrudAction {
    /// GET/HEAD read, POST create, PUT/PATCH update, DELETE delete.
    #[must_use]
    pub fn from_http_method(method: &str) -> Option<Self> {
        match method.to_ascii_uppercase().as_str() {
            "GET" | "HEAD" => Some(CrudAction::Read),
            "POST" => Some(CrudAction::Create),
            "PUT" | "PATCH" => Some(CrudAction::Update),
            "DELETE" => Some(CrudAction::Delete),
            _ => None,
        }
    }
}

/// One cell of the permission matrix. Every bit defaults to `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleFeature {
    pub role_id: RoleId,
    pub feature_id: FeatureId,
    pub can_create: bool,
    pub can_read: bool,
    pub can_update: bool,
    pub can_delete: bool,
}

impl RoleFeature {
    #[must_use]
    pub fn empty(role_id: RoleId, feature_id: FeatureId) -> Self {
        Self {
            role_id,
            feature_id,
            can_create: false,
            can_read: false,
            can_update: false,
            can_delete: false,
        }
    }

    #[must_use]
    pub fn allows(&self, action: CrudAction) -> bool {
        match action {
            CrudAction::Create => self.can_create,
            CrudAction::Read => self.can_read,
            CrudAction::Update => self.can_update,
            CrudAction::Delete => self.can_delete,
        }
    }
}

/// Maps a concrete route and verb to the feature it touches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteFeature {
    pub path: String,
    /// Upper-case HTTP method.
    pub method: String,
    pub feature_id: FeatureId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRouteFeature {
    pub path: String,
    pub method: String,
    pub feature_id: FeatureId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_feature_defaults_to_deny() {
        let cell = RoleFeature::empty(RoleId::new(1), FeatureId::new(1));
        for action in CrudAction::ALL {
            assert!(!cell.allows(*action));
        }
    }

    #[test]
    fn test_allows_reads_matching_bit() {
        let cell = RoleFeature {
            can_read: true,
            can_update: true,
            ..RoleFeature::empty(RoleId::new(1), FeatureId::new(2))
        };
        assert!(cell.allows(CrudAction::Read));
        assert!(cell.allows(CrudAction::Update));
        assert!(!cell.allows(CrudAction::Delete));
        assert!(!cell.allows(CrudAction::Create));
    }

    #[test]
    fn test_method_to_action() {
        assert_eq!(CrudAction::from_http_method("get"), Some(CrudAction::Read));
        assert_eq!(CrudAction::from_http_method("POST"), Some(CrudAction::Create));
        assert_eq!(CrudAction::from_http_method("PATCH"), Some(CrudAction::Update));
        assert_eq!(CrudAction::from_http_method("DELETE"), Some(CrudAction::Delete));
        assert_eq!(CrudAction::from_http_method("OPTIONS"), None);
    }

    #[test]
    fn test_action_parse() {
        assert_eq!("Delete".parse::<CrudAction>().unwrap(), CrudAction::Delete);
        assert!("approve".parse::<CrudAction>().is_err());
    }
}
