//! Roles and role assignments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_core::{RoleId, UserId};

/// A named role. A role with `grants_all` bypasses every RBAC and ABAC check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub description: Option<String>,
    pub grants_all: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRole {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub grants_all: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub grants_all: Option<bool>,
}

/// A (user, role) assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRole {
    pub user_id: UserId,
    pub role_id: RoleId,
    pub assigned_at: DateTime<Utc>,
}
