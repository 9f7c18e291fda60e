//! User accounts and their ABAC attributes.

use super::text_enum;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_core::UserId;

/// Lowest permitted clearance level.
pub const MIN_LEVEL: i16 = 1;
/// Highest permitted clearance level.
pub const MAX_LEVEL: i16 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Department {
    It,
    Hr,
    Finance,
    Sales,
    Marketing,
    Operations,
    Engineering,
    Legal,
}

text_enum!(Department, "department", {
    It => "IT",
    Hr => "HR",
    Finance => "FINANCE",
    Sales => "SALES",
    Marketing => "MARKETING",
    Operations => "OPERATIONS",
    Engineering => "ENGINEERING",
    Legal => "LEGAL",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Region {
    Headquarters,
    North,
    South,
    East,
    West,
    Overseas,
}

text_enum!(Region, "region", {
    Headquarters => "HEADQUARTERS",
    North => "NORTH",
    South => "SOUTH",
    East => "EAST",
    West => "WEST",
    Overseas => "OVERSEAS",
});

/// A stored user. Never serialized directly: use [`UserProfile`] on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub is_active: bool,
    pub department: Department,
    pub region: Region,
    pub level: i16,
    /// Free-form ABAC attributes, always a JSON object.
    pub custom_attributes: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    #[must_use]
    pub fn profile(&self) -> UserProfile {
        UserProfile::from(self)
    }
}

/// Sanitized view of a user, safe to return from APIs and to snapshot in
/// change history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub is_active: bool,
    pub department: Department,
    pub region: Region,
    pub level: i16,
    pub custom_attributes: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            is_active: user.is_active,
            department: user.department,
            region: user.region,
            level: user.level,
            custom_attributes: user.custom_attributes.clone(),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    /// Stored as given; lookups compare case-insensitively.
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub department: Department,
    pub region: Region,
    pub level: i16,
    pub custom_attributes: serde_json::Value,
}

/// Admin/HR attribute update. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserAttributesUpdate {
    pub name: Option<String>,
    pub department: Option<Department>,
    pub region: Option<Region>,
    pub level: Option<i16>,
    pub custom_attributes: Option<serde_json::Value>,
}

impl UserAttributesUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.department.is_none()
            && self.region.is_none()
            && self.level.is_none()
            && self.custom_attributes.is_none()
    }

    /// Apply onto `user` in place.
    pub fn apply(&self, user: &mut User) {
        if let Some(name) = &self.name {
            user.name.clone_from(name);
        }
        if let Some(department) = self.department {
            user.department = department;
        }
        if let Some(region) = self.region {
            user.region = region;
        }
        if let Some(level) = self.level {
            user.level = level;
        }
        if let Some(custom) = &self.custom_attributes {
            user.custom_attributes.clone_from(custom);
        }
    }
}
