//! Append-only audit records: access decisions, policy violations, entity
//! changes and session events.
//!
//! None of these are ever updated or deleted once written.

use super::text_enum;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use warden_core::{FeatureId, PolicyId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessDecision {
    Allow,
    Deny,
}

text_enum!(AccessDecision, "decision", {
    Allow => "allow",
    Deny => "deny",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessLog {
    pub id: i64,
    pub user_id: Option<UserId>,
    /// Comma-separated role names held at decision time.
    pub role: Option<String>,
    pub feature: Option<String>,
    pub path: String,
    pub method: String,
    pub decision: AccessDecision,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccessLog {
    pub user_id: Option<UserId>,
    pub role: Option<String>,
    pub feature: Option<String>,
    pub path: String,
    pub method: String,
    pub decision: AccessDecision,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub id: i64,
    pub user_id: UserId,
    pub feature_id: Option<FeatureId>,
    pub feature: String,
    pub policy_id: Option<PolicyId>,
    pub attribute: String,
    pub expected_value: String,
    /// `None` when the user has no value for the attribute.
    pub actual_value: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPolicyViolation {
    pub user_id: UserId,
    pub feature_id: Option<FeatureId>,
    pub feature: String,
    pub policy_id: Option<PolicyId>,
    pub attribute: String,
    pub expected_value: String,
    pub actual_value: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

text_enum!(ChangeAction, "change action", {
    Create => "create",
    Update => "update",
    Delete => "delete",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeHistory {
    pub id: i64,
    pub actor_id: Option<UserId>,
    pub entity_type: String,
    pub entity_id: String,
    pub action: ChangeAction,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewChangeHistory {
    pub actor_id: Option<UserId>,
    pub entity_type: String,
    pub entity_id: String,
    pub action: ChangeAction,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionAction {
    Login,
    Logout,
    TokenRefresh,
    TokenRevoke,
}

text_enum!(SessionAction, "session action", {
    Login => "login",
    Logout => "logout",
    TokenRefresh => "token_refresh",
    TokenRevoke => "token_revoke",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLog {
    pub id: i64,
    pub user_id: Option<UserId>,
    pub email: Option<String>,
    pub action: SessionAction,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSessionLog {
    pub user_id: Option<UserId>,
    pub email: Option<String>,
    pub action: SessionAction,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Filter for reading audit tables. Window is `[since, until)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditQuery {
    pub user_id: Option<UserId>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl AuditQuery {
    #[must_use]
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    /// Whether a row owned by `user_id` and written at `at` falls inside this query.
    #[must_use]
    pub fn matches(&self, user_id: Option<UserId>, at: DateTime<Utc>) -> bool {
        self.user_id.is_none_or(|wanted| user_id == Some(wanted))
            && self.since.is_none_or(|since| at >= since)
            && self.until.is_none_or(|until| at < until)
    }
}

/// Counts over `access_logs` inside an [`AuditQuery`] window. `limit` is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessLogSummary {
    pub total: u64,
    pub allowed: u64,
    pub unique_users: u64,
    pub unique_paths: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationSummary {
    pub total: u64,
    pub by_attribute: BTreeMap<String, u64>,
    pub unique_users: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLogSummary {
    pub total: u64,
    pub successful: u64,
    /// Keyed by [`SessionAction::as_str`].
    pub by_action: BTreeMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_query_window_is_half_open() {
        let now = Utc::now();
        let query = AuditQuery {
            since: Some(now),
            until: Some(now + Duration::minutes(1)),
            ..AuditQuery::default()
        };
        assert!(query.matches(None, now));
        assert!(!query.matches(None, now + Duration::minutes(1)));
        assert!(!query.matches(None, now - Duration::seconds(1)));
    }

    #[test]
    fn test_query_user_filter() {
        let query = AuditQuery::for_user(UserId::new(4));
        let now = Utc::now();
        assert!(query.matches(Some(UserId::new(4)), now));
        assert!(!query.matches(Some(UserId::new(5)), now));
        assert!(!query.matches(None, now));
    }

    #[test]
    fn test_session_action_text() {
        assert_eq!(SessionAction::TokenRefresh.as_str(), "token_refresh");
        assert_eq!(
            "TOKEN_REVOKE".parse::<SessionAction>().unwrap(),
            SessionAction::TokenRevoke
        );
    }
}
