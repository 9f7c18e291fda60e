//! ABAC policy rules bound to features.

use super::text_enum;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_core::{FeatureId, PolicyId};

/// Comparison applied between a user attribute and a rule's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyOperator {
    /// `value` is a plain string.
    Equals,
    /// `value` is a JSON array.
    In,
    /// `value` is a JSON object `{"min": n, "max": n}`, bounds inclusive and optional.
    Range,
}

text_enum!(PolicyOperator, "operator", {
    Equals => "equals",
    In => "in",
    Range => "range",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: PolicyId,
    pub feature_id: FeatureId,
    pub attribute: String,
    pub operator: PolicyOperator,
    pub value: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPolicyRule {
    pub feature_id: FeatureId,
    pub attribute: String,
    pub operator: PolicyOperator,
    pub value: String,
    pub description: Option<String>,
}
