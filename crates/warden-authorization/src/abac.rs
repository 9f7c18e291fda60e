//! Attribute-Based Access Control (ABAC) rule evaluation.
//!
//! Compares one user attribute against one [`PolicyRule`]. Missing attributes
//! and unreadable rule values never satisfy a rule.

use serde::Deserialize;
use serde_json::{Map, Value};
use warden_db::models::{PolicyOperator, PolicyRule, User};

use crate::error::{AuthorizationError, Result};

/// Outcome of checking a single rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    Satisfied,
    /// `actual` is `None` when the user has no value for the attribute.
    Violated { actual: Option<String> },
}

impl RuleOutcome {
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        matches!(self, RuleOutcome::Satisfied)
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
struct RangeBounds {
    min: Option<f64>,
    max: Option<f64>,
}

/// The attribute bag a user is evaluated with.
///
/// `custom_attributes` first, then the built-in `department`, `region` and
/// `level`, which cannot be shadowed by custom keys.
#[must_use]
pub fn user_attributes(user: &User) -> Value {
    let mut attrs = match &user.custom_attributes {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    attrs.insert(
        "department".to_string(),
        Value::String(user.department.as_str().to_string()),
    );
    attrs.insert(
        "region".to_string(),
        Value::String(user.region.as_str().to_string()),
    );
    attrs.insert("level".to_string(), Value::from(user.level));
    Value::Object(attrs)
}

/// Evaluate `rule` against the attribute bag.
#[must_use]
pub fn evaluate_rule(attributes: &Value, rule: &PolicyRule) -> RuleOutcome {
    let actual = match attributes.get(&rule.attribute) {
        None | Some(Value::Null) => return RuleOutcome::Violated { actual: None },
        Some(v) => v,
    };

    let satisfied = match rule.operator {
        PolicyOperator::Equals => values_match(actual, &Value::String(rule.value.clone())),
        PolicyOperator::In => match parse_set(&rule.value) {
            Ok(set) => set.iter().any(|expected| values_match(actual, expected)),
            Err(e) => {
                report_malformed(rule, &e);
                false
            }
        },
        PolicyOperator::Range => match parse_range(&rule.value) {
            Ok(bounds) => value_to_f64(actual).is_some_and(|n| {
                bounds.min.is_none_or(|min| n >= min) && bounds.max.is_none_or(|max| n <= max)
            }),
            Err(e) => {
                report_malformed(rule, &e);
                false
            }
        },
    };

    if satisfied {
        RuleOutcome::Satisfied
    } else {
        RuleOutcome::Violated {
            actual: Some(attribute_text(actual)),
        }
    }
}

/// Reject rule values the evaluator could not interpret.
pub fn validate_rule(operator: PolicyOperator, value: &str) -> Result<()> {
    match operator {
        PolicyOperator::Equals => {
            if value.trim().is_empty() {
                return Err(AuthorizationError::validation(
                    "value",
                    "equals rule needs a non-empty value",
                ));
            }
        }
        PolicyOperator::In => {
            let set = parse_set(value)?;
            if set.is_empty() {
                return Err(AuthorizationError::validation(
                    "value",
                    "in rule needs at least one value",
                ));
            }
        }
        PolicyOperator::Range => {
            parse_range(value)?;
        }
    }
    Ok(())
}

/// Display form of an attribute value for violation records.
#[must_use]
pub fn attribute_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_set(value: &str) -> Result<Vec<Value>> {
    serde_json::from_str::<Vec<Value>>(value).map_err(|e| {
        AuthorizationError::InvalidPolicy(format!("in rule value must be a JSON array: {e}"))
    })
}

fn parse_range(value: &str) -> Result<RangeBounds> {
    let bounds: RangeBounds = serde_json::from_str(value).map_err(|e| {
        AuthorizationError::InvalidPolicy(format!(
            "range rule value must be {{\"min\":n,\"max\":n}}: {e}"
        ))
    })?;
    match (bounds.min, bounds.max) {
        (None, None) => Err(AuthorizationError::InvalidPolicy(
            "range rule needs min or max".to_string(),
        )),
        (Some(min), Some(max)) if min > max => Err(AuthorizationError::InvalidPolicy(format!(
            "range min {min} exceeds max {max}"
        ))),
        _ => Ok(bounds),
    }
}

fn report_malformed(rule: &PolicyRule, err: &AuthorizationError) {
    tracing::error!(
        target: "authorization",
        policy_id = %rule.id,
        attribute = %rule.attribute,
        error = %err,
        "Unreadable policy rule, treating as violated"
    );
}

/// Numbers compare numerically, everything else as trimmed case-insensitive text.
fn values_match(actual: &Value, expected: &Value) -> bool {
    if let (Some(a), Some(b)) = (value_to_f64(actual), value_to_f64(expected)) {
        return a == b;
    }
    match (scalar_text(actual), scalar_text(expected)) {
        (Some(a), Some(b)) => a.trim().eq_ignore_ascii_case(b.trim()),
        _ => false,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Number, or a string that parses as one.
fn value_to_f64(v: &Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}
