//! Decision types shared by the engines and the orchestrator.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use warden_core::{FeatureId, PolicyId, UserId, WardenError};
use warden_db::models::CrudAction;

/// The caller's identity once authentication succeeded.
///
/// Attached to the request for downstream handlers after an Allow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedIdentity {
    pub user_id: UserId,
    pub email: String,
    pub name: String,
    pub roles: Vec<String>,
}

impl ResolvedIdentity {
    /// Role names joined for audit rows.
    #[must_use]
    pub fn role_summary(&self) -> Option<String> {
        if self.roles.is_empty() {
            None
        } else {
            Some(self.roles.join(","))
        }
    }
}

/// What the caller wants to do, when known up front instead of resolved from the route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessTarget {
    pub feature: String,
    pub action: CrudAction,
}

impl AccessTarget {
    pub fn new(feature: impl Into<String>, action: CrudAction) -> Self {
        Self {
            feature: feature.into(),
            action,
        }
    }
}

/// One failed ABAC rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub policy_id: PolicyId,
    pub feature_id: FeatureId,
    pub attribute: String,
    pub expected: String,
    pub actual: Option<String>,
}

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    NoToken,
    InvalidToken,
    InactiveUser,
    InsufficientPermission,
    PolicyViolation,
    UnmappedRoute,
    Timeout,
    Internal,
}

impl DenialKind {
    #[must_use]
    pub fn status(self) -> StatusCode {
        match self {
            DenialKind::NoToken | DenialKind::InvalidToken | DenialKind::InactiveUser => {
                StatusCode::UNAUTHORIZED
            }
            DenialKind::InsufficientPermission
            | DenialKind::PolicyViolation
            | DenialKind::UnmappedRoute => StatusCode::FORBIDDEN,
            DenialKind::Timeout | DenialKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub fn is_unauthenticated(self) -> bool {
        self.status() == StatusCode::UNAUTHORIZED
    }

    /// Tag stored in access log reasons.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            DenialKind::NoToken => "no_token",
            DenialKind::InvalidToken => "invalid_token",
            DenialKind::InactiveUser => "inactive_user",
            DenialKind::InsufficientPermission => "insufficient_permission",
            DenialKind::PolicyViolation => "policy_violation",
            DenialKind::UnmappedRoute => "unmapped_route",
            DenialKind::Timeout => "timeout",
            DenialKind::Internal => "internal_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub kind: DenialKind,
    pub reason: String,
    pub violations: Vec<Violation>,
}

impl Denial {
    pub fn new(kind: DenialKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
            violations: Vec::new(),
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }
}

impl From<&Denial> for WardenError {
    fn from(denial: &Denial) -> Self {
        match denial.kind {
            DenialKind::NoToken => WardenError::authentication("Authentication required"),
            DenialKind::InvalidToken | DenialKind::InactiveUser => {
                WardenError::authentication("Invalid or expired token")
            }
            DenialKind::InsufficientPermission
            | DenialKind::PolicyViolation
            | DenialKind::UnmappedRoute => WardenError::authorization(denial.reason.clone()),
            DenialKind::Timeout | DenialKind::Internal => {
                WardenError::internal(denial.reason.clone())
            }
        }
    }
}

/// Outcome of one authorization request. A deny is a value, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow(ResolvedIdentity),
    Deny(Denial),
}

impl Decision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }

    #[must_use]
    pub fn denial(&self) -> Option<&Denial> {
        match self {
            Decision::Deny(denial) => Some(denial),
            Decision::Allow(_) => None,
        }
    }
}

/// Per-request progress: `Unauthenticated → IdentityResolved → RbacChecked → AbacChecked → Decided`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DecisionStage {
    #[default]
    Unauthenticated,
    IdentityResolved,
    RbacChecked,
    AbacChecked,
    Decided,
}
