//! Domain records persisted by warden.

pub mod audit;
pub mod feature;
pub mod policy;
pub mod refresh_token;
pub mod role;
pub mod user;

pub use audit::{
    AccessDecision, AccessLog, AccessLogSummary, AuditQuery, ChangeAction, ChangeHistory,
    NewAccessLog, NewChangeHistory, NewPolicyViolation, NewSessionLog, PolicyViolation,
    SessionAction, SessionLog, SessionLogSummary, ViolationSummary,
};
pub use feature::{
    CrudAction, Feature, FeatureReferences, NewFeature, NewRouteFeature, RoleFeature, RouteFeature,
};
pub use policy::{NewPolicyRule, PolicyOperator, PolicyRule};
pub use refresh_token::{NewRefreshToken, RefreshTokenRecord};
pub use role::{NewRole, Role, RoleUpdate, UserRole};
pub use user::{Department, NewUser, Region, User, UserAttributesUpdate, UserProfile};

/// Error returned when a stored enum column holds an unknown value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Implements `as_str`, `Display`, case-insensitive `FromStr` and `TryFrom<String>`
/// for a fieldless enum stored as text.
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// All variants, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::models::UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                $(
                    if trimmed.eq_ignore_ascii_case($text) {
                        return Ok($name::$variant);
                    }
                )+
                Err($crate::models::UnknownVariant {
                    kind: $kind,
                    value: s.to_string(),
                })
            }
        }

        impl TryFrom<String> for $name {
            type Error = $crate::models::UnknownVariant;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }
    };
}

pub(crate) use text_enum;
