//! Per-request authorization: identity, then RBAC, then ABAC, then audit.
//!
//! Each request walks `Unauthenticated → IdentityResolved → RbacChecked →
//! AbacChecked → Decided`. Every path through [`AuthorizationOrchestrator::authorize`]
//! ends in exactly one access log append, including timeouts.

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use chrono::Utc;
use warden_auth::TokenCodec;
use warden_core::UserId;
use warden_db::models::{AccessDecision, CrudAction, Feature, NewAccessLog, NewPolicyViolation, User};
use warden_db::Repository;

use crate::audit::AuditRecorder;
use crate::error::AuthorizationError;
use crate::identity::IdentityResolver;
use crate::policy_evaluator::PolicyEngine;
use crate::roles::{PermissionEngine, RbacOutcome};
use crate::types::{AccessTarget, Decision, DecisionStage, Denial, DenialKind, ResolvedIdentity};

/// Default upper bound on one decision.
pub const DEFAULT_DECISION_TIMEOUT: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub decision_timeout: Duration,
    /// Honour `x-user-*` headers from a verifying upstream layer.
    pub trust_identity_headers: bool,
    /// Let requests to routes without a feature mapping through once authenticated.
    pub allow_unmapped_routes: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            decision_timeout: DEFAULT_DECISION_TIMEOUT,
            trust_identity_headers: false,
            allow_unmapped_routes: false,
        }
    }
}

/// One request to authorize.
#[derive(Debug, Clone)]
pub struct AccessRequest {
    pub method: String,
    pub path: String,
    pub headers: HeaderMap,
    /// Explicit (feature, action). When `None` the route mapping decides.
    pub target: Option<AccessTarget>,
}

impl AccessRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>, headers: HeaderMap) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers,
            target: None,
        }
    }

    #[must_use]
    pub fn with_target(mut self, target: AccessTarget) -> Self {
        self.target = Some(target);
        self
    }
}

/// What is known about the request so far; feeds the audit row.
#[derive(Debug, Default)]
struct Progress {
    stage: DecisionStage,
    user_id: Option<UserId>,
    roles: Option<String>,
    feature: Option<String>,
    grant: Option<String>,
}

enum Target {
    Named(String, CrudAction),
    Mapped(Feature, CrudAction),
    Unmapped,
}

/// Runs the full decision for a request and records it.
#[derive(Clone)]
pub struct AuthorizationOrchestrator {
    identity: IdentityResolver,
    permissions: PermissionEngine,
    policies: PolicyEngine,
    audit: AuditRecorder,
    config: OrchestratorConfig,
}

impl AuthorizationOrchestrator {
    /// Wire every engine against one store.
    pub fn new<S>(
        store: Arc<S>,
        codec: Arc<TokenCodec>,
        audit: AuditRecorder,
        config: OrchestratorConfig,
    ) -> Self
    where
        S: Repository + 'static,
    {
        let identity = IdentityResolver::new(codec, store.clone(), config.trust_identity_headers);
        let permissions = PermissionEngine::new(store.clone());
        let policies = PolicyEngine::new(store);
        Self::from_parts(identity, permissions, policies, audit, config)
    }

    pub fn from_parts(
        identity: IdentityResolver,
        permissions: PermissionEngine,
        policies: PolicyEngine,
        audit: AuditRecorder,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            identity,
            permissions,
            policies,
            audit,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn permissions(&self) -> &PermissionEngine {
        &self.permissions
    }

    pub fn audit(&self) -> &AuditRecorder {
        &self.audit
    }

    /// Decide and audit. Never cached: every call re-reads roles and rules.
    pub async fn authorize(&self, request: &AccessRequest) -> Decision {
        let mut progress = Progress::default();
        let decided =
            tokio::time::timeout(self.config.decision_timeout, self.decide(request, &mut progress))
                .await;

        let decision = decided.unwrap_or_else(|_| {
            tracing::error!(
                target: "authorization",
                path = %request.path,
                method = %request.method,
                stage = ?progress.stage,
                timeout_ms = u64::try_from(self.config.decision_timeout.as_millis()).unwrap_or(u64::MAX),
                "Authorization decision timed out, denying"
            );
            Decision::Deny(Denial::new(DenialKind::Timeout, "decision timed out"))
        });
        progress.stage = DecisionStage::Decided;

        let recorded = tokio::time::timeout(
            self.config.decision_timeout,
            self.record(request, &progress, &decision),
        )
        .await;
        if recorded.is_err() {
            tracing::warn!(
                target: "authorization",
                path = %request.path,
                "Access log append timed out"
            );
        }
        decision
    }

    async fn decide(&self, request: &AccessRequest, progress: &mut Progress) -> Decision {
        let user = match self.identity.resolve(&request.headers).await {
            Ok(user) => user,
            Err(denial) => return Decision::Deny(denial),
        };
        progress.stage = DecisionStage::IdentityResolved;
        progress.user_id = Some(user.id);

        let roles = match self.permissions.get_user_roles(user.id).await {
            Ok(roles) => roles,
            Err(e) => return fail_closed("role lookup", &e),
        };
        let identity = ResolvedIdentity {
            user_id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            roles: roles.iter().map(|r| r.name.clone()).collect(),
        };
        progress.roles = identity.role_summary();

        let target = match self.resolve_target(request).await {
            Ok(target) => target,
            Err(e) => return fail_closed("route lookup", &e),
        };

        let (rbac, action) = match target {
            Target::Unmapped if self.config.allow_unmapped_routes => {
                progress.grant = Some("unmapped route, authentication only".to_string());
                return Decision::Allow(identity);
            }
            Target::Unmapped => {
                return Decision::Deny(Denial::new(
                    DenialKind::UnmappedRoute,
                    format!(
                        "no feature mapped for {} {}",
                        request.method.to_ascii_uppercase(),
                        request.path
                    ),
                ));
            }
            Target::Named(name, action) => {
                progress.feature = Some(name.clone());
                (self.permissions.evaluate(&roles, &name, action).await, action)
            }
            Target::Mapped(feature, action) => {
                progress.feature = Some(feature.name.clone());
                (
                    self.permissions.evaluate_feature(&roles, feature, action).await,
                    action,
                )
            }
        };
        let rbac = match rbac {
            Ok(outcome) => outcome,
            Err(e) => return fail_closed("permission lookup", &e),
        };
        progress.stage = DecisionStage::RbacChecked;

        let feature = match rbac {
            RbacOutcome::GrantsAll { role } => {
                progress.grant = Some(format!("role {role} grants all"));
                return Decision::Allow(identity);
            }
            RbacOutcome::Granted { feature, role } => {
                progress.grant = Some(format!("role {role} grants {action}"));
                feature
            }
            RbacOutcome::Denied { .. } | RbacOutcome::UnknownFeature => {
                let feature = progress.feature.as_deref().unwrap_or("unknown");
                tracing::debug!(
                    target: "authorization",
                    user_id = %user.id,
                    feature,
                    %action,
                    "RBAC denied"
                );
                return Decision::Deny(Denial::new(
                    DenialKind::InsufficientPermission,
                    format!("insufficient permission for {action} on {feature}"),
                ));
            }
        };

        let abac = match self.policies.evaluate_feature(&user, &feature).await {
            Ok(abac) => abac,
            Err(e) => return fail_closed("policy lookup", &e),
        };
        progress.stage = DecisionStage::AbacChecked;

        if abac.is_allowed() {
            return Decision::Allow(identity);
        }

        self.record_violations(&user, &feature, &abac.violations).await;
        let reason = format!(
            "policy violation on {}: {}",
            feature.name,
            abac.violated_attributes().join(", ")
        );
        let mut denial = Denial::new(DenialKind::PolicyViolation, reason);
        denial.violations = abac.violations;
        Decision::Deny(denial)
    }

    async fn resolve_target(&self, request: &AccessRequest) -> Result<Target, AuthorizationError> {
        if let Some(target) = &request.target {
            return Ok(Target::Named(target.feature.clone(), target.action));
        }

        let Some(action) = CrudAction::from_http_method(&request.method) else {
            return Ok(Target::Unmapped);
        };
        let resolver = self.policies.resolver();
        let mut route = resolver.route_feature(&request.path, &request.method).await?;
        // HEAD is served by GET handlers, so it falls back to the GET mapping.
        if route.is_none() && request.method.eq_ignore_ascii_case("HEAD") {
            route = resolver.route_feature(&request.path, "GET").await?;
        }
        let Some(route) = route else {
            return Ok(Target::Unmapped);
        };

        let feature = resolver
            .feature_by_id(route.feature_id)
            .await?
            .ok_or_else(|| AuthorizationError::not_found("feature", route.feature_id))?;
        Ok(Target::Mapped(feature, action))
    }

    async fn record_violations(
        &self,
        user: &User,
        feature: &Feature,
        violations: &[crate::types::Violation],
    ) {
        for violation in violations {
            self.audit
                .log_policy_violation(NewPolicyViolation {
                    user_id: user.id,
                    feature_id: Some(feature.id),
                    feature: feature.name.clone(),
                    policy_id: Some(violation.policy_id),
                    attribute: violation.attribute.clone(),
                    expected_value: violation.expected.clone(),
                    actual_value: violation.actual.clone(),
                    created_at: Utc::now(),
                })
                .await;
        }
    }

    async fn record(&self, request: &AccessRequest, progress: &Progress, decision: &Decision) {
        let (access, reason) = match decision {
            Decision::Allow(_) => (AccessDecision::Allow, progress.grant.clone()),
            Decision::Deny(denial) => (AccessDecision::Deny, Some(denial.reason.clone())),
        };

        if let Decision::Deny(denial) = decision {
            tracing::info!(
                target: "authorization",
                user_id = ?progress.user_id,
                path = %request.path,
                method = %request.method,
                kind = denial.kind.tag(),
                "Access denied"
            );
        }

        self.audit
            .log_access(NewAccessLog {
                user_id: progress.user_id,
                role: progress.roles.clone(),
                feature: progress.feature.clone(),
                path: request.path.clone(),
                method: request.method.to_ascii_uppercase(),
                decision: access,
                reason,
                created_at: Utc::now(),
            })
            .await;
    }
}

fn fail_closed(stage: &'static str, err: &AuthorizationError) -> Decision {
    tracing::error!(
        target: "authorization",
        stage,
        error = %err,
        "Authorization data unavailable, denying"
    );
    Decision::Deny(Denial::new(
        DenialKind::Internal,
        "authorization data unavailable",
    ))
}
