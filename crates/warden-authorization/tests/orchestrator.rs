//! End-to-end authorization decisions against the in-memory store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use common::{bearer, Harness};
use warden_authorization::{
    AccessRequest, AccessTarget, AuditDispatch, AuditRecorder, AuthorizationOrchestrator,
    DenialKind, IdentityResolver, OrchestratorConfig, PermissionEngine, PermissionPatch,
    PolicyEngine, RoleResolver,
};
use warden_core::{RoleId, UserId};
use warden_db::models::{
    AccessDecision, AuditQuery, CrudAction, Department, Feature, NewFeature, NewPolicyRule,
    NewRole, NewRouteFeature, PolicyOperator, Role, RoleFeature,
};
use warden_db::{DbResult, InMemoryStore};

async fn role(h: &Harness, name: &str, grants_all: bool) -> Role {
    h.admin
        .create_role(
            None,
            NewRole {
                name: name.into(),
                description: None,
                grants_all,
            },
        )
        .await
        .unwrap()
}

async fn feature(h: &Harness, name: &str) -> Feature {
    h.admin
        .create_feature(
            None,
            NewFeature {
                name: name.into(),
                description: None,
            },
        )
        .await
        .unwrap()
}

async fn access_rows(h: &Harness) -> Vec<warden_db::models::AccessLog> {
    h.audit.access_logs(&AuditQuery::default()).await.unwrap()
}

#[tokio::test]
async fn test_editor_update_allowed_delete_denied() {
    let h = Harness::new();
    let user = h.user("editor@example.com", Department::Marketing, 3).await;
    let editor = role(&h, "EDITOR", false).await;
    let content = feature(&h, "content").await;
    h.admin
        .set_permission(
            None,
            editor.id,
            content.id,
            PermissionPatch::grant(CrudAction::Read).with(CrudAction::Update, true),
        )
        .await
        .unwrap();
    h.admin.assign_role(None, user.id, editor.id).await.unwrap();

    let update = h
        .request("PUT", "/content/1", &user)
        .with_target(AccessTarget::new("content", CrudAction::Update));
    assert!(h.orchestrator.authorize(&update).await.is_allowed());

    let delete = h
        .request("DELETE", "/content/1", &user)
        .with_target(AccessTarget::new("content", CrudAction::Delete));
    let decision = h.orchestrator.authorize(&delete).await;
    let denial = decision.denial().unwrap();
    assert_eq!(denial.kind, DenialKind::InsufficientPermission);
    assert_eq!(denial.reason, "insufficient permission for delete on content");
    assert_eq!(denial.status().as_u16(), 403);
}

#[tokio::test]
async fn test_payroll_policy_violation_is_recorded_once() {
    let h = Harness::new();
    let user = h.user("it@example.com", Department::It, 5).await;
    let staff = role(&h, "STAFF", false).await;
    let payroll = feature(&h, "payroll").await;
    h.admin
        .set_permission(None, staff.id, payroll.id, PermissionPatch::grant(CrudAction::Read))
        .await
        .unwrap();
    h.admin.assign_role(None, user.id, staff.id).await.unwrap();
    h.admin
        .add_policy(
            None,
            NewPolicyRule {
                feature_id: payroll.id,
                attribute: "department".into(),
                operator: PolicyOperator::Equals,
                value: "FINANCE".into(),
                description: None,
            },
        )
        .await
        .unwrap();

    let request = h
        .request("GET", "/payroll", &user)
        .with_target(AccessTarget::new("payroll", CrudAction::Read));
    let decision = h.orchestrator.authorize(&request).await;

    let denial = decision.denial().unwrap();
    assert_eq!(denial.kind, DenialKind::PolicyViolation);
    assert!(denial.reason.contains("department"));

    let violations = h
        .audit
        .policy_violations(&AuditQuery::for_user(user.id))
        .await
        .unwrap();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].attribute, "department");
    assert_eq!(violations[0].expected_value, "FINANCE");
    assert_eq!(violations[0].actual_value.as_deref(), Some("IT"));
}

#[tokio::test]
async fn test_one_violation_per_mismatched_attribute() {
    let h = Harness::new();
    let user = h.user("sales@example.com", Department::Sales, 2).await;
    let staff = role(&h, "STAFF", false).await;
    let payroll = feature(&h, "payroll").await;
    h.admin
        .set_permission(None, staff.id, payroll.id, PermissionPatch::grant(CrudAction::Read))
        .await
        .unwrap();
    h.admin.assign_role(None, user.id, staff.id).await.unwrap();
    for (attribute, operator, value) in [
        ("department", PolicyOperator::Equals, "FINANCE"),
        ("level", PolicyOperator::Range, r#"{"min":5}"#),
        ("region", PolicyOperator::In, r#"["HEADQUARTERS"]"#),
    ] {
        h.admin
            .add_policy(
                None,
                NewPolicyRule {
                    feature_id: payroll.id,
                    attribute: attribute.into(),
                    operator,
                    value: value.into(),
                    description: None,
                },
            )
            .await
            .unwrap();
    }

    let request = h
        .request("GET", "/payroll", &user)
        .with_target(AccessTarget::new("payroll", CrudAction::Read));
    assert!(!h.orchestrator.authorize(&request).await.is_allowed());

    let violations = h
        .audit
        .policy_violations(&AuditQuery::default())
        .await
        .unwrap();
    let mut attributes: Vec<_> = violations.iter().map(|v| v.attribute.as_str()).collect();
    attributes.sort_unstable();
    assert_eq!(attributes, vec!["department", "level"]);
}

#[tokio::test]
async fn test_grants_all_skips_policies() {
    let h = Harness::new();
    let user = h.user("root@example.com", Department::It, 1).await;
    let admin = role(&h, "ADMIN", true).await;
    let payroll = feature(&h, "payroll").await;
    h.admin.assign_role(None, user.id, admin.id).await.unwrap();
    h.admin
        .add_policy(
            None,
            NewPolicyRule {
                feature_id: payroll.id,
                attribute: "department".into(),
                operator: PolicyOperator::Equals,
                value: "FINANCE".into(),
                description: None,
            },
        )
        .await
        .unwrap();

    let request = h
        .request("DELETE", "/payroll/4", &user)
        .with_target(AccessTarget::new("payroll", CrudAction::Delete));
    assert!(h.orchestrator.authorize(&request).await.is_allowed());
    assert!(h
        .audit
        .policy_violations(&AuditQuery::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_route_mapping_resolves_feature_and_action() {
    let h = Harness::new();
    let user = h.user("reader@example.com", Department::Hr, 2).await;
    let reader = role(&h, "READER", false).await;
    let reports = feature(&h, "reports").await;
    h.admin
        .set_permission(None, reader.id, reports.id, PermissionPatch::grant(CrudAction::Read))
        .await
        .unwrap();
    h.admin.assign_role(None, user.id, reader.id).await.unwrap();
    for method in ["GET", "POST"] {
        h.admin
            .map_route(
                None,
                NewRouteFeature {
                    path: "/reports".into(),
                    method: method.into(),
                    feature_id: reports.id,
                },
            )
            .await
            .unwrap();
    }

    assert!(h
        .orchestrator
        .authorize(&h.request("get", "/reports", &user))
        .await
        .is_allowed());
    let denied = h.orchestrator.authorize(&h.request("POST", "/reports", &user)).await;
    assert_eq!(
        denied.denial().unwrap().reason,
        "insufficient permission for create on reports"
    );
}

#[tokio::test]
async fn test_head_uses_get_mapping() {
    let h = Harness::new();
    let user = h.user("reader@example.com", Department::Hr, 2).await;
    let reader = role(&h, "READER", false).await;
    let reports = feature(&h, "reports").await;
    h.admin
        .set_permission(None, reader.id, reports.id, PermissionPatch::grant(CrudAction::Read))
        .await
        .unwrap();
    h.admin.assign_role(None, user.id, reader.id).await.unwrap();
    h.admin
        .map_route(
            None,
            NewRouteFeature {
                path: "/reports".into(),
                method: "GET".into(),
                feature_id: reports.id,
            },
        )
        .await
        .unwrap();
    h.admin
        .map_route(
            None,
            NewRouteFeature {
                path: "/uploads".into(),
                method: "POST".into(),
                feature_id: reports.id,
            },
        )
        .await
        .unwrap();

    assert!(h
        .orchestrator
        .authorize(&h.request("HEAD", "/reports", &user))
        .await
        .is_allowed());
    let denied = h.orchestrator.authorize(&h.request("HEAD", "/uploads", &user)).await;
    assert_eq!(denied.denial().unwrap().kind, DenialKind::UnmappedRoute);
}

#[tokio::test]
async fn test_unmapped_route_denied_unless_allowed() {
    let h = Harness::new();
    let user = h.user("anyone@example.com", Department::Legal, 1).await;
    let denied = h.orchestrator.authorize(&h.request("GET", "/nowhere", &user)).await;
    assert_eq!(denied.denial().unwrap().kind, DenialKind::UnmappedRoute);

    let open = Harness::with_config(OrchestratorConfig {
        allow_unmapped_routes: true,
        ..OrchestratorConfig::default()
    });
    let user = open.user("anyone@example.com", Department::Legal, 1).await;
    assert!(open
        .orchestrator
        .authorize(&open.request("GET", "/nowhere", &user))
        .await
        .is_allowed());
}

#[tokio::test]
async fn test_missing_and_invalid_tokens_are_401() {
    let h = Harness::new();
    let anonymous = AccessRequest::new("GET", "/content", HeaderMap::new());
    let decision = h.orchestrator.authorize(&anonymous).await;
    assert_eq!(decision.denial().unwrap().kind, DenialKind::NoToken);
    assert_eq!(decision.denial().unwrap().status().as_u16(), 401);

    let forged = AccessRequest::new("GET", "/content", bearer("eyJhbGciOiJIUzI1NiJ9.e30.c2ln"));
    let decision = h.orchestrator.authorize(&forged).await;
    assert_eq!(decision.denial().unwrap().kind, DenialKind::InvalidToken);
}

#[tokio::test]
async fn test_deactivated_user_token_is_rejected() {
    let h = Harness::new();
    let user = h.user("gone@example.com", Department::Finance, 4).await;
    let admin = role(&h, "ADMIN", true).await;
    h.admin.assign_role(None, user.id, admin.id).await.unwrap();
    let request = h
        .request("GET", "/payroll", &user)
        .with_target(AccessTarget::new("payroll", CrudAction::Read));
    assert!(h.orchestrator.authorize(&request).await.is_allowed());

    h.admin.set_user_active(None, user.id, false).await.unwrap();
    let decision = h.orchestrator.authorize(&request).await;
    assert_eq!(decision.denial().unwrap().kind, DenialKind::InactiveUser);
}

#[tokio::test]
async fn test_every_decision_appends_exactly_one_access_log() {
    let h = Harness::new();
    let user = h.user("audit@example.com", Department::It, 3).await;
    let viewer = role(&h, "VIEWER", false).await;
    let docs = feature(&h, "docs").await;
    h.admin
        .set_permission(None, viewer.id, docs.id, PermissionPatch::grant(CrudAction::Read))
        .await
        .unwrap();
    h.admin.assign_role(None, user.id, viewer.id).await.unwrap();

    let requests = [
        h.request("GET", "/docs", &user)
            .with_target(AccessTarget::new("docs", CrudAction::Read)),
        h.request("DELETE", "/docs", &user)
            .with_target(AccessTarget::new("docs", CrudAction::Delete)),
        AccessRequest::new("GET", "/docs", HeaderMap::new()),
    ];
    for request in &requests {
        h.orchestrator.authorize(request).await;
    }

    let rows = access_rows(&h).await;
    assert_eq!(rows.len(), 3);
    // newest first
    assert_eq!(rows[0].decision, AccessDecision::Deny);
    assert_eq!(rows[0].user_id, None);
    assert_eq!(rows[1].decision, AccessDecision::Deny);
    assert_eq!(rows[1].role.as_deref(), Some("VIEWER"));
    assert_eq!(rows[1].feature.as_deref(), Some("docs"));
    assert_eq!(rows[2].decision, AccessDecision::Allow);
}

#[tokio::test]
async fn test_decisions_are_not_cached() {
    let h = Harness::new();
    let user = h.user("fresh@example.com", Department::It, 3).await;
    let viewer = role(&h, "VIEWER", false).await;
    let docs = feature(&h, "docs").await;
    h.admin.assign_role(None, user.id, viewer.id).await.unwrap();
    let request = h
        .request("GET", "/docs", &user)
        .with_target(AccessTarget::new("docs", CrudAction::Read));

    assert!(!h.orchestrator.authorize(&request).await.is_allowed());
    h.admin
        .set_permission(None, viewer.id, docs.id, PermissionPatch::grant(CrudAction::Read))
        .await
        .unwrap();
    assert!(h.orchestrator.authorize(&request).await.is_allowed());
}

/// Role lookups that never finish in time.
struct StalledRoles(Arc<InMemoryStore>);

#[async_trait]
impl RoleResolver for StalledRoles {
    async fn roles_for_user(&self, user_id: UserId) -> DbResult<Vec<Role>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        self.0.roles_for_user(user_id).await
    }

    async fn feature_by_name(&self, name: &str) -> DbResult<Option<Feature>> {
        self.0.feature_by_name(name).await
    }

    async fn permission_cell(
        &self,
        role_id: RoleId,
        feature: &Feature,
    ) -> DbResult<Option<RoleFeature>> {
        self.0.permission_cell(role_id, feature).await
    }
}

#[tokio::test]
async fn test_timeout_fails_closed_and_is_audited() {
    let h = Harness::new();
    let user = h.user("slow@example.com", Department::It, 3).await;
    let config = OrchestratorConfig {
        decision_timeout: Duration::from_millis(50),
        ..OrchestratorConfig::default()
    };
    let audit = AuditRecorder::new(h.store.clone(), AuditDispatch::Inline);
    let orchestrator = AuthorizationOrchestrator::from_parts(
        IdentityResolver::new(h.codec.clone(), h.store.clone(), false),
        PermissionEngine::new(Arc::new(StalledRoles(h.store.clone()))),
        PolicyEngine::new(h.store.clone()),
        audit,
        config,
    );

    let request = h
        .request("GET", "/docs", &user)
        .with_target(AccessTarget::new("docs", CrudAction::Read));
    let decision = orchestrator.authorize(&request).await;

    let denial = decision.denial().unwrap();
    assert_eq!(denial.kind, DenialKind::Timeout);
    assert_eq!(denial.status().as_u16(), 500);

    let rows = access_rows(&h).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].user_id, Some(user.id));
    assert_eq!(rows[0].reason.as_deref(), Some("decision timed out"));
}
