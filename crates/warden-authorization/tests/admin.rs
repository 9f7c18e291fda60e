//! Access administration: upserts, referential guards and change history.

mod common;

use common::Harness;
use warden_authorization::{AuthorizationError, PermissionPatch};
use warden_core::{PolicyId, UserId};
use warden_db::models::{
    AuditQuery, ChangeAction, CrudAction, Department, NewFeature, NewPolicyRule, NewRole,
    NewRouteFeature, PolicyOperator, RoleUpdate, UserAttributesUpdate,
};
use warden_db::{FeatureRepository, PolicyRepository};

fn new_role(name: &str) -> NewRole {
    NewRole {
        name: name.into(),
        description: None,
        grants_all: false,
    }
}

fn new_feature(name: &str) -> NewFeature {
    NewFeature {
        name: name.into(),
        description: Some("test feature".into()),
    }
}

#[tokio::test]
async fn test_set_permission_twice_keeps_one_row() {
    let h = Harness::new();
    let role = h.admin.create_role(None, new_role("VIEWER")).await.unwrap();
    let feature = h.admin.create_feature(None, new_feature("docs")).await.unwrap();

    let read = PermissionPatch::grant(CrudAction::Read);
    h.admin.set_permission(None, role.id, feature.id, read).await.unwrap();
    let cell = h.admin.set_permission(None, role.id, feature.id, read).await.unwrap();

    assert!(cell.can_read);
    assert!(!cell.can_create && !cell.can_update && !cell.can_delete);
    let refs = h.store.count_feature_references(feature.id).await.unwrap();
    assert_eq!(refs.role_features, 1);
}

#[tokio::test]
async fn test_permission_patch_keeps_unspecified_bits() {
    let h = Harness::new();
    let role = h.admin.create_role(None, new_role("EDITOR")).await.unwrap();
    let feature = h.admin.create_feature(None, new_feature("content")).await.unwrap();

    h.admin
        .set_permission(None, role.id, feature.id, PermissionPatch::grant(CrudAction::Read))
        .await
        .unwrap();
    let cell = h
        .admin
        .set_permission(None, role.id, feature.id, PermissionPatch::grant(CrudAction::Update))
        .await
        .unwrap();
    assert!(cell.can_read);
    assert!(cell.can_update);

    let cell = h
        .admin
        .set_permission(
            None,
            role.id,
            feature.id,
            PermissionPatch::default().with(CrudAction::Read, false),
        )
        .await
        .unwrap();
    assert!(!cell.can_read);
    assert!(cell.can_update);
}

#[tokio::test]
async fn test_duplicate_role_name_conflicts() {
    let h = Harness::new();
    let first = h.admin.create_role(None, new_role("AUDITOR")).await.unwrap();
    let other = h.admin.create_role(None, new_role("OTHER")).await.unwrap();

    let err = h.admin.create_role(None, new_role("AUDITOR")).await.unwrap_err();
    assert!(matches!(err, AuthorizationError::Conflict(_)));

    let err = h
        .admin
        .update_role(
            None,
            other.id,
            RoleUpdate {
                name: Some("AUDITOR".into()),
                ..RoleUpdate::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthorizationError::Conflict(_)));

    let renamed = h
        .admin
        .update_role(
            None,
            first.id,
            RoleUpdate {
                name: Some("AUDITOR".into()),
                grants_all: Some(true),
                ..RoleUpdate::default()
            },
        )
        .await
        .unwrap();
    assert!(renamed.grants_all);
}

#[tokio::test]
async fn test_assigned_role_cannot_be_deleted() {
    let h = Harness::new();
    let user = h.user("held@example.com", Department::It, 2).await;
    let role = h.admin.create_role(None, new_role("HELD")).await.unwrap();
    assert!(h.admin.assign_role(None, user.id, role.id).await.unwrap());
    assert!(!h.admin.assign_role(None, user.id, role.id).await.unwrap());

    let err = h.admin.delete_role(None, role.id).await.unwrap_err();
    assert!(matches!(err, AuthorizationError::Conflict(_)));

    assert!(h.admin.revoke_role(None, user.id, role.id).await.unwrap());
    h.admin.delete_role(None, role.id).await.unwrap();
}

#[tokio::test]
async fn test_referenced_feature_cannot_be_deleted() {
    let h = Harness::new();
    let feature = h.admin.create_feature(None, new_feature("reports")).await.unwrap();
    h.admin
        .map_route(
            None,
            NewRouteFeature {
                path: "/reports".into(),
                method: "get".into(),
                feature_id: feature.id,
            },
        )
        .await
        .unwrap();

    let err = h.admin.delete_feature(None, feature.id).await.unwrap_err();
    assert!(matches!(err, AuthorizationError::Conflict(_)));

    let route = h.store.find_route_feature("/reports", "GET").await.unwrap();
    assert_eq!(route.map(|r| r.method), Some("GET".to_string()));
}

#[tokio::test]
async fn test_map_route_rejects_bad_input() {
    let h = Harness::new();
    let feature = h.admin.create_feature(None, new_feature("reports")).await.unwrap();
    for (path, method) in [("reports", "GET"), ("/reports", "OPTIONS")] {
        let err = h
            .admin
            .map_route(
                None,
                NewRouteFeature {
                    path: path.into(),
                    method: method.into(),
                    feature_id: feature.id,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthorizationError::Validation { .. }));
    }
}

#[tokio::test]
async fn test_malformed_policy_rejected_on_create() {
    let h = Harness::new();
    let feature = h.admin.create_feature(None, new_feature("payroll")).await.unwrap();
    let err = h
        .admin
        .add_policy(
            None,
            NewPolicyRule {
                feature_id: feature.id,
                attribute: "region".into(),
                operator: PolicyOperator::In,
                value: "NORTH,SOUTH".into(),
                description: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthorizationError::InvalidPolicy(_)));
    assert!(h.store.find_policies_for_feature(feature.id).await.unwrap().is_empty());

    let err = h.admin.remove_policy(None, PolicyId::new(999)).await.unwrap_err();
    assert!(matches!(err, AuthorizationError::NotFound { .. }));
}

#[tokio::test]
async fn test_user_attribute_updates_are_validated_and_audited() {
    let h = Harness::new();
    let actor = UserId::new(1000);
    let user = h.user("move@example.com", Department::Sales, 2).await;

    let err = h
        .admin
        .update_user_attributes(
            Some(actor),
            user.id,
            UserAttributesUpdate {
                level: Some(11),
                ..UserAttributesUpdate::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthorizationError::Validation { field: "level", .. }));

    let profile = h
        .admin
        .update_user_attributes(
            Some(actor),
            user.id,
            UserAttributesUpdate {
                department: Some(Department::Finance),
                level: Some(6),
                ..UserAttributesUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(profile.department, Department::Finance);
    assert_eq!(profile.level, 6);

    let history = h.audit.change_history(&AuditQuery::default()).await.unwrap();
    let entry = history
        .iter()
        .find(|c| c.entity_type == "user")
        .expect("user change recorded");
    assert_eq!(entry.actor_id, Some(actor));
    assert_eq!(entry.action, ChangeAction::Update);
    assert_eq!(entry.before.as_ref().unwrap()["department"], "SALES");
    assert_eq!(entry.after.as_ref().unwrap()["department"], "FINANCE");
    assert!(entry.after.as_ref().unwrap().get("password_hash").is_none());
}

#[tokio::test]
async fn test_every_mutation_writes_change_history() {
    let h = Harness::new();
    let role = h.admin.create_role(None, new_role("TEMP")).await.unwrap();
    let feature = h.admin.create_feature(None, new_feature("temp")).await.unwrap();
    h.admin
        .set_permission(None, role.id, feature.id, PermissionPatch::grant(CrudAction::Read))
        .await
        .unwrap();

    let history = h.audit.change_history(&AuditQuery::default()).await.unwrap();
    let kinds: Vec<_> = history.iter().rev().map(|c| c.entity_type.as_str()).collect();
    assert_eq!(kinds, vec!["role", "feature", "role_feature"]);
}
