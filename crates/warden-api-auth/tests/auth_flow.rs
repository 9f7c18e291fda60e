//! Credential lifecycle over HTTP: register, login, refresh rotation,
//! logout, password change and bulk registration.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{json_request, register_body, App, NEW_PASSWORD, PASSWORD};
use serde_json::json;
use warden_db::models::{AuditQuery, SessionAction};
use warden_db::{RoleRepository, UserRepository};

fn with_cookie(uri: &str, refresh: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::COOKIE, format!("refreshToken={refresh}"))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_register_assigns_default_role_and_hides_hash() {
    let app = App::new().await;
    let reply = app.post_json("/auth/register", register_body("Ada@Example.com")).await;

    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.body["success"], true);
    assert_eq!(reply.body["data"]["email"], "ada@example.com");
    assert_eq!(reply.body["data"]["department"], "SALES");
    assert!(reply.body["data"].get("password_hash").is_none());

    let user = app
        .store
        .find_user_by_email("ada@example.com")
        .await
        .unwrap()
        .unwrap();
    let roles = app.store.find_roles_by_user_id(user.id).await.unwrap();
    assert_eq!(roles.len(), 1);
    assert_eq!(roles[0].name, "USER");
    assert_ne!(user.password_hash, PASSWORD);
}

#[tokio::test]
async fn test_register_rejections() {
    let app = App::new().await;
    app.post_json("/auth/register", register_body("ada@example.com")).await;

    let duplicate = app.post_json("/auth/register", register_body("ADA@example.com")).await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);
    assert_eq!(duplicate.body["error"]["code"], "conflict");

    let mut weak = register_body("weak@example.com");
    weak["password"] = json!("abcdefghij");
    let reply = app.post_json("/auth/register", weak).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"]["field"], "password");

    let mut personal = register_body("personal@example.com");
    personal["password"] = json!("Lovelace#2024");
    let reply = app.post_json("/auth/register", personal).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let mut mismatch = register_body("mismatch@example.com");
    mismatch["confirm_password"] = json!("Different#2024zz");
    let reply = app.post_json("/auth/register", mismatch).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"]["field"], "confirm_password");

    let mut unknown_role = register_body("role@example.com");
    unknown_role["role"] = json!("OVERLORD");
    let reply = app.post_json("/auth/register", unknown_role).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"]["field"], "role");

    let garbled = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/auth/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(garbled.status, StatusCode::BAD_REQUEST);
    assert_eq!(garbled.body["error"]["field"], "body");
}

#[tokio::test]
async fn test_wrong_password_is_generic_and_logged_once() {
    let app = App::new().await;
    app.post_json("/auth/register", register_body("ada@example.com")).await;

    let reply = app
        .post_json(
            "/auth/login",
            json!({"email": "ada@example.com", "password": "Wrong#2024zz"}),
        )
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["message"], "Invalid credentials");
    assert!(reply.body.get("data").is_none());
    assert!(reply.refresh_cookie().is_none());

    let unknown = app
        .post_json(
            "/auth/login",
            json!({"email": "nobody@example.com", "password": "Wrong#2024zz"}),
        )
        .await;
    assert_eq!(unknown.body["message"], reply.body["message"]);

    let user = app
        .store
        .find_user_by_email("ada@example.com")
        .await
        .unwrap()
        .unwrap();
    let logs = app
        .audit
        .session_logs(&AuditQuery::for_user(user.id))
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, SessionAction::Login);
    assert!(!logs[0].success);
    assert_eq!(logs[0].failure_reason.as_deref(), Some("invalid_password"));
}

#[tokio::test]
async fn test_login_sets_refresh_cookie() {
    let app = App::new().await;
    app.post_json("/auth/register", register_body("ada@example.com")).await;
    let reply = app
        .post_json("/auth/login", json!({"email": "ada@example.com", "password": PASSWORD}))
        .await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["token_type"], "Bearer");
    assert_eq!(reply.body["data"]["expires_in"], 900);
    let cookie = reply.set_cookie().unwrap();
    assert!(cookie.starts_with("refreshToken="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Strict"));
    assert!(cookie.contains("Path=/"));
    assert!(cookie.contains("Max-Age=604800"));
}

#[tokio::test]
async fn test_refresh_rotates_and_old_token_dies() {
    let app = App::new().await;
    let (_, refresh) = app.signed_in("ada@example.com").await;

    let rotated = app.send(with_cookie("/auth/refresh", &refresh)).await;
    assert_eq!(rotated.status, StatusCode::OK, "{}", rotated.body);
    let next = rotated.refresh_cookie().unwrap();
    assert_ne!(next, refresh);

    let replay = app.send(with_cookie("/auth/refresh", &refresh)).await;
    assert_eq!(replay.status, StatusCode::UNAUTHORIZED);

    let via_body = app
        .post_json("/auth/refresh", json!({"refresh_token": next}))
        .await;
    assert_eq!(via_body.status, StatusCode::OK);

    let missing = app.send(json_request("POST", "/auth/refresh", &json!({}))).await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);

    let logs = app.audit.session_logs(&Default::default()).await.unwrap();
    let refreshes: Vec<_> = logs
        .iter()
        .filter(|l| l.action == SessionAction::TokenRefresh)
        .collect();
    assert_eq!(refreshes.len(), 3);
    assert_eq!(refreshes.iter().filter(|l| l.success).count(), 2);
}

#[tokio::test]
async fn test_logout_revokes_and_clears_cookie() {
    let app = App::new().await;
    let (_, refresh) = app.signed_in("ada@example.com").await;

    let reply = app.send(with_cookie("/auth/logout", &refresh)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.set_cookie().unwrap().contains("Max-Age=0"));

    let again = app.send(with_cookie("/auth/refresh", &refresh)).await;
    assert_eq!(again.status, StatusCode::UNAUTHORIZED);

    let idempotent = app.send(with_cookie("/auth/logout", &refresh)).await;
    assert_eq!(idempotent.status, StatusCode::OK);
}

#[tokio::test]
async fn test_change_password_revokes_sessions() {
    let app = App::new().await;
    let (access, refresh) = app.signed_in("ada@example.com").await;

    let change = |current: &str, new: &str| {
        Request::builder()
            .method("POST")
            .uri("/auth/change-password")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {access}"))
            .body(Body::from(
                json!({"current_password": current, "new_password": new}).to_string(),
            ))
            .unwrap()
    };

    let wrong = app.send(change("Wrong#2024zz", NEW_PASSWORD)).await;
    assert_eq!(wrong.status, StatusCode::BAD_REQUEST);
    assert_eq!(wrong.body["error"]["field"], "current_password");

    let same = app.send(change(PASSWORD, PASSWORD)).await;
    assert_eq!(same.status, StatusCode::BAD_REQUEST);
    assert_eq!(same.body["error"]["field"], "new_password");

    let ok = app.send(change(PASSWORD, NEW_PASSWORD)).await;
    assert_eq!(ok.status, StatusCode::OK, "{}", ok.body);

    let stale = app.send(with_cookie("/auth/refresh", &refresh)).await;
    assert_eq!(stale.status, StatusCode::UNAUTHORIZED);

    let old_login = app
        .post_json("/auth/login", json!({"email": "ada@example.com", "password": PASSWORD}))
        .await;
    assert_eq!(old_login.status, StatusCode::UNAUTHORIZED);
    let new_login = app
        .post_json(
            "/auth/login",
            json!({"email": "ada@example.com", "password": NEW_PASSWORD}),
        )
        .await;
    assert_eq!(new_login.status, StatusCode::OK);

    let revokes = app
        .audit
        .session_logs(&Default::default())
        .await
        .unwrap()
        .into_iter()
        .filter(|l| l.action == SessionAction::TokenRevoke)
        .count();
    assert_eq!(revokes, 1);
}

#[tokio::test]
async fn test_me_requires_authentication() {
    let app = App::new().await;
    let (access, _) = app.signed_in("ada@example.com").await;

    let anonymous = app
        .send(Request::get("/auth/me").body(Body::empty()).unwrap())
        .await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let me = app
        .send(
            Request::get("/auth/me")
                .header(header::AUTHORIZATION, format!("Bearer {access}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["data"]["user"]["email"], "ada@example.com");
    assert_eq!(me.body["data"]["roles"], json!(["USER"]));
}

#[tokio::test]
async fn test_bulk_register_partitions_results() {
    let app = App::new().await;
    app.post_json("/auth/register", register_body("taken@example.com")).await;

    let mut bad_email = register_body("not-an-email");
    bad_email["name"] = json!("Grace Hopper");
    let users: Vec<_> = (0..6)
        .map(|i| register_body(&format!("user{i}@example.com")))
        .chain([register_body("taken@example.com"), bad_email])
        .collect();

    let reply = app.post_json("/auth/register/bulk", json!({ "users": users })).await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert_eq!(reply.body["data"]["successful"].as_array().unwrap().len(), 6);
    let failed = reply.body["data"]["failed"].as_array().unwrap();
    assert_eq!(failed.len(), 2);
    assert_eq!(failed[0]["index"], 6);
    assert_eq!(failed[0]["email"], "taken@example.com");
    assert_eq!(failed[1]["index"], 7);
}

#[tokio::test]
async fn test_bulk_register_rejects_duplicates_and_oversize_upfront() {
    let app = App::new().await;

    let dupes = json!({ "users": [register_body("a@example.com"), register_body("A@example.com")] });
    let reply = app.post_json("/auth/register/bulk", dupes).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.body["message"].as_str().unwrap().contains("a@example.com"));
    assert!(app.store.find_user_by_email("a@example.com").await.unwrap().is_none());

    let many: Vec<_> = (0..101)
        .map(|i| register_body(&format!("u{i}@example.com")))
        .collect();
    let reply = app.post_json("/auth/register/bulk", json!({ "users": many })).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let empty = app.post_json("/auth/register/bulk", json!({ "users": [] })).await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);
}
