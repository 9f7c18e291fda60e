//! Shared fixtures for client tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use warden_auth::{TokenCodec, TokenConfig, TokenKind};
use warden_client::{Credentials, HttpTokenRefresher, InMemoryCredentialStore, RefreshCoordinator};
use warden_core::UserId;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const EMAIL: &str = "ada@example.com";

pub fn codec() -> TokenCodec {
    TokenCodec::new(TokenConfig::new(
        "client-test-access-secret-0123456789",
        "client-test-refresh-secret-0123456789",
    ))
}

/// An access token issued `age_secs` ago, with the default 900 s lifetime.
pub fn access_token_aged(codec: &TokenCodec, age_secs: i64) -> String {
    codec
        .issue_kind(UserId::new(7), EMAIL, TokenKind::Access, Utc::now().timestamp() - age_secs)
        .unwrap()
}

pub fn stale_credentials(codec: &TokenCodec) -> Credentials {
    Credentials::from_tokens(access_token_aged(codec, 901), "stale-refresh".to_string()).unwrap()
}

pub fn refresh_ok(access: &str, refresh: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "message": "Token refreshed",
        "data": {
            "access_token": access,
            "refresh_token": refresh,
            "token_type": "Bearer",
            "expires_in": 900
        }
    }))
}

pub fn refresh_rejected() -> ResponseTemplate {
    ResponseTemplate::new(401).set_body_json(json!({
        "success": false,
        "message": "Invalid or expired refresh token",
        "error": {"code": "authentication_error"}
    }))
}

/// Mounts `/auth/refresh` answering with `response` after `delay`, expecting
/// exactly `expected_calls` hits.
pub async fn mount_refresh(
    server: &MockServer,
    response: ResponseTemplate,
    delay: Duration,
    expected_calls: u64,
) {
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(response.set_delay(delay))
        .expect(expected_calls)
        .mount(server)
        .await;
}

pub fn coordinator(server: &MockServer, stored: Credentials) -> (RefreshCoordinator, Arc<InMemoryCredentialStore>) {
    let store = Arc::new(InMemoryCredentialStore::with_credentials(stored));
    let refresher = Arc::new(HttpTokenRefresher::new(&server.uri()).unwrap());
    (RefreshCoordinator::new(store.clone(), refresher), store)
}
