//! Shared fixtures for warden-authorization integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::http::{HeaderMap, HeaderValue};
use warden_auth::{TokenCodec, TokenConfig};
use warden_authorization::{
    AccessAdminService, AccessRequest, AuditDispatch, AuditRecorder, AuthorizationOrchestrator,
    OrchestratorConfig,
};
use warden_db::models::{Department, NewUser, Region, User};
use warden_db::{InMemoryStore, UserRepository};

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub codec: Arc<TokenCodec>,
    pub audit: AuditRecorder,
    pub orchestrator: AuthorizationOrchestrator,
    pub admin: AccessAdminService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(OrchestratorConfig::default())
    }

    pub fn with_config(config: OrchestratorConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let codec = Arc::new(test_codec());
        let audit = AuditRecorder::new(store.clone(), AuditDispatch::Inline);
        let orchestrator =
            AuthorizationOrchestrator::new(store.clone(), codec.clone(), audit.clone(), config);
        let admin = AccessAdminService::new(store.clone(), audit.clone());
        Self {
            store,
            codec,
            audit,
            orchestrator,
            admin,
        }
    }

    pub async fn user(&self, email: &str, department: Department, level: i16) -> User {
        self.store
            .create_user(NewUser {
                email: email.to_string(),
                name: "Test User".to_string(),
                password_hash: "not-a-real-hash".to_string(),
                department,
                region: Region::Headquarters,
                level,
                custom_attributes: serde_json::json!({}),
            })
            .await
            .expect("create user")
    }

    pub fn token(&self, user: &User) -> String {
        self.codec
            .issue_access(user.id, &user.email)
            .expect("issue token")
    }

    pub fn request(&self, method: &str, path: &str, user: &User) -> AccessRequest {
        AccessRequest::new(method, path, bearer(&self.token(user)))
    }
}

pub fn test_codec() -> TokenCodec {
    TokenCodec::new(TokenConfig::new(
        b"integration-access-secret-0123456789abcdef".to_vec(),
        b"integration-refresh-secret-0123456789abcde".to_vec(),
    ))
}

pub fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "authorization",
        HeaderValue::from_str(&format!("Bearer {token}")).expect("header value"),
    );
    headers
}
