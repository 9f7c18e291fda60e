//! Shared fixtures for warden-api-auth integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::get;
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use warden_api_auth::{
    auth_router, authorize, log_errors, AuthState, AuthorizeState, CredentialLifecycleService,
    LifecycleConfig,
};
use warden_auth::{PasswordHasher, TokenCodec, TokenConfig};
use warden_authorization::{
    AccessAdminService, AuditDispatch, AuditRecorder, AuthorizationOrchestrator,
    IdentityResolver, OrchestratorConfig, PermissionPatch, HEADER_USER_ID,
};
use warden_db::models::{CrudAction, NewFeature, NewRole, NewRouteFeature, Role};
use warden_db::InMemoryStore;

pub const PASSWORD: &str = "Quasar#2024zz";
pub const NEW_PASSWORD: &str = "Nebula!9981xy";

pub struct App {
    pub store: Arc<InMemoryStore>,
    pub codec: Arc<TokenCodec>,
    pub audit: AuditRecorder,
    pub admin: AccessAdminService,
    pub lifecycle: Arc<CredentialLifecycleService>,
    pub router: Router,
    pub user_role: Role,
}

impl App {
    /// `/auth/*` plus a protected `/reports` route mapped to the `reports`
    /// feature, readable by the default `USER` role.
    pub async fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let codec = Arc::new(TokenCodec::new(TokenConfig::new(
            b"api-auth-test-access-secret-0123456789abc".to_vec(),
            b"api-auth-test-refresh-secret-0123456789ab".to_vec(),
        )));
        let audit = AuditRecorder::new(store.clone(), AuditDispatch::Inline);
        let admin = AccessAdminService::new(store.clone(), audit.clone());

        let user_role = admin
            .create_role(
                None,
                NewRole {
                    name: "USER".into(),
                    description: None,
                    grants_all: false,
                },
            )
            .await
            .expect("create role");
        let reports = admin
            .create_feature(
                None,
                NewFeature {
                    name: "reports".into(),
                    description: None,
                },
            )
            .await
            .expect("create feature");
        admin
            .set_permission(
                None,
                user_role.id,
                reports.id,
                PermissionPatch::grant(CrudAction::Read),
            )
            .await
            .expect("grant read");
        for method in ["GET", "DELETE"] {
            admin
                .map_route(
                    None,
                    NewRouteFeature {
                        path: "/reports".into(),
                        method: method.into(),
                        feature_id: reports.id,
                    },
                )
                .await
                .expect("map route");
        }

        let lifecycle = Arc::new(
            CredentialLifecycleService::new(
                store.clone(),
                codec.clone(),
                audit.clone(),
                LifecycleConfig {
                    bulk_chunk_delay: std::time::Duration::from_millis(1),
                    ..LifecycleConfig::default()
                },
            )
            .with_hasher(PasswordHasher::with_params(8, 1, 1).expect("hasher params")),
        );
        let identity = Arc::new(IdentityResolver::new(codec.clone(), store.clone(), false));
        let orchestrator = Arc::new(AuthorizationOrchestrator::new(
            store.clone(),
            codec.clone(),
            audit.clone(),
            OrchestratorConfig::default(),
        ));

        let protected = Router::new()
            .route("/reports", get(echo_user).delete(echo_user))
            .layer(from_fn_with_state(AuthorizeState::new(orchestrator), authorize));

        let router = Router::new()
            .merge(auth_router(AuthState::new(lifecycle.clone(), identity)))
            .merge(protected)
            .layer(from_fn(log_errors));

        Self {
            store,
            codec,
            audit,
            admin,
            lifecycle,
            router,
            user_role,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Reply {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible router");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("read body")
            .to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        Reply {
            status,
            headers,
            body,
        }
    }

    /// Status and raw text body, for non-JSON routes.
    pub async fn send_text(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible router");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("read body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> Reply {
        self.send(json_request("POST", uri, &body)).await
    }

    /// Register then log in; returns (access token, refresh token).
    pub async fn signed_in(&self, email: &str) -> (String, String) {
        let reply = self.post_json("/auth/register", register_body(email)).await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
        let reply = self
            .post_json("/auth/login", serde_json::json!({"email": email, "password": PASSWORD}))
            .await;
        assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
        (
            reply.body["data"]["access_token"].as_str().unwrap().to_string(),
            reply.refresh_cookie().expect("refresh cookie"),
        )
    }
}

async fn echo_user(headers: HeaderMap) -> String {
    headers
        .get(HEADER_USER_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl Reply {
    /// Value of the `refreshToken` cookie set by this response.
    pub fn refresh_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|cookie| {
                cookie
                    .split(';')
                    .next()?
                    .strip_prefix("refreshToken=")
                    .map(str::to_string)
            })
            .filter(|value| !value.is_empty())
    }

    pub fn set_cookie(&self) -> Option<&str> {
        self.headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
    }
}

pub fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub fn register_body(email: &str) -> Value {
    serde_json::json!({
        "name": "Ada Lovelace",
        "email": email,
        "password": PASSWORD,
        "department": "SALES",
        "region": "EAST",
        "level": 3
    })
}
