//! Authorization middleware: runs the orchestrator for every request.
//!
//! Client-supplied `x-user-*` headers are stripped unless the deployment
//! trusts an upstream verifier. After an Allow the verified identity is put
//! in the request extensions and re-emitted as `x-user-*` headers for
//! downstream handlers. A 401 for a browser (`Accept: text/html`) becomes a
//! redirect to the login page carrying the original path.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{ACCEPT, LOCATION};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use warden_authorization::{
    AccessRequest, AuthorizationOrchestrator, Decision, Denial, ResolvedIdentity,
    HEADER_USER_ACTIVE, HEADER_USER_EMAIL, HEADER_USER_ID, HEADER_USER_NAME, IDENTITY_HEADERS,
};
use warden_core::WardenError;

use crate::error::error_response;

pub const DEFAULT_LOGIN_PATH: &str = "/login";

#[derive(Clone)]
pub struct AuthorizeState {
    pub orchestrator: Arc<AuthorizationOrchestrator>,
    pub login_path: String,
}

impl AuthorizeState {
    pub fn new(orchestrator: Arc<AuthorizationOrchestrator>) -> Self {
        Self {
            orchestrator,
            login_path: DEFAULT_LOGIN_PATH.to_string(),
        }
    }

    #[must_use]
    pub fn with_login_path(mut self, login_path: impl Into<String>) -> Self {
        self.login_path = login_path.into();
        self
    }
}

/// # Usage
///
/// ```rust,ignore
/// let app = Router::new()
///     .route("/reports", get(list_reports))
///     .layer(axum::middleware::from_fn_with_state(state, authorize));
/// ```
pub async fn authorize(
    State(state): State<AuthorizeState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if !state.orchestrator.config().trust_identity_headers {
        strip_identity_headers(request.headers_mut());
    }

    let access = AccessRequest::new(
        request.method().as_str(),
        request.uri().path(),
        request.headers().clone(),
    );

    match state.orchestrator.authorize(&access).await {
        Decision::Allow(identity) => {
            propagate_identity(request.headers_mut(), &identity);
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Decision::Deny(denial) => {
            let original = request
                .uri()
                .path_and_query()
                .map_or_else(|| request.uri().path().to_string(), ToString::to_string);
            deny_response(&denial, request.headers(), &original, &state.login_path)
        }
    }
}

fn strip_identity_headers(headers: &mut HeaderMap) {
    for name in IDENTITY_HEADERS {
        headers.remove(name);
    }
}

fn propagate_identity(headers: &mut HeaderMap, identity: &ResolvedIdentity) {
    strip_identity_headers(headers);
    let values = [
        (HEADER_USER_ID, identity.user_id.to_string()),
        (HEADER_USER_EMAIL, identity.email.clone()),
        (HEADER_USER_NAME, identity.name.clone()),
        (HEADER_USER_ACTIVE, "true".to_string()),
    ];
    for (name, value) in values {
        if let Ok(value) = HeaderValue::from_bytes(value.as_bytes()) {
            headers.insert(name, value);
        }
    }
}

/// Denial as a response: envelope, or a login redirect for browsers.
pub fn deny_response(
    denial: &Denial,
    headers: &HeaderMap,
    original_path: &str,
    login_path: &str,
) -> Response {
    if denial.kind.is_unauthenticated() && accepts_html(headers) {
        return login_redirect(login_path, original_path);
    }
    error_response(&WardenError::from(denial), denial.reason.clone())
}

fn accepts_html(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.to_ascii_lowercase().contains("text/html"))
}

fn login_redirect(login_path: &str, original_path: &str) -> Response {
    let target: String =
        url::form_urlencoded::byte_serialize(safe_redirect(original_path).as_bytes()).collect();
    let location = format!("{}?redirect={target}", safe_redirect(login_path));
    match HeaderValue::from_str(&location) {
        Ok(value) => (StatusCode::SEE_OTHER, [(LOCATION, value)]).into_response(),
        Err(_) => (StatusCode::SEE_OTHER, [(LOCATION, HeaderValue::from_static("/"))]).into_response(),
    }
}

/// `target` if it is a same-origin relative path, otherwise `/`.
#[must_use]
pub fn safe_redirect(target: &str) -> &str {
    let relative = target.starts_with('/')
        && !target.starts_with("//")
        && !target.contains('\\')
        && url::Url::parse(target).is_err();
    if relative {
        target
    } else {
        "/"
    }
}
