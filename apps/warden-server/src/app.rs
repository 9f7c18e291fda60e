//! Service wiring: one store in, one router out.

use std::sync::Arc;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::Router;
use tower_http::trace::TraceLayer;
use warden_api_auth::{
    auth_router, authorize, log_errors, AuthState, AuthorizeState, CredentialLifecycleService,
};
use warden_auth::{PasswordHasher, TokenCodec};
use warden_authorization::{
    AccessAdminService, AuditDispatch, AuditRecorder, AuthorizationError,
    AuthorizationOrchestrator, IdentityResolver,
};
use warden_db::Repository;

use crate::bootstrap::bootstrap_system;
use crate::config::ServerConfig;
use crate::routes::{audit_router, health_router};

/// Knobs tests turn down.
#[derive(Debug, Clone, Default)]
pub struct AppOptions {
    pub hasher: PasswordHasher,
    pub audit_dispatch: AuditDispatch,
}

/// Seed the store, then assemble every route.
pub async fn build_app<S>(
    store: Arc<S>,
    config: &ServerConfig,
    options: AppOptions,
) -> Result<Router, AuthorizationError>
where
    S: Repository + 'static,
{
    let codec = Arc::new(TokenCodec::new(config.token_config()));
    let audit = AuditRecorder::new(store.clone(), options.audit_dispatch);
    let admin = AccessAdminService::new(store.clone(), audit.clone());

    let seeded = bootstrap_system(store.clone(), &admin, &config.default_role).await?;
    tracing::info!(
        roles_created = seeded.roles_created,
        feature_created = seeded.feature_created,
        routes_mapped = seeded.routes_mapped,
        "Bootstrap completed"
    );

    let lifecycle = Arc::new(
        CredentialLifecycleService::new(
            store.clone(),
            codec.clone(),
            audit.clone(),
            config.lifecycle_config(),
        )
        .with_hasher(options.hasher),
    );
    let identity = Arc::new(IdentityResolver::new(
        codec.clone(),
        store.clone(),
        config.trust_identity_headers,
    ));
    let orchestrator = Arc::new(AuthorizationOrchestrator::new(
        store,
        codec,
        audit.clone(),
        config.orchestrator_config(),
    ));

    let guard = AuthorizeState::new(orchestrator).with_login_path(config.login_path.clone());
    let protected = audit_router(audit).layer(from_fn_with_state(guard, authorize));
    let auth = AuthState::new(lifecycle, identity).with_cookies(config.cookie_config());

    Ok(Router::new()
        .merge(health_router())
        .merge(auth_router(auth))
        .merge(protected)
        .layer(from_fn(log_errors))
        .layer(TraceLayer::new_for_http()))
}
