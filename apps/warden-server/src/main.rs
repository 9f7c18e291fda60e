//! warden authorization server.
//!
//! Serves `/auth/*`, `/health` and the authorization-guarded `/audit/*`
//! statistics routes over one repository: PostgreSQL when `DATABASE_URL` is
//! set, in memory otherwise.

mod app;
mod bootstrap;
mod config;
mod logging;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use config::ServerConfig;
use tokio::signal;
use tracing::info;
use warden_db::{run_migrations, DbPool, InMemoryStore, PgStore};

use crate::app::{build_app, AppOptions};

#[tokio::main]
async fn main() {
    let config = match ServerConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.rust_log);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.bind_addr,
        env = %config.app_env,
        persistent = config.database_url.is_some(),
        "Starting warden"
    );

    let app = match open_store(&config).await {
        Ok(app) => app,
        Err(message) => {
            tracing::error!("{message}");
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(config.bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to address {}: {e}", config.bind_addr);
            std::process::exit(1);
        }
    };
    info!(addr = %config.bind_addr, "Server listening");

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    }

    info!("Server shutdown complete");
}

async fn open_store(config: &ServerConfig) -> Result<Router, String> {
    let options = AppOptions::default();
    match &config.database_url {
        Some(url) => {
            let pool = DbPool::connect(url)
                .await
                .map_err(|e| format!("Failed to connect to database: {e}"))?;
            run_migrations(&pool)
                .await
                .map_err(|e| format!("Failed to run migrations: {e}"))?;
            build_app(Arc::new(PgStore::new(pool)), config, options)
                .await
                .map_err(|e| format!("Failed to bootstrap: {e}"))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, state is kept in memory and lost on exit");
            build_app(Arc::new(InMemoryStore::new()), config, options)
                .await
                .map_err(|e| format!("Failed to bootstrap: {e}"))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
