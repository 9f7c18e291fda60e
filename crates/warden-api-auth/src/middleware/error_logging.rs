//! Logs every error response with request context before it leaves the
//! service. Handlers and the authorization layer attach an
//! [`ErrorReport`](crate::error::ErrorReport); this layer adds method, path,
//! timestamp, client IP and a sanitized user agent.

use axum::body::Body;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;

use crate::error::ErrorReport;
use crate::middleware::client_info::{client_ip, user_agent};

pub async fn log_errors(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let ip = client_ip(request.headers(), request.extensions())
        .map_or_else(|| "unknown".to_string(), |ip| ip.to_string());
    let agent = user_agent(request.headers()).unwrap_or_else(|| "unknown".to_string());

    let response = next.run(request).await;

    if let Some(report) = response.extensions().get::<ErrorReport>() {
        let status = response.status().as_u16();
        let timestamp = Utc::now().to_rfc3339();
        if response.status().is_server_error() {
            tracing::error!(
                %method, %path, status, %ip, user_agent = %agent, %timestamp,
                code = report.code, detail = %report.detail,
                "Request failed"
            );
        } else {
            tracing::info!(
                %method, %path, status, %ip, user_agent = %agent, %timestamp,
                code = report.code, detail = %report.detail,
                "Request rejected"
            );
        }
    }

    response
}
