//! Client address and user agent, sanitized for logs and session records.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap};

use crate::services::SessionContext;

const MAX_USER_AGENT_LEN: usize = 256;

/// Client IP: first valid `X-Forwarded-For` hop, then the peer address.
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|ip| ip.trim().parse::<IpAddr>().ok())
        .or_else(|| {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip())
        })
}

/// Control characters stripped, length capped.
pub fn sanitize_user_agent(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_control())
        .take(MAX_USER_AGENT_LEN)
        .collect()
}

pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .map(sanitize_user_agent)
        .filter(|ua| !ua.is_empty())
}

/// Extractor yielding the [`SessionContext`] of the calling client.
#[derive(Debug, Clone, Default)]
pub struct ClientContext(pub SessionContext);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(SessionContext {
            ip_address: client_ip(&parts.headers, &parts.extensions).map(|ip| ip.to_string()),
            user_agent: user_agent(&parts.headers),
        }))
    }
}
