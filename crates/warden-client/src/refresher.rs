//! The network half of a token refresh.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::credentials::Credentials;
use crate::error::{ClientError, ClientResult};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Exchanges a refresh token for new credentials.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> ClientResult<Credentials>;
}

/// `POST {base}/auth/refresh` with `{"refresh_token": ...}`.
pub struct HttpTokenRefresher {
    client: Client,
    refresh_url: String,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<TokenPayload>,
}

#[derive(Debug, Deserialize)]
struct TokenPayload {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

impl HttpTokenRefresher {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            refresh_url: format!("{}/auth/refresh", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> ClientResult<Credentials> {
        let response = self
            .client
            .post(&self.refresh_url)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<Envelope>()
                .await
                .ok()
                .and_then(|envelope| envelope.message)
                .unwrap_or_else(|| status.to_string());
            return Err(ClientError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let payload = response
            .json::<Envelope>()
            .await?
            .data
            .ok_or_else(|| ClientError::InvalidResponse("refresh response has no data".into()))?;

        Credentials::try_new(
            payload.access_token,
            payload.refresh_token,
            payload.expires_in,
        )
    }
}
