//! Fires a callback when a session's access token expires.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::credentials::Credentials;

/// One pending expiry notification. Rescheduling replaces the previous one;
/// dropping the timer cancels it.
#[derive(Debug, Default)]
pub struct SessionExpiryTimer {
    pending: Option<JoinHandle<()>>,
}

impl SessionExpiryTimer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `on_expiry` at `expires_at`, or immediately if already past.
    pub fn schedule<F>(&mut self, expires_at: DateTime<Utc>, on_expiry: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();
        let delay = (expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tracing::debug!(delay_ms = delay.as_millis() as u64, "Session expiry scheduled");
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_expiry();
        }));
    }

    pub fn for_credentials<F>(&mut self, credentials: &Credentials, on_expiry: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule(credentials.expires_at, on_expiry);
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    /// Scheduled and not yet fired.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for SessionExpiryTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
