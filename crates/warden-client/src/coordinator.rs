//! Single-flight token refresh.
//!
//! When many tasks find the access token expired at once, exactly one of
//! them (the leader) performs the network refresh; everyone else subscribes
//! to the leader's outcome. The refresh itself runs in a spawned task, so a
//! caller that gives up waiting never cancels the refresh others depend on.
//!
//! ```text
//!  ensure_valid ─┬─ token fresh ──────────────▶ access token
//!                └─ expired ─▶ slot empty? ─yes─▶ spawn leader ─┐
//!                                  │                             │
//!                                  no ─▶ subscribe ◀── broadcast outcome
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Duration;
use tokio::sync::broadcast;

use crate::credentials::Credentials;
use crate::error::{ClientError, ClientResult};
use crate::refresher::TokenRefresher;
use crate::store::CredentialStore;

type Outcome = ClientResult<Credentials>;
type Slot = Arc<Mutex<Option<broadcast::Sender<Outcome>>>>;

#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshConfig {
    /// How early [`RefreshCoordinator::ensure_valid`] refreshes ahead of
    /// expiry. Zero waits until the token has actually expired.
    pub refresh_ahead: std::time::Duration,
}

#[derive(Clone)]
pub struct RefreshCoordinator {
    store: Arc<dyn CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    in_flight: Slot,
    config: RefreshConfig,
}

impl RefreshCoordinator {
    pub fn new(store: Arc<dyn CredentialStore>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self::with_config(store, refresher, RefreshConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
        config: RefreshConfig,
    ) -> Self {
        Self {
            store,
            refresher,
            in_flight: Arc::new(Mutex::new(None)),
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// A usable access token, refreshing first if the stored one has expired.
    ///
    /// # Errors
    ///
    /// - `ClientError::NotAuthenticated` when nothing is stored
    /// - `ClientError::SessionExpired` when the server rejected the refresh
    ///   token; stored credentials are deleted
    pub async fn ensure_valid(&self) -> ClientResult<String> {
        self.refresh_if_within(self.config.refresh_ahead).await
    }

    /// Refresh when the access token expires within `threshold`, otherwise
    /// return it unchanged. Shares any refresh already in flight.
    pub async fn refresh_if_within(&self, threshold: std::time::Duration) -> ClientResult<String> {
        let threshold = Duration::from_std(threshold).unwrap_or_else(|_| Duration::days(36_500));
        let current = self.store.load()?.ok_or(ClientError::NotAuthenticated)?;
        if !current.expires_within(threshold) {
            return Ok(current.access_token);
        }
        self.shared_refresh(threshold)
            .await
            .map(|credentials| credentials.access_token)
    }

    /// Whether a refresh is running right now.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        lock(&self.in_flight).is_some()
    }

    async fn shared_refresh(&self, threshold: Duration) -> Outcome {
        let mut outcome = {
            let mut slot = lock(&self.in_flight);
            match slot.as_ref() {
                Some(leader) => leader.subscribe(),
                None => {
                    let (tx, rx) = broadcast::channel(1);
                    *slot = Some(tx.clone());
                    tokio::spawn(lead_refresh(
                        self.store.clone(),
                        self.refresher.clone(),
                        SlotGuard(self.in_flight.clone()),
                        tx,
                        threshold,
                    ));
                    rx
                }
            }
        };

        outcome.recv().await.unwrap_or(Err(ClientError::RefreshAborted))
    }
}

fn lock(slot: &Slot) -> MutexGuard<'_, Option<broadcast::Sender<Outcome>>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Empties the in-flight slot when dropped, including on panic.
struct SlotGuard(Slot);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        lock(&self.0).take();
    }
}

async fn lead_refresh(
    store: Arc<dyn CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    guard: SlotGuard,
    tx: broadcast::Sender<Outcome>,
    threshold: Duration,
) {
    let outcome = refresh_once(store.as_ref(), refresher.as_ref(), threshold).await;
    // Clear before publishing: anyone arriving later starts from the stored result.
    drop(guard);
    // No receivers left is fine.
    let _ = tx.send(outcome);
}

async fn refresh_once(
    store: &dyn CredentialStore,
    refresher: &dyn TokenRefresher,
    threshold: Duration,
) -> Outcome {
    let current = store.load()?.ok_or(ClientError::NotAuthenticated)?;
    if !current.expires_within(threshold) {
        // A previous leader already stored fresh credentials.
        return Ok(current);
    }

    match refresher.refresh(&current.refresh_token).await {
        Ok(fresh) => {
            store.store(&fresh)?;
            tracing::debug!(expires_at = %fresh.expires_at, "Access token refreshed");
            Ok(fresh)
        }
        Err(e) if e.is_rejection() => {
            tracing::warn!(error = %e, "Refresh token rejected, clearing credentials");
            if let Err(delete_err) = store.delete() {
                tracing::warn!(error = %delete_err, "Failed to delete stored credentials");
            }
            Err(ClientError::SessionExpired)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Token refresh failed");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryCredentialStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
        result: Outcome,
    }

    #[async_trait]
    impl TokenRefresher for Counting {
        async fn refresh(&self, _refresh_token: &str) -> Outcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            self.result.clone()
        }
    }

    fn coordinator(stored: Option<Credentials>, result: Outcome) -> (RefreshCoordinator, Arc<Counting>) {
        let store = Arc::new(match stored {
            Some(creds) => InMemoryCredentialStore::with_credentials(creds),
            None => InMemoryCredentialStore::new(),
        });
        let refresher = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            result,
        });
        (RefreshCoordinator::new(store, refresher.clone()), refresher)
    }

    fn fresh() -> Credentials {
        Credentials::new("fresh-access".into(), "fresh-refresh".into(), 900)
    }

    fn expired() -> Credentials {
        Credentials::new("old-access".into(), "old-refresh".into(), -1)
    }

    #[tokio::test]
    async fn test_valid_token_returns_without_refresh() {
        let (coord, refresher) = coordinator(Some(fresh()), Ok(fresh()));
        assert_eq!(coord.ensure_valid().await.unwrap(), "fresh-access");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_nothing_stored_is_not_authenticated() {
        let (coord, _) = coordinator(None, Ok(fresh()));
        assert_eq!(coord.ensure_valid().await, Err(ClientError::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_proactive_refresh_within_threshold() {
        let soon = Credentials::new("soon".into(), "r".into(), 30);
        let (coord, refresher) = coordinator(Some(soon), Ok(fresh()));

        assert_eq!(
            coord.refresh_if_within(std::time::Duration::from_secs(10)).await.unwrap(),
            "soon"
        );
        assert_eq!(
            coord.refresh_if_within(std::time::Duration::from_secs(60)).await.unwrap(),
            "fresh-access"
        );
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_ahead_config() {
        let soon = Credentials::new("soon".into(), "r".into(), 30);
        let store = Arc::new(InMemoryCredentialStore::with_credentials(soon));
        let refresher = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            result: Ok(fresh()),
        });
        let coord = RefreshCoordinator::with_config(
            store,
            refresher.clone(),
            RefreshConfig {
                refresh_ahead: std::time::Duration::from_secs(60),
            },
        );
        assert_eq!(coord.ensure_valid().await.unwrap(), "fresh-access");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejection_clears_credentials_for_everyone() {
        let rejected = Err(ClientError::Rejected {
            status: 401,
            message: "revoked".into(),
        });
        let (coord, refresher) = coordinator(Some(expired()), rejected);

        let (a, b) = tokio::join!(coord.ensure_valid(), coord.ensure_valid());
        assert_eq!(a, Err(ClientError::SessionExpired));
        assert_eq!(b, Err(ClientError::SessionExpired));
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert!(!coord.store().exists());
        assert!(!coord.is_refreshing());
    }

    #[tokio::test]
    async fn test_throttled_refresh_keeps_credentials() {
        let throttled = ClientError::Rejected {
            status: 429,
            message: "Too many requests".into(),
        };
        let (coord, _) = coordinator(Some(expired()), Err(throttled.clone()));
        assert_eq!(coord.ensure_valid().await, Err(throttled));
        assert!(coord.store().exists());
        assert!(!coord.is_refreshing());
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_credentials() {
        let (coord, _) = coordinator(Some(expired()), Err(ClientError::Network("reset".into())));
        assert_eq!(
            coord.ensure_valid().await,
            Err(ClientError::Network("reset".into()))
        );
        assert!(coord.store().exists());
        assert!(!coord.is_refreshing());
    }

    #[tokio::test]
    async fn test_cancelled_leader_does_not_cancel_refresh() {
        let (coord, refresher) = coordinator(Some(expired()), Ok(fresh()));

        let leader = tokio::spawn({
            let coord = coord.clone();
            async move { coord.ensure_valid().await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        leader.abort();

        assert_eq!(coord.ensure_valid().await.unwrap(), "fresh-access");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }
}
