use std::sync::{Mutex, PoisonError};

use crate::credentials::Credentials;
use crate::error::ClientResult;
use crate::store::CredentialStore;

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    slot: Mutex<Option<Credentials>>,
}

impl InMemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            slot: Mutex::new(Some(credentials)),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Credentials>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn store(&self, credentials: &Credentials) -> ClientResult<()> {
        *self.slot() = Some(credentials.clone());
        Ok(())
    }

    fn load(&self) -> ClientResult<Option<Credentials>> {
        Ok(self.slot().clone())
    }

    fn delete(&self) -> ClientResult<()> {
        *self.slot() = None;
        Ok(())
    }

    fn exists(&self) -> bool {
        self.slot().is_some()
    }
}
