//! Client-side credential persistence.

mod file;
mod memory;

pub use file::FileCredentialStore;
pub use memory::InMemoryCredentialStore;

use crate::credentials::Credentials;
use crate::error::ClientResult;

/// Storage backend for one set of credentials.
pub trait CredentialStore: Send + Sync {
    fn store(&self, credentials: &Credentials) -> ClientResult<()>;

    fn load(&self) -> ClientResult<Option<Credentials>>;

    fn delete(&self) -> ClientResult<()>;

    fn exists(&self) -> bool;
}
