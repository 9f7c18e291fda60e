//! Client side of warden sessions.
//!
//! Stores credentials (in memory or encrypted on disk), keeps the access
//! token fresh with a single shared refresh per expiry, and notifies when a
//! session runs out.

pub mod coordinator;
pub mod credentials;
pub mod error;
pub mod refresher;
pub mod store;
pub mod timer;

pub use coordinator::{RefreshConfig, RefreshCoordinator};
pub use credentials::Credentials;
pub use error::{ClientError, ClientResult};
pub use refresher::{HttpTokenRefresher, TokenRefresher, DEFAULT_REQUEST_TIMEOUT};
pub use store::{CredentialStore, FileCredentialStore, InMemoryCredentialStore};
pub use timer::SessionExpiryTimer;
