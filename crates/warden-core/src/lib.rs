//! warden Core Library
//!
//! Shared types for the warden authorization workspace.
//!
//! # Modules
//!
//! - [`ids`] - Strongly typed integer identifiers (UserId, RoleId, FeatureId, PolicyId)
//! - [`error`] - The error taxonomy every crate converts into (WardenError)
//! - [`envelope`] - The `{success, message?, data?, error?}` wire envelope
//!
//! # Example
//!
//! ```
//! use warden_core::{UserId, WardenError, Result};
//!
//! fn lookup(id: UserId) -> Result<String> {
//!     Err(WardenError::not_found("User", id))
//! }
//!
//! let err = lookup(UserId::new(7)).unwrap_err();
//! assert_eq!(err.status_code(), 404);
//! ```

pub mod envelope;
pub mod error;
pub mod ids;

pub use envelope::{ApiEnvelope, ErrorBody};
pub use error::{Result, WardenError};
pub use ids::{FeatureId, ParseIdError, PolicyId, RoleId, UserId};
