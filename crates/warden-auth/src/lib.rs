//! Token codec and password hashing for warden.
//!
//! This crate provides:
//! - Signed access/refresh token issuance and verification with typed failures
//!   (`Malformed`, `SignatureInvalid`, `Expired`)
//! - Unverified claim introspection for expiry countdowns
//! - Argon2id password hashing
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use warden_auth::{issue, verify, TokenClaims, TokenKind};
//! use warden_core::UserId;
//!
//! let secret = b"an-example-secret-that-is-long-enough";
//! let claims = TokenClaims::builder()
//!     .user_id(UserId::new(1))
//!     .email("ada@example.com")
//!     .kind(TokenKind::Access)
//!     .build();
//!
//! let token = issue(&claims, secret, Duration::from_secs(900)).unwrap();
//! let decoded = verify(&token, secret).unwrap();
//! assert_eq!(decoded.user_id(), Some(UserId::new(1)));
//! ```

mod claims;
mod codec;
mod error;
mod jwt;
mod password;

pub use claims::{TokenClaims, TokenClaimsBuilder, TokenKind};
pub use codec::{TokenCodec, TokenConfig};
pub use error::AuthError;
pub use jwt::{
    decode_unsafe, issue, remaining_ttl, remaining_ttl_at, verify, verify_at, will_expire_within,
};
pub use password::{hash_password, verify_password, PasswordHasher};
