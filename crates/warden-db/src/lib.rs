//! Persistence for warden.
//!
//! The authorization core consumes storage only through the async traits in
//! [`repository`]. Two implementations are provided:
//!
//! - [`InMemoryStore`] for tests and local development
//! - [`PgStore`] on PostgreSQL via sqlx, with embedded migrations
//!
//! # Example
//!
//! ```rust,ignore
//! use warden_db::{DbPool, PgStore, run_migrations};
//!
//! let pool = DbPool::connect("postgres://localhost/warden").await?;
//! run_migrations(&pool).await?;
//! let store = PgStore::new(pool);
//! ```

pub mod error;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod pool;
pub mod postgres;
pub mod repository;

pub use error::{DbError, DbResult};
pub use memory::InMemoryStore;
pub use migrations::run_migrations;
pub use pool::DbPool;
pub use postgres::PgStore;
pub use repository::{
    AuditRepository, FeatureRepository, PolicyRepository, RefreshTokenRepository, Repository,
    RoleRepository, UserRepository,
};
