//! Error types for the warden-db crate.

use thiserror::Error;
use warden_core::WardenError;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to establish or acquire a database connection.
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[source] sqlx::Error),

    /// A database migration failed to apply.
    #[error("Migration failed: {0}")]
    MigrationFailed(#[source] sqlx::migrate::MigrateError),

    /// A database query failed to execute.
    #[error("Query failed: {0}")]
    QueryFailed(#[source] sqlx::Error),

    /// A unique or foreign-key constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A stored row could not be mapped back into a domain type.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl DbError {
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, DbError::Conflict(_))
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound(_))
    }

    /// Classify a query error, turning constraint violations into `Conflict`.
    pub(crate) fn from_query(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return DbError::Conflict(
                    db_err
                        .constraint()
                        .map_or_else(|| "duplicate key".to_string(), |c| format!("duplicate key ({c})")),
                );
            }
            if db_err.is_foreign_key_violation() {
                return DbError::Conflict(
                    db_err
                        .constraint()
                        .map_or_else(|| "still referenced".to_string(), |c| format!("still referenced ({c})")),
                );
            }
        }
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DbError::ConnectionFailed(err)
            }
            other => DbError::QueryFailed(other),
        }
    }
}

impl From<DbError> for WardenError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Conflict(msg) => WardenError::conflict(msg),
            DbError::NotFound(what) => WardenError::NotFound {
                resource: what,
                id: None,
            },
            other => WardenError::database(other.to_string()),
        }
    }
}

/// Result alias for repository calls.
pub type DbResult<T> = Result<T, DbError>;
