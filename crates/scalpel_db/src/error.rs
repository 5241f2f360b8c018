//! Error types for the database layer.

use crate::types::StatusKey;
use thiserror::Error;

/// Database operation result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error (connection, query, etc.)
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// IO error (file system operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Constraint violation (unique, foreign key, check)
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Caller supplied something the schema cannot hold
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A query that must be read-only was rejected before execution
    #[error("Query rejected: {0}")]
    ReadOnlyViolation(#[from] crate::sql_guard::SqlGuardError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A status batch was rolled back. Nothing in `uncommitted` reached the table.
    #[error(
        "Write to {table} aborted{}: {} row(s) not committed: {source}",
        .failed.as_ref().map(|k| format!(" at {}", k)).unwrap_or_default(),
        .uncommitted.len()
    )]
    BatchWrite {
        table: String,
        failed: Option<StatusKey>,
        uncommitted: Vec<StatusKey>,
        #[source]
        source: sqlx::Error,
    },
}

impl DbError {
    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a constraint error.
    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::Constraint(msg.into())
    }

    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// True for unique / foreign key / not-null / check failures reported by SQLite.
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            DbError::Constraint(_) => true,
            DbError::Sqlx(sqlx::Error::Database(e)) => {
                !matches!(e.kind(), sqlx::error::ErrorKind::Other)
            }
            _ => false,
        }
    }
}
