//! Error types for inventory scans and reconciliation.

use scalpel_db::DbError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScanError>;

/// Fatal scanner errors. Anything below the root is logged and skipped instead.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Root path not found: {0}")]
    RootNotFound(PathBuf),

    #[error("Root path is not a directory: {0}")]
    RootNotADirectory(PathBuf),

    #[error("Cannot read root directory {path}: {source}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid directory pattern: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("Scan task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
