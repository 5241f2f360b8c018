//! Database layer for the ScalpelLab recording database.
//!
//! Every read and write of the SQLite file goes through [`ScalpelDb`]. The CLI
//! reconcilers, the path mapper and the dashboard all share it.
//!
//! # Usage
//!
//! ```rust,ignore
//! use scalpel_db::{ScalpelDb, StatusKind};
//!
//! let db = ScalpelDb::open("ScalpelDatabase.sqlite").await?;
//! let summary = db.status_summary(StatusKind::Mp4.default_table()).await?;
//! ```

mod error;
mod schema;
mod types;

pub mod seniority;
pub mod sql_guard;

// Method implementations organized by concern
mod browse;
mod diagram;
mod query;
mod records;
mod status;

pub use browse::{DEFAULT_BROWSE_LIMIT, MAX_BROWSE_LIMIT};
pub use error::{DbError, Result};
pub use query::StatusQuery;
pub use seniority::{seniority_at, Seniority};
pub use status::{diff_status, validate_table_name};
pub use types::*;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Handle to one ScalpelLab database file.
#[derive(Clone)]
pub struct ScalpelDb {
    pool: SqlitePool,
    path: PathBuf,
    read_only: bool,
}

impl ScalpelDb {
    /// Open or create a database at the given path.
    ///
    /// Creates all tables and views if they don't exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self {
            pool,
            path: path.to_path_buf(),
            read_only: false,
        };
        db.ensure_schema().await?;

        info!(path = %path.display(), "Database opened");
        Ok(db)
    }

    /// Open an existing database for reading and writing (fails if not exists).
    ///
    /// The schema is left as found.
    pub async fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        Self::require_file(path)?;

        let options = SqliteConnectOptions::new()
            .filename(path)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self {
            pool,
            path: path.to_path_buf(),
            read_only: false,
        })
    }

    /// Open an existing database on read-only connections.
    ///
    /// SQLite itself refuses every write on these connections.
    pub async fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        Self::require_file(path)?;

        let options = SqliteConnectOptions::new().filename(path).read_only(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await?;

        debug!(path = %path.display(), "Database opened read-only");
        Ok(Self {
            pool,
            path: path.to_path_buf(),
            read_only: true,
        })
    }

    fn require_file(path: &Path) -> Result<()> {
        if !path.is_file() {
            return Err(DbError::NotFound(format!(
                "Database not found: {}",
                path.display()
            )));
        }
        Ok(())
    }

    /// Get the underlying connection pool.
    ///
    /// Prefer using the typed methods instead.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Close the database connection.
    pub async fn close(self) {
        self.pool.close().await;
    }
}
