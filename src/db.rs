//! SQLite storage for durable resume records.
//!
//! A [`Database`] owns a small connection pool with the schema in
//! `migrations/` applied. File-backed databases run in WAL mode.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use transfer_core::{Database, SqliteResumeStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(Path::new(".transfer-state.db")).await?;
//! let store = SqliteResumeStore::new(db);
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::{debug, instrument};

/// Resume records are tiny and written once per transfer attempt.
const MAX_CONNECTIONS: u32 = 2;

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors opening or migrating the state database.
#[derive(Error, Debug)]
pub enum DbError {
    /// The database file could not be opened or created.
    #[error("failed to open state database at {path}: {source}")]
    Open {
        /// Path that was opened.
        path: PathBuf,
        /// Underlying driver error.
        #[source]
        source: sqlx::Error,
    },

    /// A query against an open database failed.
    #[error("state database query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// The schema could not be brought up to date.
    #[error("failed to migrate state database: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Connection pool over the resume-record schema.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the database at `path` and applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Open`] when the file cannot be opened as SQLite, or
    /// [`DbError::Migration`] when the schema cannot be applied.
    #[instrument(skip(path), fields(path = %path.display()))]
    pub async fn new(path: &Path) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|source| DbError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        Self::migrated(pool).await
    }

    /// Opens a private in-memory database. Nothing survives the pool.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Query`] if SQLite cannot be initialized, or
    /// [`DbError::Migration`] when the schema cannot be applied.
    #[instrument]
    pub async fn new_in_memory() -> Result<Self, DbError> {
        let options: SqliteConnectOptions = "sqlite::memory:".parse()?;
        // a second connection would open its own empty database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Self::migrated(pool).await
    }

    async fn migrated(pool: SqlitePool) -> Result<Self, DbError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        debug!("state database ready");
        Ok(Self { pool })
    }

    /// Underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Current `journal_mode`, lowercased.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Query`] if the pragma cannot be read.
    pub async fn journal_mode(&self) -> Result<String, DbError> {
        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&self.pool)
            .await?;
        Ok(mode.to_ascii_lowercase())
    }

    /// Closes every pooled connection, checkpointing the WAL.
    #[instrument(skip(self))]
    pub async fn close(self) {
        self.pool.close().await;
    }
}
