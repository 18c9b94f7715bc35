//! Persisted expected-total records keyed by transfer identity.
//!
//! A record only gates whether a partial file may be resumed. It never decides
//! whether bytes already on disk are correct.

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::db::Database;

/// Errors raised by a [`ResumeStateStore`].
#[derive(Debug, Error)]
pub enum ResumeStoreError {
    /// The backing database rejected the operation.
    #[error("resume record query failed: {0}")]
    Database(#[from] sqlx::Error),

    /// Totals are byte counts and can never be negative.
    #[error("resume record for {key} must not be negative (got {value})")]
    NegativeTotal {
        /// Identity key being written.
        key: String,
        /// Rejected value.
        value: i64,
    },
}

/// Asynchronous key-value access to resume records.
#[async_trait]
pub trait ResumeStateStore: Send + Sync {
    /// Returns the recorded total for `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<i64>, ResumeStoreError>;

    /// Records `value` as the expected total for `key`, replacing any prior record.
    async fn set(&self, key: &str, value: i64) -> Result<(), ResumeStoreError>;

    /// Deletes the record for `key`. Deleting a missing record is not an error.
    async fn remove(&self, key: &str) -> Result<(), ResumeStoreError>;
}

fn check_total(key: &str, value: i64) -> Result<(), ResumeStoreError> {
    if value < 0 {
        return Err(ResumeStoreError::NegativeTotal {
            key: key.to_string(),
            value,
        });
    }
    Ok(())
}

/// Durable store backed by the `resume_record` table.
#[derive(Debug, Clone)]
pub struct SqliteResumeStore {
    db: Database,
}

impl SqliteResumeStore {
    /// Wraps an open database. Migrations have already run.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ResumeStateStore for SqliteResumeStore {
    #[instrument(level = "debug", skip(self))]
    async fn get(&self, key: &str) -> Result<Option<i64>, ResumeStoreError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT expected_total FROM resume_record WHERE transfer_key = ?")
                .bind(key)
                .fetch_optional(self.db.pool())
                .await?;
        Ok(row.map(|(total,)| total))
    }

    #[instrument(level = "debug", skip(self))]
    async fn set(&self, key: &str, value: i64) -> Result<(), ResumeStoreError> {
        check_total(key, value)?;
        sqlx::query(
            r"
            INSERT INTO resume_record (transfer_key, expected_total)
            VALUES (?, ?)
            ON CONFLICT(transfer_key) DO UPDATE SET
                expected_total = excluded.expected_total,
                updated_at = datetime('now')
            ",
        )
        .bind(key)
        .bind(value)
        .execute(self.db.pool())
        .await?;
        debug!("resume record stored");
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn remove(&self, key: &str) -> Result<(), ResumeStoreError> {
        let result = sqlx::query("DELETE FROM resume_record WHERE transfer_key = ?")
            .bind(key)
            .execute(self.db.pool())
            .await?;
        debug!(rows = result.rows_affected(), "resume record removed");
        Ok(())
    }
}

/// Process-local store for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryResumeStore {
    records: DashMap<String, i64>,
}

impl MemoryResumeStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true when no records are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl ResumeStateStore for MemoryResumeStore {
    async fn get(&self, key: &str) -> Result<Option<i64>, ResumeStoreError> {
        Ok(self.records.get(key).map(|entry| *entry.value()))
    }

    async fn set(&self, key: &str, value: i64) -> Result<(), ResumeStoreError> {
        check_total(key, value)?;
        self.records.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), ResumeStoreError> {
        self.records.remove(key);
        Ok(())
    }
}
