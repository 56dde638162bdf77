//! Progress checkpoint repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::checkpoint::ProgressCheckpoint;
use crate::{AppError, Result};

use super::db::Database;
use super::{ProgressStore, StoreFuture};

/// Repository wrapper around `SQLite` for progress checkpoints.
#[derive(Clone)]
pub struct ProgressRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct ProgressRow {
    run_key: String,
    last_index: i64,
    total_checked: i64,
    total_verified: i64,
    total_errors: i64,
    start_time: String,
    updated_at: String,
}

impl ProgressRow {
    /// Convert a database row into the domain model.
    fn into_checkpoint(self) -> Result<ProgressCheckpoint> {
        Ok(ProgressCheckpoint {
            run_key: self.run_key,
            last_index: usize::try_from(self.last_index)
                .map_err(|e| AppError::Db(format!("invalid last_index: {e}")))?,
            total_checked: to_count("total_checked", self.total_checked)?,
            total_verified: to_count("total_verified", self.total_verified)?,
            total_errors: to_count("total_errors", self.total_errors)?,
            start_time: parse_timestamp("start_time", &self.start_time)?,
            updated_at: parse_timestamp("updated_at", &self.updated_at)?,
        })
    }
}

fn to_count(field: &str, value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|e| AppError::Db(format!("invalid {field}: {e}")))
}

fn to_sql_int<T>(field: &str, value: T) -> Result<i64>
where
    i64: TryFrom<T>,
    <i64 as TryFrom<T>>::Error: std::fmt::Display,
{
    i64::try_from(value).map_err(|e| AppError::Db(format!("{field} out of range: {e}")))
}

pub(super) fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| AppError::Db(format!("invalid {field}: {e}")))
}

impl ProgressRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Retrieve the checkpoint for `run_key`.
    ///
    /// Returns `Ok(None)` if the run has never saved one.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails or the row is malformed.
    pub async fn get(&self, run_key: &str) -> Result<Option<ProgressCheckpoint>> {
        let row: Option<ProgressRow> =
            sqlx::query_as("SELECT * FROM progress_checkpoint WHERE run_key = ?1")
                .bind(run_key)
                .fetch_optional(self.db.as_ref())
                .await?;
        row.map(ProgressRow::into_checkpoint).transpose()
    }

    /// Insert or replace the checkpoint for its run.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the upsert fails.
    pub async fn upsert(&self, checkpoint: &ProgressCheckpoint) -> Result<()> {
        sqlx::query(
            "INSERT INTO progress_checkpoint (run_key, last_index, total_checked,
             total_verified, total_errors, start_time, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(run_key) DO UPDATE SET
                last_index = excluded.last_index,
                total_checked = excluded.total_checked,
                total_verified = excluded.total_verified,
                total_errors = excluded.total_errors,
                updated_at = excluded.updated_at",
        )
        .bind(&checkpoint.run_key)
        .bind(to_sql_int("last_index", checkpoint.last_index)?)
        .bind(to_sql_int("total_checked", checkpoint.total_checked)?)
        .bind(to_sql_int("total_verified", checkpoint.total_verified)?)
        .bind(to_sql_int("total_errors", checkpoint.total_errors)?)
        .bind(checkpoint.start_time.to_rfc3339())
        .bind(checkpoint.updated_at.to_rfc3339())
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Delete the checkpoint for `run_key`, used by `--fresh`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn delete(&self, run_key: &str) -> Result<()> {
        sqlx::query("DELETE FROM progress_checkpoint WHERE run_key = ?1")
            .bind(run_key)
            .execute(self.db.as_ref())
            .await?;
        Ok(())
    }
}

impl ProgressStore for ProgressRepo {
    fn load<'a>(&'a self, run_key: &'a str) -> StoreFuture<'a, Option<ProgressCheckpoint>> {
        Box::pin(self.get(run_key))
    }

    fn save<'a>(&'a self, checkpoint: &'a ProgressCheckpoint) -> StoreFuture<'a, ()> {
        Box::pin(self.upsert(checkpoint))
    }
}
