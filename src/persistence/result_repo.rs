//! Validation result repository for `SQLite` persistence.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::models::item::ValidationItem;
use crate::models::result::{CheckStatus, ValidationResult};
use crate::{AppError, Result};

use super::db::Database;
use super::progress_repo::parse_timestamp;
use super::{ResultSink, StoreFuture};

/// Result sink backed by the `validation_result` table, scoped to one run.
#[derive(Clone)]
pub struct ResultRepo {
    db: Arc<Database>,
    run_key: String,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct ResultRow {
    id: String,
    item_index: i64,
    raw_number: String,
    metadata: String,
    normalized_id: String,
    is_registered: bool,
    status: String,
    error_detail: Option<String>,
    session_id: String,
    attempts: i64,
    profile: Option<String>,
    timestamp_utc: String,
}

impl ResultRow {
    /// Convert a database row into the domain model.
    fn into_result(self) -> Result<ValidationResult> {
        let metadata: BTreeMap<String, String> = serde_json::from_str(&self.metadata)
            .map_err(|e| AppError::Db(format!("invalid metadata: {e}")))?;
        let profile = self
            .profile
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| AppError::Db(format!("invalid profile: {e}")))?;

        Ok(ValidationResult {
            id: self.id,
            index: usize::try_from(self.item_index)
                .map_err(|e| AppError::Db(format!("invalid item_index: {e}")))?,
            item: ValidationItem {
                number: self.raw_number,
                metadata,
            },
            normalized_id: self.normalized_id,
            is_registered: self.is_registered,
            status: parse_status(&self.status)?,
            error_detail: self.error_detail,
            session_id: self.session_id,
            attempts: u32::try_from(self.attempts)
                .map_err(|e| AppError::Db(format!("invalid attempts: {e}")))?,
            profile,
            timestamp_utc: parse_timestamp("timestamp_utc", &self.timestamp_utc)?,
        })
    }
}

fn parse_status(s: &str) -> Result<CheckStatus> {
    match s {
        "success" => Ok(CheckStatus::Success),
        "error" => Ok(CheckStatus::Error),
        other => Err(AppError::Db(format!("invalid check status: {other}"))),
    }
}

fn status_str(s: CheckStatus) -> &'static str {
    match s {
        CheckStatus::Success => "success",
        CheckStatus::Error => "error",
    }
}

impl ResultRepo {
    /// Create a repository writing results for `run_key`.
    #[must_use]
    pub fn new(db: Arc<Database>, run_key: impl Into<String>) -> Self {
        Self {
            db,
            run_key: run_key.into(),
        }
    }

    /// Run this repository is scoped to.
    #[must_use]
    pub fn run_key(&self) -> &str {
        &self.run_key
    }

    /// Insert a batch of results in a single transaction.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if serialization or any insert fails; nothing
    /// from the batch is kept in that case.
    pub async fn insert_batch(&self, results: &[ValidationResult]) -> Result<()> {
        let mut tx = self.db.begin().await?;
        for result in results {
            let metadata = serde_json::to_string(&result.item.metadata)
                .map_err(|e| AppError::Db(format!("serialize metadata: {e}")))?;
            let profile = result
                .profile
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| AppError::Db(format!("serialize profile: {e}")))?;
            let index = i64::try_from(result.index)
                .map_err(|e| AppError::Db(format!("item_index out of range: {e}")))?;

            sqlx::query(
                "INSERT INTO validation_result (id, run_key, item_index, raw_number,
                 metadata, normalized_id, is_registered, status, error_detail,
                 session_id, attempts, profile, timestamp_utc)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )
            .bind(&result.id)
            .bind(&self.run_key)
            .bind(index)
            .bind(&result.item.number)
            .bind(&metadata)
            .bind(&result.normalized_id)
            .bind(result.is_registered)
            .bind(status_str(result.status))
            .bind(&result.error_detail)
            .bind(&result.session_id)
            .bind(i64::from(result.attempts))
            .bind(&profile)
            .bind(result.timestamp_utc.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Input offsets with a recorded result for this run.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn indices(&self) -> Result<HashSet<usize>> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT DISTINCT item_index FROM validation_result WHERE run_key = ?1")
                .bind(&self.run_key)
                .fetch_all(self.db.as_ref())
                .await?;
        rows.into_iter()
            .map(|(index,)| {
                usize::try_from(index)
                    .map_err(|e| AppError::Db(format!("invalid item_index: {e}")))
            })
            .collect()
    }

    /// Count recorded results for this run.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn count_for_run(&self) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM validation_result WHERE run_key = ?1")
                .bind(&self.run_key)
                .fetch_one(self.db.as_ref())
                .await?;
        u64::try_from(count).map_err(|e| AppError::Db(format!("invalid count: {e}")))
    }

    /// List recorded results for this run ordered by input offset.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails or a row is malformed.
    pub async fn list_for_run(&self) -> Result<Vec<ValidationResult>> {
        let rows: Vec<ResultRow> = sqlx::query_as(
            "SELECT * FROM validation_result WHERE run_key = ?1
             ORDER BY item_index ASC, timestamp_utc ASC",
        )
        .bind(&self.run_key)
        .fetch_all(self.db.as_ref())
        .await?;
        rows.into_iter().map(ResultRow::into_result).collect()
    }

    /// Delete all results for this run, used by `--fresh`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn delete_for_run(&self) -> Result<()> {
        sqlx::query("DELETE FROM validation_result WHERE run_key = ?1")
            .bind(&self.run_key)
            .execute(self.db.as_ref())
            .await?;
        Ok(())
    }
}

impl ResultSink for ResultRepo {
    fn append<'a>(&'a self, results: &'a [ValidationResult]) -> StoreFuture<'a, ()> {
        Box::pin(self.insert_batch(results))
    }

    fn recorded_indices(&self) -> StoreFuture<'_, HashSet<usize>> {
        Box::pin(self.indices())
    }
}
