//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS`; safe to
//! re-run on every startup.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS progress_checkpoint (
    run_key         TEXT PRIMARY KEY NOT NULL,
    last_index      INTEGER NOT NULL,
    total_checked   INTEGER NOT NULL DEFAULT 0,
    total_verified  INTEGER NOT NULL DEFAULT 0,
    total_errors    INTEGER NOT NULL DEFAULT 0,
    start_time      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS validation_result (
    id              TEXT PRIMARY KEY NOT NULL,
    run_key         TEXT NOT NULL,
    item_index      INTEGER NOT NULL,
    raw_number      TEXT NOT NULL,
    metadata        TEXT NOT NULL,
    normalized_id   TEXT NOT NULL,
    is_registered   INTEGER NOT NULL,
    status          TEXT NOT NULL CHECK(status IN ('success','error')),
    error_detail    TEXT,
    session_id      TEXT NOT NULL,
    attempts        INTEGER NOT NULL,
    profile         TEXT,
    timestamp_utc   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_result_run ON validation_result(run_key, item_index);
CREATE INDEX IF NOT EXISTS idx_result_normalized ON validation_result(normalized_id);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
