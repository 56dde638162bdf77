//! Persistence layer: progress checkpoints and validation results.
//!
//! The scheduler only sees the [`ProgressStore`] and [`ResultSink`]
//! traits. `SQLite` backs both through [`progress_repo`] and
//! [`result_repo`]; [`jsonl_writer`] is the file-based result sink the
//! downstream aggregator reads.

pub mod db;
pub mod jsonl_writer;
pub mod progress_repo;
pub mod result_repo;
pub mod schema;

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use crate::models::checkpoint::ProgressCheckpoint;
use crate::models::result::ValidationResult;
use crate::Result;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;

/// Boxed future returned by persistence traits.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Durable home of the resumable [`ProgressCheckpoint`].
pub trait ProgressStore: Send + Sync {
    /// Load the checkpoint for `run_key`, if one was saved.
    fn load<'a>(&'a self, run_key: &'a str) -> StoreFuture<'a, Option<ProgressCheckpoint>>;

    /// Persist `checkpoint`, replacing any previous one for its run.
    fn save<'a>(&'a self, checkpoint: &'a ProgressCheckpoint) -> StoreFuture<'a, ()>;

    /// Load the checkpoint for `run_key`, or a fresh one starting at zero.
    fn load_or_default<'a>(&'a self, run_key: &'a str) -> StoreFuture<'a, ProgressCheckpoint> {
        Box::pin(async move {
            Ok(self
                .load(run_key)
                .await?
                .unwrap_or_else(|| ProgressCheckpoint::new(run_key)))
        })
    }
}

/// Append-only record of validation outcomes.
///
/// Implementations must make each successful [`append`](Self::append)
/// durable before returning so an interrupt loses nothing already flushed.
pub trait ResultSink: Send + Sync {
    /// Append a batch of results.
    fn append<'a>(&'a self, results: &'a [ValidationResult]) -> StoreFuture<'a, ()>;

    /// Input offsets that already have a recorded result.
    fn recorded_indices(&self) -> StoreFuture<'_, HashSet<usize>>;
}
