//! Resumable progress checkpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable snapshot of how far a run has progressed.
///
/// `last_index` is a watermark: every item before it has a recorded
/// result. Items at or beyond it may still be partially done, which is
/// why resume also consults the result sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ProgressCheckpoint {
    /// Run this checkpoint belongs to.
    pub run_key: String,
    /// First input offset not yet known to be complete.
    pub last_index: usize,
    /// Cumulative results recorded across all resumes.
    pub total_checked: u64,
    /// Cumulative registered results.
    pub total_verified: u64,
    /// Cumulative terminal errors.
    pub total_errors: u64,
    /// When the run first started.
    pub start_time: DateTime<Utc>,
    /// Last save timestamp.
    pub updated_at: DateTime<Utc>,
}

impl ProgressCheckpoint {
    /// A fresh checkpoint starting at offset zero.
    #[must_use]
    pub fn new(run_key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_key: run_key.into(),
            last_index: 0,
            total_checked: 0,
            total_verified: 0,
            total_errors: 0,
            start_time: now,
            updated_at: now,
        }
    }
}
