//! Result buffering and periodic checkpointing.
//!
//! The recorder is the only mutable state shared between session drivers;
//! the scheduler keeps it behind a `tokio::sync::Mutex`.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::models::checkpoint::ProgressCheckpoint;
use crate::models::result::ValidationResult;
use crate::persistence::{ProgressStore, ResultSink};
use crate::Result;

/// Buffers results and persists them with the checkpoint every `every`
/// recorded items.
///
/// `last_index` only advances over offsets whose results reached the sink,
/// so a saved checkpoint never claims more than was flushed.
pub struct Recorder {
    sink: Arc<dyn ResultSink>,
    store: Arc<dyn ProgressStore>,
    checkpoint: ProgressCheckpoint,
    every: usize,
    pending: Vec<ValidationResult>,
    results: Vec<ValidationResult>,
    flushed_ahead: BTreeSet<usize>,
}

impl Recorder {
    /// Create a recorder continuing from `checkpoint`.
    ///
    /// `already_recorded` holds offsets the sink already has; they let the
    /// watermark move past work finished before the last checkpoint save.
    #[must_use]
    pub fn new(
        sink: Arc<dyn ResultSink>,
        store: Arc<dyn ProgressStore>,
        checkpoint: ProgressCheckpoint,
        every: usize,
        already_recorded: &HashSet<usize>,
    ) -> Self {
        let flushed_ahead = already_recorded
            .iter()
            .copied()
            .filter(|&index| index >= checkpoint.last_index)
            .collect();
        let mut recorder = Self {
            sink,
            store,
            checkpoint,
            every: every.max(1),
            pending: Vec::new(),
            results: Vec::new(),
            flushed_ahead,
        };
        recorder.advance_watermark();
        recorder
    }

    /// Record one terminal result.
    ///
    /// Returns the saved checkpoint when this result completed a batch.
    ///
    /// # Errors
    ///
    /// Returns the sink or store error if the batch flush failed. The
    /// result stays buffered and is retried on the next flush.
    pub async fn record(&mut self, result: ValidationResult) -> Result<Option<ProgressCheckpoint>> {
        self.results.push(result.clone());
        self.pending.push(result);
        if self.pending.len() < self.every {
            return Ok(None);
        }
        self.flush().await.map(Some)
    }

    /// Append all buffered results to the sink and save the checkpoint.
    ///
    /// # Errors
    ///
    /// Returns the sink error (buffer kept) or the store error (results
    /// already appended; the next save catches the checkpoint up).
    pub async fn flush(&mut self) -> Result<ProgressCheckpoint> {
        if !self.pending.is_empty() {
            self.sink.append(&self.pending).await?;
            for result in self.pending.drain(..) {
                self.checkpoint.total_checked += 1;
                if result.is_error() {
                    self.checkpoint.total_errors += 1;
                } else if result.is_registered {
                    self.checkpoint.total_verified += 1;
                }
                self.flushed_ahead.insert(result.index);
            }
            self.advance_watermark();
        }

        self.checkpoint.updated_at = Utc::now();
        self.store.save(&self.checkpoint).await?;
        debug!(
            run_key = %self.checkpoint.run_key,
            last_index = self.checkpoint.last_index,
            total_checked = self.checkpoint.total_checked,
            "checkpoint saved"
        );
        Ok(self.checkpoint.clone())
    }

    fn advance_watermark(&mut self) {
        while self.flushed_ahead.remove(&self.checkpoint.last_index) {
            self.checkpoint.last_index += 1;
        }
    }

    /// Every result recorded during this run, flushed or not.
    #[must_use]
    pub fn results(&self) -> &[ValidationResult] {
        &self.results
    }

    /// Results waiting for the next flush.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// The checkpoint as of the last flush.
    #[must_use]
    pub fn checkpoint(&self) -> &ProgressCheckpoint {
        &self.checkpoint
    }
}
