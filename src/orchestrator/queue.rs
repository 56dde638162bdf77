//! Shared pool of items not yet dispatched.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};

use tokio::sync::Notify;

use crate::models::checkpoint::ProgressCheckpoint;
use crate::models::item::{QueuedItem, ValidationItem};

/// Ordered queue shared by every session driver.
///
/// Removal is exclusive: an item handed out by [`take`](Self::take) is
/// never handed out again. There is no re-insertion; failures become
/// terminal results instead.
#[derive(Debug, Default)]
pub struct WorkQueue {
    items: Mutex<VecDeque<QueuedItem>>,
    queued: usize,
    emptied: Notify,
}

impl WorkQueue {
    /// Queue every item, keeping its input offset.
    #[must_use]
    pub fn from_items(items: Vec<ValidationItem>) -> Self {
        Self::from_queued(
            items
                .into_iter()
                .enumerate()
                .map(|(index, item)| QueuedItem { index, item })
                .collect(),
        )
    }

    /// Queue the items a resumed run still has to check.
    ///
    /// Offsets before `checkpoint.last_index` are skipped, as are offsets
    /// already present in the result sink (`recorded`).
    #[must_use]
    pub fn resume(
        items: Vec<ValidationItem>,
        checkpoint: &ProgressCheckpoint,
        recorded: &HashSet<usize>,
    ) -> Self {
        Self::from_queued(
            items
                .into_iter()
                .enumerate()
                .skip(checkpoint.last_index)
                .filter(|(index, _)| !recorded.contains(index))
                .map(|(index, item)| QueuedItem { index, item })
                .collect(),
        )
    }

    fn from_queued(items: VecDeque<QueuedItem>) -> Self {
        let queued = items.len();
        Self {
            items: Mutex::new(items),
            queued,
            emptied: Notify::new(),
        }
    }

    /// Remove and return the next item, or `None` when drained.
    pub fn take(&self) -> Option<QueuedItem> {
        let (item, now_empty) = {
            let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
            let item = items.pop_front();
            (item, items.is_empty())
        };
        if now_empty {
            self.emptied.notify_waiters();
        }
        item
    }

    /// Resolve once the queue holds no items.
    pub async fn wait_empty(&self) {
        let notified = self.emptied.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_empty() {
            return;
        }
        notified.await;
    }

    /// Remove everything still queued, e.g. to report it as unprocessed.
    pub fn drain_remaining(&self) -> Vec<QueuedItem> {
        let remaining = self
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        self.emptied.notify_waiters();
        remaining
    }

    /// Advisory emptiness check; [`take`](Self::take) may still race to `None`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items still waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Items queued at construction.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queued
    }
}
