//! Input items awaiting a registration check.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One raw phone number loaded from the input list.
///
/// Immutable once enqueued; any extra input columns travel along as
/// `metadata` so they reappear next to the outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ValidationItem {
    /// Raw number exactly as supplied.
    pub number: String,
    /// Additional input columns keyed by header name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl ValidationItem {
    /// Construct an item without metadata.
    #[must_use]
    pub fn new(number: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata column.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// An item together with its position in the original input list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedItem {
    /// Zero-based offset in the input list.
    pub index: usize,
    /// The item itself.
    pub item: ValidationItem,
}
