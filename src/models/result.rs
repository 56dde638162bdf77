//! Terminal outcome of checking one item.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::item::ValidationItem;

/// Whether the check completed or ended in a terminal error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// The transport answered; `is_registered` is meaningful.
    Success,
    /// Retries were exhausted or the session failed fatally.
    Error,
}

/// Immutable record of one completed check, appended to the result sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ValidationResult {
    /// Unique record identifier.
    pub id: String,
    /// Offset of the item in the input list.
    pub index: usize,
    /// The item that was checked.
    pub item: ValidationItem,
    /// Canonical number; empty when the raw number could not be normalized.
    pub normalized_id: String,
    /// Registration flag reported by the transport.
    pub is_registered: bool,
    /// Success or terminal error.
    pub status: CheckStatus,
    /// Error description for `Error` results.
    pub error_detail: Option<String>,
    /// Session that produced the outcome.
    pub session_id: String,
    /// Transport attempts made, including retries.
    pub attempts: u32,
    /// Profile metadata, only fetched outside safe mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<serde_json::Value>,
    /// Completion timestamp.
    pub timestamp_utc: DateTime<Utc>,
}

impl ValidationResult {
    /// Build a successful result.
    #[must_use]
    pub fn success(
        index: usize,
        item: ValidationItem,
        normalized_id: String,
        is_registered: bool,
        session_id: &str,
        attempts: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            index,
            item,
            normalized_id,
            is_registered,
            status: CheckStatus::Success,
            error_detail: None,
            session_id: session_id.to_owned(),
            attempts,
            profile: None,
            timestamp_utc: Utc::now(),
        }
    }

    /// Build a terminal error result.
    #[must_use]
    pub fn error(
        index: usize,
        item: ValidationItem,
        normalized_id: String,
        detail: String,
        session_id: &str,
        attempts: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            index,
            item,
            normalized_id,
            is_registered: false,
            status: CheckStatus::Error,
            error_detail: Some(detail),
            session_id: session_id.to_owned(),
            attempts,
            profile: None,
            timestamp_utc: Utc::now(),
        }
    }

    /// `true` for a successful check reporting a registered number.
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.status == CheckStatus::Success && self.is_registered
    }

    /// `true` for a terminal error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == CheckStatus::Error
    }
}
