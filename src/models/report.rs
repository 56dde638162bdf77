//! Final run statistics.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use super::result::ValidationResult;
use super::session::{SessionStatus, SuspendReason};

/// Per-session breakdown of a run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionSummary {
    /// Session identifier.
    pub session_id: String,
    /// Status when the run ended.
    pub status: SessionStatus,
    /// Results produced by the session.
    pub checked: u64,
    /// Registered numbers found by the session.
    pub verified: u64,
    /// Terminal errors produced by the session.
    pub errors: u64,
}

/// A session that left the rotation during the run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Suspension {
    /// Session identifier.
    pub session_id: String,
    /// Reason reported by the classifier.
    pub reason: SuspendReason,
}

/// A session that never became ready.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StartupFailure {
    /// Session identifier.
    pub session_id: String,
    /// Why startup failed.
    pub reason: String,
}

/// Aggregate statistics emitted when the scheduler stops.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RunReport {
    /// Items queued for this run.
    pub queued: usize,
    /// Results recorded in this run.
    pub checked: u64,
    /// Successful checks reporting a registered number.
    pub verified: u64,
    /// Successful checks reporting an unregistered number.
    pub not_registered: u64,
    /// Terminal errors.
    pub errors: u64,
    /// Items still queued when the run stopped.
    pub unprocessed: usize,
    /// Wall-clock duration of the run.
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
    /// Whether an interrupt stopped the run.
    pub cancelled: bool,
    /// Per-session breakdown ordered by session id.
    pub sessions: Vec<SessionSummary>,
    /// Sessions suspended during the run.
    pub suspensions: Vec<Suspension>,
    /// Sessions that failed to start.
    pub startup_failures: Vec<StartupFailure>,
}

impl RunReport {
    /// Derive the report from the accumulated results.
    ///
    /// Counts come only from `results`, so the same result set always
    /// yields the same numbers regardless of completion order. The caller
    /// fills `suspensions` and `startup_failures`.
    #[must_use]
    pub fn from_results(
        results: &[ValidationResult],
        statuses: &BTreeMap<String, SessionStatus>,
        queued: usize,
        unprocessed: usize,
        elapsed: Duration,
        cancelled: bool,
    ) -> Self {
        let mut per_session: BTreeMap<String, SessionSummary> = statuses
            .iter()
            .map(|(id, status)| {
                (
                    id.clone(),
                    SessionSummary {
                        session_id: id.clone(),
                        status: *status,
                        checked: 0,
                        verified: 0,
                        errors: 0,
                    },
                )
            })
            .collect();

        let mut report = Self {
            queued,
            checked: 0,
            verified: 0,
            not_registered: 0,
            errors: 0,
            unprocessed,
            elapsed,
            cancelled,
            sessions: Vec::new(),
            suspensions: Vec::new(),
            startup_failures: Vec::new(),
        };

        for result in results {
            report.checked += 1;
            let summary = per_session
                .entry(result.session_id.clone())
                .or_insert_with(|| SessionSummary {
                    session_id: result.session_id.clone(),
                    status: SessionStatus::Closed,
                    checked: 0,
                    verified: 0,
                    errors: 0,
                });
            summary.checked += 1;
            if result.is_error() {
                report.errors += 1;
                summary.errors += 1;
            } else if result.is_verified() {
                report.verified += 1;
                summary.verified += 1;
            } else {
                report.not_registered += 1;
            }
        }

        report.sessions = per_session.into_values().collect();
        report
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }
}
