//! Session lifecycle states and counters.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status for a checking session.
///
/// `Idle → Dispatching → Awaiting → Recording → Idle` is the normal
/// cycle; `RateLimited` parks the session until its window frees up and
/// `Suspended` is terminal for the run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Transport created, waiting for readiness.
    Connecting,
    /// Ready with free capacity.
    Idle,
    /// Taking an item and starting a check.
    Dispatching,
    /// At least one check is in flight.
    Awaiting,
    /// Recording a finished check.
    Recording,
    /// Paused until the rate window frees a slot.
    RateLimited,
    /// Fatal error; receives no further work.
    Suspended,
    /// Transport released.
    Closed,
}

impl SessionStatus {
    /// Whether the session still accepts work.
    #[must_use]
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Connecting | Self::Suspended | Self::Closed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        can_transition(self, next)
    }
}

/// Determine whether a lifecycle transition is permitted.
#[must_use]
pub fn can_transition(from: SessionStatus, to: SessionStatus) -> bool {
    use SessionStatus::{
        Awaiting, Closed, Connecting, Dispatching, Idle, RateLimited, Recording, Suspended,
    };
    match (from, to) {
        (_, Closed) => from != Closed,
        (Connecting, Idle)
        | (Idle | Awaiting | Recording, Dispatching)
        | (Idle | Dispatching | Recording | RateLimited, Awaiting)
        | (Awaiting, Recording)
        | (Recording | RateLimited | Dispatching | Awaiting, Idle)
        | (Idle | Recording | Awaiting, RateLimited)
        | (RateLimited, Dispatching)
        | (Connecting | Idle | Dispatching | Awaiting | Recording | RateLimited, Suspended) => true,
        _ => false,
    }
}

/// Why a session was taken out of rotation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum SuspendReason {
    /// The remote service reported the account as banned or blocked.
    Banned(String),
    /// Authentication was lost or invalidated.
    AuthLost(String),
}

impl SuspendReason {
    /// `true` for a ban signal.
    #[must_use]
    pub fn is_ban(&self) -> bool {
        matches!(self, Self::Banned(_))
    }
}

impl Display for SuspendReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Banned(msg) => write!(f, "ban signal: {msg}"),
            Self::AuthLost(msg) => write!(f, "auth lost: {msg}"),
        }
    }
}

/// Per-session counters, mutated only by the owning driver.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionCounters {
    /// Results recorded by this session.
    pub checked: u64,
    /// Registered numbers found.
    pub verified: u64,
    /// Terminal errors.
    pub errors: u64,
    /// Completion time of the latest check.
    pub last_check_at: Option<DateTime<Utc>>,
}
