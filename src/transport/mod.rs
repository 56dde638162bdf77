//! Opaque registration-check capability behind each session.
//!
//! The [`Transport`] trait decouples the scheduler from whatever actually
//! talks to the messaging service. The scheduler only needs readiness, a
//! boolean registration answer, optional profile metadata and teardown.

pub mod http;

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::Result;

pub use http::{HttpTransport, HttpTransportFactory};

/// Typed failures surfaced by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection failure or unexpected server error.
    Network(String),
    /// The request did not complete in time.
    Timeout,
    /// The session is no longer authenticated.
    Auth(String),
    /// The remote service asked us to slow down.
    RateLimited {
        /// Suggested pause, when the service provided one.
        retry_after: Option<Duration>,
        /// Response body or status line sent with the refusal.
        detail: String,
    },
    /// The request was refused for another reason.
    Rejected(String),
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "network: {msg}"),
            Self::Timeout => write!(f, "request timed out"),
            Self::Auth(msg) => write!(f, "auth: {msg}"),
            Self::RateLimited {
                retry_after: Some(wait),
                detail,
            } => write!(f, "rate limited, retry after {}s: {detail}", wait.as_secs()),
            Self::RateLimited {
                retry_after: None,
                detail,
            } => write!(f, "rate limited: {detail}"),
            Self::Rejected(msg) => write!(f, "rejected: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Result alias for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Boxed future returned by [`Transport`] methods.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = TransportResult<T>> + Send + 'a>>;

/// One authenticated connection to the messaging service.
///
/// Implementations must be [`Send`] and [`Sync`]: in-flight checks of the
/// same session run as separate tasks sharing one `Arc<dyn Transport>`.
pub trait Transport: Send + Sync {
    /// Resolve once the session is authenticated and able to check.
    ///
    /// Callers bound this with a timeout; implementations may wait for as
    /// long as authentication takes.
    fn await_ready(&self) -> TransportFuture<'_, ()>;

    /// Ask whether `normalized_id` is registered with the service.
    fn check_registration<'a>(&'a self, normalized_id: &'a str) -> TransportFuture<'a, bool>;

    /// Fetch profile details for a registered number.
    ///
    /// Only called outside safe mode. The default reports nothing.
    fn profile_metadata<'a>(
        &'a self,
        normalized_id: &'a str,
    ) -> TransportFuture<'a, Option<serde_json::Value>> {
        let _ = normalized_id;
        Box::pin(async { Ok(None) })
    }

    /// Release the connection. Must not fail.
    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Creates a transport for each session the pool starts.
pub trait TransportFactory: Send + Sync {
    /// Build the transport for `session_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transport` if the adapter cannot be constructed.
    fn create(&self, session_id: &str) -> Result<Arc<dyn Transport>>;
}
