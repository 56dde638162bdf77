//! Transport failure classification.
//!
//! Decides per error whether the item is retried, the session pauses,
//! or the session leaves the rotation for good.

use std::time::Duration;

use regex::{RegexSet, RegexSetBuilder};

use crate::transport::TransportError;
use crate::{AppError, Result};

/// How the scheduler reacts to a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Transient; retry the item after a short backoff.
    Retryable,
    /// The service asked for a pause; not counted as an error.
    Throttled(Option<Duration>),
    /// The item itself was refused; record an error without retrying.
    Terminal,
    /// Authentication lost; suspend the session.
    AuthLost,
    /// Account banned or blocked; suspend the session and alert.
    Banned,
}

/// Maps [`TransportError`]s to a [`FailureClass`].
///
/// Ban signatures are matched case-insensitively against the rendered
/// error message and take precedence over the error variant.
#[derive(Debug, Clone)]
pub struct FailureClassifier {
    ban_signatures: RegexSet,
}

impl FailureClassifier {
    /// Compile the ban signature patterns.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a pattern is not a valid regex.
    pub fn new(ban_patterns: &[String]) -> Result<Self> {
        let ban_signatures = RegexSetBuilder::new(ban_patterns)
            .case_insensitive(true)
            .build()
            .map_err(|err| AppError::Config(format!("invalid ban pattern: {err}")))?;
        Ok(Self { ban_signatures })
    }

    /// Whether `message` looks like the account was banned or blocked.
    #[must_use]
    pub fn is_ban_signal(&self, message: &str) -> bool {
        self.ban_signatures.is_match(message)
    }

    /// Classify one transport failure.
    #[must_use]
    pub fn classify(&self, err: &TransportError) -> FailureClass {
        if self.is_ban_signal(&err.to_string()) {
            return FailureClass::Banned;
        }
        match err {
            TransportError::Network(_) | TransportError::Timeout => FailureClass::Retryable,
            TransportError::Auth(_) => FailureClass::AuthLost,
            TransportError::RateLimited { retry_after, .. } => FailureClass::Throttled(*retry_after),
            TransportError::Rejected(_) => FailureClass::Terminal,
        }
    }
}
