//! A single authenticated checking session.
//!
//! A [`Session`] is owned by exactly one scheduler driver, so its counters,
//! rate window and RNG need no locking. The part that runs concurrently is
//! the [`Checker`]: a cheap clone handed to each in-flight check task.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fastrand::Rng;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::classify::{FailureClass, FailureClassifier};
use crate::config::{DelayConfig, GlobalConfig, RateLimitConfig};
use crate::models::item::{QueuedItem, ValidationItem};
use crate::models::result::ValidationResult;
use crate::models::session::{SessionCounters, SessionStatus, SuspendReason};
use crate::normalize::normalize;
use crate::pacing::{DelayPolicy, RateWindow, RestBreak};
use crate::transport::Transport;
use crate::{AppError, Result};

/// Retry budget applied to each item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts for transient failures.
    pub max_retries: u32,
    /// Linear backoff step between attempts.
    pub backoff: Duration,
    /// Upper bound on a single throttle pause.
    pub max_throttle_wait: Duration,
}

/// Settings shared by every session in a pool.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Country prefix for normalization.
    pub country_prefix: Arc<str>,
    /// Skip profile lookups when `true`.
    pub safe_mode: bool,
    /// Per-item retry budget.
    pub retry: RetryPolicy,
    /// Per-session window ceiling.
    pub rate_limit: RateLimitConfig,
    /// Inter-check pacing.
    pub delay: DelayConfig,
    /// Shared failure classifier.
    pub classifier: Arc<FailureClassifier>,
    /// Seed for reproducible jitter; random when `None`.
    pub seed: Option<u64>,
}

impl SessionSettings {
    /// Derive session settings from the global configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a ban pattern fails to compile.
    pub fn from_config(config: &GlobalConfig) -> Result<Self> {
        Ok(Self {
            country_prefix: Arc::from(config.country_prefix.as_str()),
            safe_mode: config.safe_mode,
            retry: RetryPolicy {
                max_retries: config.retry.max_retries,
                backoff: config.retry.backoff(),
                max_throttle_wait: config.rate_limit.window(),
            },
            rate_limit: config.rate_limit.clone(),
            delay: config.delay.clone(),
            classifier: Arc::new(FailureClassifier::new(&config.retry.ban_patterns)?),
            seed: None,
        })
    }
}

/// Result of one check plus any session-level consequence.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    /// The terminal result for the item.
    pub result: ValidationResult,
    /// Set when the session must be suspended.
    pub fatal: Option<SuspendReason>,
}

impl CheckOutcome {
    fn done(result: ValidationResult) -> Self {
        Self {
            result,
            fatal: None,
        }
    }
}

/// Runs single checks for one session; cloned into every in-flight task.
#[derive(Clone)]
pub struct Checker {
    session_id: Arc<str>,
    transport: Arc<dyn Transport>,
    classifier: Arc<FailureClassifier>,
    retry: RetryPolicy,
    country_prefix: Arc<str>,
    safe_mode: bool,
}

impl Checker {
    /// Check one item end to end. Never fails: every error becomes part of
    /// the returned result.
    pub async fn check(&self, queued: QueuedItem) -> CheckOutcome {
        let QueuedItem { index, item } = queued;
        let session_id = self.session_id.as_ref();

        let normalized = match normalize(&item.number, &self.country_prefix) {
            Ok(normalized) => normalized,
            Err(err) => {
                debug!(session_id, index, number = %item.number, "unusable number");
                return CheckOutcome::done(ValidationResult::error(
                    index,
                    item,
                    String::new(),
                    format!("invalid number: {err}"),
                    session_id,
                    0,
                ));
            }
        };

        let mut attempts: u32 = 0;
        let mut retries: u32 = 0;
        let mut throttles: u32 = 0;

        loop {
            attempts += 1;
            let err = match self.transport.check_registration(&normalized).await {
                Ok(registered) => {
                    let mut result = ValidationResult::success(
                        index,
                        item,
                        normalized,
                        registered,
                        session_id,
                        attempts,
                    );
                    let mut fatal = None;
                    if registered && !self.safe_mode {
                        match self.fetch_profile(&result.normalized_id).await {
                            Ok(profile) => result.profile = profile,
                            Err(reason) => fatal = Some(reason),
                        }
                    }
                    return CheckOutcome { result, fatal };
                }
                Err(err) => err,
            };

            match self.classifier.classify(&err) {
                FailureClass::Banned => {
                    let reason = SuspendReason::Banned(err.to_string());
                    return self.fatal(index, item, normalized, reason, attempts);
                }
                FailureClass::AuthLost => {
                    let reason = SuspendReason::AuthLost(err.to_string());
                    return self.fatal(index, item, normalized, reason, attempts);
                }
                FailureClass::Terminal => {
                    return CheckOutcome::done(ValidationResult::error(
                        index,
                        item,
                        normalized,
                        err.to_string(),
                        session_id,
                        attempts,
                    ));
                }
                FailureClass::Throttled(retry_after) => {
                    if throttles >= self.retry.max_retries {
                        return CheckOutcome::done(ValidationResult::error(
                            index,
                            item,
                            normalized,
                            format!("{err}; throttle budget exhausted"),
                            session_id,
                            attempts,
                        ));
                    }
                    throttles += 1;
                    let wait = retry_after
                        .unwrap_or(self.retry.backoff * throttles)
                        .min(self.retry.max_throttle_wait);
                    info!(
                        session_id,
                        index,
                        wait_ms = millis(wait),
                        "service throttled the session; pausing"
                    );
                    tokio::time::sleep(wait).await;
                }
                FailureClass::Retryable => {
                    if retries >= self.retry.max_retries {
                        return CheckOutcome::done(ValidationResult::error(
                            index,
                            item,
                            normalized,
                            format!("{err} (gave up after {attempts} attempts)"),
                            session_id,
                            attempts,
                        ));
                    }
                    retries += 1;
                    let backoff = self.retry.backoff * retries;
                    warn!(
                        session_id,
                        index,
                        attempt = attempts,
                        %err,
                        backoff_ms = millis(backoff),
                        "transient transport failure; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    fn fatal(
        &self,
        index: usize,
        item: ValidationItem,
        normalized: String,
        reason: SuspendReason,
        attempts: u32,
    ) -> CheckOutcome {
        let result = ValidationResult::error(
            index,
            item,
            normalized,
            reason.to_string(),
            &self.session_id,
            attempts,
        );
        CheckOutcome {
            result,
            fatal: Some(reason),
        }
    }

    /// Profile lookup failures are not item errors unless they signal a
    /// lost or banned session.
    async fn fetch_profile(
        &self,
        normalized: &str,
    ) -> std::result::Result<Option<serde_json::Value>, SuspendReason> {
        match self.transport.profile_metadata(normalized).await {
            Ok(profile) => Ok(profile),
            Err(err) => match self.classifier.classify(&err) {
                FailureClass::Banned => Err(SuspendReason::Banned(err.to_string())),
                FailureClass::AuthLost => Err(SuspendReason::AuthLost(err.to_string())),
                _ => {
                    debug!(session_id = %self.session_id, %err, "profile lookup failed");
                    Ok(None)
                }
            },
        }
    }
}

/// One authenticated execution context with its own counters and pacing.
pub struct Session {
    id: String,
    status: SessionStatus,
    transport: Arc<dyn Transport>,
    checker: Checker,
    counters: SessionCounters,
    rate_window: RateWindow,
    delay: DelayPolicy,
    rng: Rng,
    suspend_reason: Option<SuspendReason>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("counters", &self.counters)
            .field("suspend_reason", &self.suspend_reason)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Construct a session around `transport`; it starts in `Connecting`.
    #[must_use]
    pub fn new(id: String, transport: Arc<dyn Transport>, settings: &SessionSettings) -> Self {
        let checker = Checker {
            session_id: Arc::from(id.as_str()),
            transport: Arc::clone(&transport),
            classifier: Arc::clone(&settings.classifier),
            retry: settings.retry,
            country_prefix: Arc::clone(&settings.country_prefix),
            safe_mode: settings.safe_mode,
        };
        let rng = settings.seed.map_or_else(Rng::new, Rng::with_seed);
        Self {
            id,
            status: SessionStatus::Connecting,
            transport,
            checker,
            counters: SessionCounters::default(),
            rate_window: RateWindow::new(
                settings.rate_limit.max_per_window,
                settings.rate_limit.window(),
            ),
            delay: DelayPolicy::new(settings.delay.clone()),
            rng,
            suspend_reason: None,
        }
    }

    /// Wait for the transport to become ready within `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Session` if the transport reports a failure or
    /// does not become ready in time.
    pub async fn connect(&mut self, timeout: Duration) -> Result<()> {
        let ready = tokio::time::timeout(timeout, self.transport.await_ready()).await;
        match ready {
            Ok(Ok(())) => {
                self.transition(SessionStatus::Idle);
                Ok(())
            }
            Ok(Err(err)) => Err(AppError::Session(format!(
                "{} failed to become ready: {err}",
                self.id
            ))),
            Err(_) => Err(AppError::Session(format!(
                "{} not ready within {}s",
                self.id,
                timeout.as_secs()
            ))),
        }
    }

    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Counters accumulated so far.
    #[must_use]
    pub fn counters(&self) -> &SessionCounters {
        &self.counters
    }

    /// Why the session was suspended, if it was.
    #[must_use]
    pub fn suspend_reason(&self) -> Option<&SuspendReason> {
        self.suspend_reason.as_ref()
    }

    /// Move to `next` if the lifecycle allows it.
    ///
    /// Returns `false` (and leaves the status untouched) otherwise.
    pub fn transition(&mut self, next: SessionStatus) -> bool {
        if self.status == next {
            return true;
        }
        if !self.status.can_transition_to(next) {
            warn!(session_id = %self.id, from = ?self.status, to = ?next, "rejected session transition");
            return false;
        }
        debug!(session_id = %self.id, from = ?self.status, to = ?next, "session transition");
        self.status = next;
        true
    }

    /// A checker bound to this session for spawning in-flight checks.
    #[must_use]
    pub fn checker(&self) -> Checker {
        self.checker.clone()
    }

    /// Check one item on this session without spawning.
    pub async fn check_one(&self, item: QueuedItem) -> CheckOutcome {
        self.checker.check(item).await
    }

    /// Fold a finished result into the session counters.
    pub fn record_outcome(&mut self, result: &ValidationResult) {
        self.counters.checked += 1;
        if result.is_error() {
            self.counters.errors += 1;
        } else if result.is_verified() {
            self.counters.verified += 1;
        }
        self.counters.last_check_at = Some(Utc::now());
    }

    /// Whether starting a check now would exceed the window ceiling.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.rate_window.is_limited(Instant::now())
    }

    /// The session's rate window.
    pub fn rate_window_mut(&mut self) -> &mut RateWindow {
        &mut self.rate_window
    }

    /// Jittered pause before the next check.
    pub fn next_pause(&mut self) -> Duration {
        self.delay.inter_check_pause(&mut self.rng)
    }

    /// Rest break due after the latest recorded check, if any.
    pub fn rest_due(&mut self) -> Option<RestBreak> {
        self.delay.rest_after(self.counters.checked, &mut self.rng)
    }

    /// Take the session out of rotation for the rest of the run.
    pub fn suspend(&mut self, reason: SuspendReason) {
        if reason.is_ban() {
            error!(
                session_id = %self.id,
                %reason,
                "BAN SIGNAL: session suspended; the account appears blocked by the service"
            );
        } else {
            warn!(session_id = %self.id, %reason, "session suspended");
        }
        self.transition(SessionStatus::Suspended);
        self.suspend_reason = Some(reason);
    }

    /// Release the transport. Idempotent.
    pub async fn shutdown(&mut self) {
        if self.status == SessionStatus::Closed {
            return;
        }
        self.transport.close().await;
        self.transition(SessionStatus::Closed);
        info!(
            session_id = %self.id,
            checked = self.counters.checked,
            verified = self.counters.verified,
            errors = self.counters.errors,
            "session closed"
        );
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
