//! Fixed set of sessions created at startup.

use std::collections::BTreeMap;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::session::{Session, SessionSettings};
use crate::config::SessionConfig;
use crate::models::report::{StartupFailure, Suspension};
use crate::models::session::SessionStatus;
use crate::transport::TransportFactory;
use crate::{AppError, Result};

/// Owned collection of sessions indexed by id.
///
/// The scheduler borrows the ready sessions for a run via
/// [`take_ready`](Self::take_ready) and hands them back with
/// [`restore`](Self::restore).
#[derive(Debug, Default)]
pub struct SessionPool {
    sessions: BTreeMap<String, Session>,
    failures: Vec<StartupFailure>,
}

impl SessionPool {
    /// Create `config.count` sessions one after another.
    ///
    /// Consecutive starts are separated by `config.stagger()`. Each session
    /// gets `config.ready_timeout()` to become ready; a session that fails
    /// or times out is reported in [`failures`](Self::failures) and closed.
    /// Cancelling `cancel` stops startup early and returns what is ready.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Session` if no session became ready and startup
    /// was not cancelled.
    pub async fn initialize(
        config: &SessionConfig,
        factory: &dyn TransportFactory,
        settings: &SessionSettings,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let mut pool = Self::default();

        for n in 0..config.count {
            if n > 0 && !config.stagger().is_zero() {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(config.stagger()) => {}
                }
            }
            if cancel.is_cancelled() {
                break;
            }

            let id = format!("session-{}", n + 1);
            let transport = match factory.create(&id) {
                Ok(transport) => transport,
                Err(err) => {
                    warn!(session_id = %id, %err, "failed to create session transport");
                    pool.failures.push(StartupFailure {
                        session_id: id,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            let mut session_settings = settings.clone();
            session_settings.seed = settings.seed.map(|seed| seed.wrapping_add(n as u64));
            let mut session = Session::new(id.clone(), transport, &session_settings);

            let connected = tokio::select! {
                () = cancel.cancelled() => None,
                connected = session.connect(config.ready_timeout()) => Some(connected),
            };
            match connected {
                None => {
                    session.shutdown().await;
                    break;
                }
                Some(Ok(())) => {
                    info!(session_id = %id, "session ready");
                    pool.sessions.insert(id, session);
                }
                Some(Err(err)) => {
                    warn!(session_id = %id, %err, "session failed to start");
                    session.shutdown().await;
                    pool.failures.push(StartupFailure {
                        session_id: id,
                        reason: err.to_string(),
                    });
                }
            }
        }

        if pool.sessions.is_empty() && !cancel.is_cancelled() {
            return Err(AppError::Session(format!(
                "none of {} sessions became ready",
                config.count
            )));
        }
        info!(
            ready = pool.sessions.len(),
            failed = pool.failures.len(),
            "session pool initialized"
        );
        Ok(pool)
    }

    /// Number of sessions held, whatever their status.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the pool holds no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Look up a session by id.
    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    /// Sessions that failed to start.
    #[must_use]
    pub fn failures(&self) -> &[StartupFailure] {
        &self.failures
    }

    /// Remove and return every session that can still take work.
    pub fn take_ready(&mut self) -> Vec<Session> {
        let ready: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.status().is_active())
            .map(|(id, _)| id.clone())
            .collect();
        ready
            .iter()
            .filter_map(|id| self.sessions.remove(id))
            .collect()
    }

    /// Put sessions back into the pool.
    pub fn restore(&mut self, sessions: impl IntoIterator<Item = Session>) {
        for session in sessions {
            self.sessions.insert(session.id().to_owned(), session);
        }
    }

    /// Current status of every session, ordered by id.
    #[must_use]
    pub fn statuses(&self) -> BTreeMap<String, SessionStatus> {
        self.sessions
            .iter()
            .map(|(id, session)| (id.clone(), session.status()))
            .collect()
    }

    /// Sessions suspended so far, ordered by id.
    #[must_use]
    pub fn suspensions(&self) -> Vec<Suspension> {
        self.sessions
            .values()
            .filter_map(|session| {
                session.suspend_reason().map(|reason| Suspension {
                    session_id: session.id().to_owned(),
                    reason: reason.clone(),
                })
            })
            .collect()
    }

    /// Close every session's transport.
    pub async fn shutdown(&mut self) {
        for session in self.sessions.values_mut() {
            session.shutdown().await;
        }
    }
}
