//! Multi-session scheduler.
//!
//! One driver task runs per ready session. Each driver pulls items from
//! the shared [`WorkQueue`], keeps up to `concurrency` checks in flight,
//! gates every start on the session's rate window, paces itself with the
//! delay policy and hands finished results to the shared [`Recorder`].
//! A fatal outcome suspends only the driver's own session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::pool::SessionPool;
use super::queue::WorkQueue;
use super::recorder::Recorder;
use super::session::{CheckOutcome, Session};
use crate::models::report::RunReport;
use crate::models::session::{SessionStatus, SuspendReason};
use crate::pacing::RestKind;
use crate::Result;

/// Events surfaced to the operator while a run is in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// A session left the rotation.
    SessionSuspended {
        /// Suspended session.
        session_id: String,
        /// Classified reason.
        reason: SuspendReason,
    },
    /// A session hit its window ceiling and is waiting.
    RateLimitPause {
        /// Paused session.
        session_id: String,
        /// Time until the window frees a slot.
        wait: Duration,
    },
    /// A session is taking a rest break.
    RestBreak {
        /// Resting session.
        session_id: String,
        /// Short or extended break.
        kind: RestKind,
        /// Break length.
        duration: Duration,
    },
    /// Results were flushed and the checkpoint saved.
    CheckpointSaved {
        /// Watermark after the save.
        last_index: usize,
        /// Cumulative results recorded for the run.
        total_checked: u64,
    },
    /// A driver stopped.
    DriverFinished {
        /// Session the driver ran.
        session_id: String,
        /// Results the session produced over its lifetime.
        checked: u64,
    },
}

/// Drives every ready session in a pool until the queue is drained.
#[derive(Debug, Clone)]
pub struct Scheduler {
    concurrency: usize,
    events: Option<mpsc::Sender<SchedulerEvent>>,
}

/// Shared state cloned into each driver.
#[derive(Clone)]
struct DriverContext {
    queue: Arc<WorkQueue>,
    recorder: Arc<Mutex<Recorder>>,
    cancel: CancellationToken,
    events: Option<mpsc::Sender<SchedulerEvent>>,
    concurrency: usize,
}

impl DriverContext {
    fn emit(&self, event: SchedulerEvent) {
        emit(self.events.as_ref(), event);
    }
}

fn emit(events: Option<&mpsc::Sender<SchedulerEvent>>, event: SchedulerEvent) {
    if let Some(tx) = events {
        if let Err(err) = tx.try_send(event) {
            debug!(%err, "scheduler event dropped");
        }
    }
}

impl Scheduler {
    /// Create a scheduler allowing `concurrency` in-flight checks per session.
    #[must_use]
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            events: None,
        }
    }

    /// Publish [`SchedulerEvent`]s on `tx`. Events are dropped, never
    /// awaited, when the channel is full.
    #[must_use]
    pub fn with_events(mut self, tx: mpsc::Sender<SchedulerEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Run every ready session in `pool` against `queue`.
    ///
    /// Returns once the queue is drained and nothing is in flight, once
    /// every session is suspended, or promptly after `cancel` fires. The
    /// recorder is flushed and the checkpoint saved before returning, and
    /// the sessions go back into `pool` for the caller to shut down.
    ///
    /// # Errors
    ///
    /// Returns the sink or store error if the final flush fails.
    pub async fn run(
        &self,
        pool: &mut SessionPool,
        queue: Arc<WorkQueue>,
        recorder: Arc<Mutex<Recorder>>,
        cancel: CancellationToken,
    ) -> Result<RunReport> {
        let started = Instant::now();
        let ctx = DriverContext {
            queue: Arc::clone(&queue),
            recorder: Arc::clone(&recorder),
            cancel: cancel.clone(),
            events: self.events.clone(),
            concurrency: self.concurrency,
        };

        let sessions = pool.take_ready();
        if sessions.is_empty() {
            warn!("no ready sessions; nothing will be checked");
        }
        info!(
            sessions = sessions.len(),
            queued = queue.queued(),
            concurrency = self.concurrency,
            "scheduler started"
        );

        let mut drivers = JoinSet::new();
        for session in sessions {
            let span = info_span!("driver", session_id = %session.id());
            drivers.spawn(drive(session, ctx.clone()).instrument(span));
        }

        let mut finished = Vec::new();
        while let Some(joined) = drivers.join_next().await {
            match joined {
                Ok(session) => finished.push(session),
                Err(err) => error!(%err, "session driver task failed"),
            }
        }
        pool.restore(finished);

        let mut recorder = recorder.lock().await;
        let checkpoint = recorder.flush().await?;
        emit(
            self.events.as_ref(),
            SchedulerEvent::CheckpointSaved {
                last_index: checkpoint.last_index,
                total_checked: checkpoint.total_checked,
            },
        );

        let results = recorder.results();
        let unprocessed = queue.queued().saturating_sub(results.len());
        let mut report = RunReport::from_results(
            results,
            &pool.statuses(),
            queue.queued(),
            unprocessed,
            started.elapsed(),
            cancel.is_cancelled(),
        );
        report.suspensions = pool.suspensions();
        report.startup_failures = pool.failures().to_vec();

        info!(
            checked = report.checked,
            verified = report.verified,
            errors = report.errors,
            unprocessed = report.unprocessed,
            cancelled = report.cancelled,
            "scheduler finished"
        );
        Ok(report)
    }
}

/// Drive one session until the queue drains, the session is suspended, or
/// the run is cancelled. Returns the session for teardown.
async fn drive(mut session: Session, ctx: DriverContext) -> Session {
    let mut in_flight: JoinSet<CheckOutcome> = JoinSet::new();
    let mut drained = false;

    'run: loop {
        while !drained && session.status().is_active() && in_flight.len() < ctx.concurrency {
            if ctx.cancel.is_cancelled() {
                break 'run;
            }
            if ctx.queue.is_empty() {
                drained = true;
                settle(&mut session, &in_flight);
                break;
            }
            if !wait_for_window(&mut session, &ctx).await {
                break 'run;
            }
            let Some(item) = ctx.queue.take() else {
                drained = true;
                settle(&mut session, &in_flight);
                break;
            };
            session.rate_window_mut().record(Instant::now());
            session.transition(SessionStatus::Dispatching);
            debug!(index = item.index, in_flight = in_flight.len() + 1, "dispatching check");
            let checker = session.checker();
            in_flight.spawn(async move { checker.check(item).await });
            session.transition(SessionStatus::Awaiting);
        }

        if in_flight.is_empty() {
            break;
        }

        let joined = tokio::select! {
            () = ctx.cancel.cancelled() => break,
            joined = in_flight.join_next() => joined,
        };
        let outcome = match joined {
            Some(Ok(outcome)) => outcome,
            Some(Err(err)) => {
                error!(%err, "check task failed");
                continue;
            }
            None => break,
        };

        record(&mut session, &ctx, outcome).await;
        if !session.status().is_active() {
            continue;
        }
        settle(&mut session, &in_flight);

        if (drained || ctx.queue.is_empty()) && in_flight.is_empty() {
            break;
        }
        if !pause(&mut session, &ctx).await {
            break;
        }
    }

    while let Some(joined) = in_flight.try_join_next() {
        match joined {
            Ok(outcome) => record(&mut session, &ctx, outcome).await,
            Err(err) => error!(%err, "check task failed"),
        }
    }
    if !in_flight.is_empty() {
        debug!(aborted = in_flight.len(), "abandoning in-flight checks");
        in_flight.shutdown().await;
    }
    if session.status().is_active() {
        session.transition(SessionStatus::Idle);
    }
    info!(checked = session.counters().checked, "driver finished");
    ctx.emit(SchedulerEvent::DriverFinished {
        session_id: session.id().to_owned(),
        checked: session.counters().checked,
    });
    session
}

/// Hand a finished check to the recorder and suspend the session on a
/// fatal outcome.
async fn record(session: &mut Session, ctx: &DriverContext, outcome: CheckOutcome) {
    if session.status().is_active() {
        session.transition(SessionStatus::Recording);
    }
    session.record_outcome(&outcome.result);
    let recorded = ctx.recorder.lock().await.record(outcome.result).await;
    match recorded {
        Ok(Some(checkpoint)) => ctx.emit(SchedulerEvent::CheckpointSaved {
            last_index: checkpoint.last_index,
            total_checked: checkpoint.total_checked,
        }),
        Ok(None) => {}
        Err(err) => error!(%err, "failed to persist results; retrying at next flush"),
    }

    if let Some(reason) = outcome.fatal {
        if session.status().is_active() {
            session.suspend(reason.clone());
            ctx.emit(SchedulerEvent::SessionSuspended {
                session_id: session.id().to_owned(),
                reason,
            });
        }
    }
}

/// Move to `Awaiting` while checks are outstanding, `Idle` otherwise.
fn settle(session: &mut Session, in_flight: &JoinSet<CheckOutcome>) {
    if in_flight.is_empty() {
        session.transition(SessionStatus::Idle);
    } else {
        session.transition(SessionStatus::Awaiting);
    }
}

/// Block until the rate window admits another start or the queue runs dry.
///
/// Returns `false` if the run was cancelled while waiting.
async fn wait_for_window(session: &mut Session, ctx: &DriverContext) -> bool {
    loop {
        let Err(wait) = session.rate_window_mut().reserve(Instant::now()) else {
            return true;
        };
        session.transition(SessionStatus::RateLimited);
        info!(
            wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
            "rate window full; pausing"
        );
        ctx.emit(SchedulerEvent::RateLimitPause {
            session_id: session.id().to_owned(),
            wait,
        });
        tokio::select! {
            () = ctx.cancel.cancelled() => return false,
            () = ctx.queue.wait_empty() => return true,
            () = tokio::time::sleep(wait) => {}
        }
    }
}

/// Inter-check pause plus any rest break now due.
///
/// Returns `false` if the run was cancelled while pausing.
async fn pause(session: &mut Session, ctx: &DriverContext) -> bool {
    let mut wait = session.next_pause();
    if let Some(rest) = session.rest_due() {
        info!(
            kind = ?rest.kind,
            duration_ms = u64::try_from(rest.duration.as_millis()).unwrap_or(u64::MAX),
            checked = session.counters().checked,
            "taking rest break"
        );
        ctx.emit(SchedulerEvent::RestBreak {
            session_id: session.id().to_owned(),
            kind: rest.kind,
            duration: rest.duration,
        });
        wait += rest.duration;
    }
    if wait.is_zero() {
        return !ctx.cancel.is_cancelled();
    }
    tokio::select! {
        () = ctx.cancel.cancelled() => false,
        () = tokio::time::sleep(wait) => true,
    }
}
