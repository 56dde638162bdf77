//! Single-session behavior outside the scheduler.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use regcheck::models::item::{QueuedItem, ValidationItem};
use regcheck::models::result::CheckStatus;
use regcheck::models::session::{SessionStatus, SuspendReason};
use regcheck::orchestrator::session::Session;
use regcheck::transport::{Transport, TransportError};

use super::test_helpers::{fast_config, normalized, settings, MockTransport, Reply};

fn queued(index: usize, number: &str) -> QueuedItem {
    QueuedItem {
        index,
        item: ValidationItem::new(number),
    }
}

async fn ready_session(transport: &Arc<MockTransport>) -> Session {
    let mut session = Session::new(
        "session-1".into(),
        Arc::clone(transport) as Arc<dyn Transport>,
        &settings(&fast_config()),
    );
    session.connect(Duration::from_secs(1)).await.unwrap();
    session
}

#[tokio::test(start_paused = true)]
async fn unusable_number_is_an_error_result() {
    let transport = Arc::new(MockTransport::silent());
    let session = ready_session(&transport).await;

    let outcome = session.check_one(queued(3, "n/a")).await;

    assert_eq!(outcome.result.status, CheckStatus::Error);
    assert_eq!(outcome.result.index, 3);
    assert_eq!(outcome.result.attempts, 0);
    assert!(outcome.fatal.is_none());
    assert_eq!(transport.check_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_is_retried_with_backoff() {
    let transport = Arc::new(
        MockTransport::registering(|_| true)
            .failing_on_call(1, TransportError::Network("reset".into())),
    );
    let session = ready_session(&transport).await;
    let started = Instant::now();

    let outcome = session.check_one(queued(0, "0790000000")).await;

    assert_eq!(outcome.result.status, CheckStatus::Success);
    assert!(outcome.result.is_registered);
    assert_eq!(outcome.result.attempts, 2);
    assert_eq!(outcome.result.normalized_id, normalized(0));
    assert!(started.elapsed() >= Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_give_one_error_result() {
    let failure = Reply::Fail(TransportError::Timeout);
    let transport = Arc::new(MockTransport::silent().with_script(
        &normalized(0),
        vec![failure.clone(), failure.clone(), failure],
    ));
    let session = ready_session(&transport).await;

    let outcome = session.check_one(queued(0, "0790000000")).await;

    assert_eq!(outcome.result.status, CheckStatus::Error);
    assert_eq!(outcome.result.attempts, 3);
    assert_eq!(transport.check_count(), 3);
    assert!(outcome.fatal.is_none());
}

#[tokio::test(start_paused = true)]
async fn ban_message_marks_outcome_fatal() {
    let transport = Arc::new(MockTransport::silent().with_script(
        &normalized(0),
        vec![Reply::Fail(TransportError::Rejected(
            "This account is banned".into(),
        ))],
    ));
    let mut session = ready_session(&transport).await;

    let outcome = session.check_one(queued(0, "0790000000")).await;
    assert_eq!(outcome.result.status, CheckStatus::Error);
    let reason = outcome.fatal.expect("ban is fatal");
    assert!(reason.is_ban());

    session.record_outcome(&outcome.result);
    session.suspend(reason);
    assert_eq!(session.status(), SessionStatus::Suspended);
    assert!(matches!(
        session.suspend_reason(),
        Some(SuspendReason::Banned(_))
    ));
    assert!(!session.transition(SessionStatus::Dispatching));
    assert_eq!(session.counters().errors, 1);
}

#[tokio::test(start_paused = true)]
async fn counters_follow_recorded_outcomes() {
    let transport = Arc::new(MockTransport::registering(|id| id == normalized(1)));
    let mut session = ready_session(&transport).await;

    for i in 0..3 {
        let outcome = session
            .check_one(queued(i, &format!("0790{i:06}")))
            .await;
        session.record_outcome(&outcome.result);
    }

    let counters = session.counters();
    assert_eq!(counters.checked, 3);
    assert_eq!(counters.verified, 1);
    assert_eq!(counters.errors, 0);
    assert!(counters.last_check_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn rate_limited_until_window_rolls() {
    let mut config = fast_config();
    config.rate_limit.max_per_window = 2;
    config.rate_limit.window_seconds = 60;
    let transport = Arc::new(MockTransport::silent());
    let mut session = Session::new(
        "session-1".into(),
        Arc::clone(&transport) as Arc<dyn Transport>,
        &settings(&config),
    );
    session.connect(Duration::from_secs(1)).await.unwrap();

    assert!(!session.is_rate_limited());
    session.rate_window_mut().record(Instant::now());
    tokio::time::advance(Duration::from_secs(10)).await;
    session.rate_window_mut().record(Instant::now());
    assert!(session.is_rate_limited());

    tokio::time::advance(Duration::from_secs(50)).await;
    assert!(!session.is_rate_limited());
}

#[tokio::test(start_paused = true)]
async fn shutdown_is_idempotent() {
    let transport = Arc::new(MockTransport::silent());
    let mut session = ready_session(&transport).await;

    session.shutdown().await;
    session.shutdown().await;

    assert_eq!(session.status(), SessionStatus::Closed);
    assert!(transport.is_closed());
}
