//! Fatal session errors: ban signals and lost authentication.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use regcheck::models::result::CheckStatus;
use regcheck::models::session::{SessionStatus, SuspendReason};
use regcheck::orchestrator::scheduler::SchedulerEvent;
use regcheck::transport::TransportError;

use super::test_helpers::{
    fast_config, numbers, run_fresh, run_with, start_pool, MemorySink, MemoryStore, MockTransport,
};

#[tokio::test(start_paused = true)]
async fn ban_on_fifth_item_stops_the_session() {
    let config = fast_config();
    let transport = Arc::new(
        MockTransport::registering(|_| true)
            .failing_on_call(5, TransportError::Auth("this account is banned".into())),
    );
    let mut pool = start_pool(&config, &[Arc::clone(&transport)]).await;

    let (report, sink, _) = run_fresh(&config, &mut pool, numbers(10)).await;

    let results = sink.results();
    assert_eq!(results.len(), 5);
    assert_eq!(results.iter().filter(|r| r.status == CheckStatus::Success).count(), 4);
    let banned = results.iter().find(|r| r.is_error()).expect("error result");
    assert_eq!(banned.index, 4);
    assert_eq!(banned.attempts, 1, "ban signals are never retried");

    assert_eq!(transport.check_count(), 5);
    assert_eq!(report.checked, 5);
    assert_eq!(report.errors, 1);
    assert_eq!(report.unprocessed, 5);
    assert_eq!(report.suspensions.len(), 1);
    assert!(report.suspensions[0].reason.is_ban());
    assert_eq!(
        pool.get("session-1").unwrap().status(),
        SessionStatus::Suspended
    );
}

#[tokio::test(start_paused = true)]
async fn other_sessions_absorb_remaining_work() {
    let config = fast_config();
    let doomed = Arc::new(
        MockTransport::silent()
            .with_latency(Duration::from_millis(10))
            .failing_on_call(2, TransportError::Network("number blocked: spam".into())),
    );
    let healthy = Arc::new(MockTransport::silent().with_latency(Duration::from_millis(10)));
    let mut pool = start_pool(&config, &[Arc::clone(&doomed), Arc::clone(&healthy)]).await;

    let (report, sink, _) = run_fresh(&config, &mut pool, numbers(10)).await;

    assert_eq!(sink.results().len(), 10);
    assert_eq!(report.unprocessed, 0);
    assert_eq!(report.errors, 1);
    assert_eq!(doomed.check_count(), 2);
    assert_eq!(healthy.check_count(), 8);
    assert_eq!(report.suspensions.len(), 1);
    assert_eq!(report.suspensions[0].session_id, "session-1");

    let statuses = pool.statuses();
    assert_eq!(statuses["session-1"], SessionStatus::Suspended);
    assert_eq!(statuses["session-2"], SessionStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn lost_auth_suspends_without_ban_alert() {
    let config = fast_config();
    let transport = Arc::new(
        MockTransport::silent().failing_on_call(1, TransportError::Auth("logged out".into())),
    );
    let mut pool = start_pool(&config, &[Arc::clone(&transport)]).await;

    let (report, _, _) = run_fresh(&config, &mut pool, numbers(3)).await;

    assert_eq!(report.checked, 1);
    assert_eq!(report.unprocessed, 2);
    assert_eq!(
        report.suspensions[0].reason,
        SuspendReason::AuthLost("auth: logged out".into())
    );
}

#[tokio::test(start_paused = true)]
async fn in_flight_checks_are_recorded_after_suspension() {
    let mut config = fast_config();
    config.sessions.concurrency = 3;
    let transport = Arc::new(
        MockTransport::silent()
            .with_latency(Duration::from_millis(10))
            .failing_on_call(2, TransportError::Rejected("account restricted".into())),
    );
    let mut pool = start_pool(&config, &[Arc::clone(&transport)]).await;

    let (report, sink, _) = run_fresh(&config, &mut pool, numbers(20)).await;

    assert_eq!(sink.results().len(), transport.check_count());
    assert_eq!(report.errors, 1);
    assert!(report.unprocessed > 0);
    assert_eq!(report.suspensions.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn suspension_is_surfaced_as_event() {
    let config = fast_config();
    let transport = Arc::new(
        MockTransport::silent().failing_on_call(2, TransportError::Auth("banned".into())),
    );
    let mut pool = start_pool(&config, &[Arc::clone(&transport)]).await;
    let (tx, mut rx) = mpsc::channel(64);

    let sink = Arc::new(MemorySink::default());
    let store = Arc::new(MemoryStore::default());
    run_with(
        &config,
        &mut pool,
        numbers(4),
        &sink,
        &store,
        CancellationToken::new(),
        Some(tx),
    )
    .await;

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(events.iter().any(|e| matches!(
        e,
        SchedulerEvent::SessionSuspended { session_id, reason }
            if session_id == "session-1" && reason.is_ban()
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        SchedulerEvent::DriverFinished { session_id, checked: 2 } if session_id == "session-1"
    )));
    assert!(matches!(
        events.last(),
        Some(SchedulerEvent::CheckpointSaved { total_checked: 2, .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn all_sessions_suspended_leaves_work_unprocessed() {
    let config = fast_config();
    let a = Arc::new(MockTransport::silent().failing_on_call(1, TransportError::Auth("x".into())));
    let b = Arc::new(MockTransport::silent().failing_on_call(1, TransportError::Auth("y".into())));
    let mut pool = start_pool(&config, &[a, b]).await;

    let (report, _, _) = run_fresh(&config, &mut pool, numbers(6)).await;

    assert_eq!(report.checked, 2);
    assert_eq!(report.unprocessed, 4);
    assert_eq!(report.suspensions.len(), 2);
    assert!(!report.cancelled);
}
