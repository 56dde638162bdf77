//! Multiple outstanding checks per session.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::test_helpers::{fast_config, numbers, run_fresh, start_pool, MockTransport, RUN_KEY};

#[tokio::test(start_paused = true)]
async fn k_slots_run_in_parallel_and_never_more() {
    let mut config = fast_config();
    config.sessions.concurrency = 3;
    let transport = Arc::new(MockTransport::silent().with_latency(Duration::from_millis(100)));
    let mut pool = start_pool(&config, &[Arc::clone(&transport)]).await;
    let started = Instant::now();

    let (report, _, _) = run_fresh(&config, &mut pool, numbers(9)).await;

    assert_eq!(report.checked, 9);
    assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 3);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(900), "slots did not overlap: {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn single_slot_is_sequential() {
    let config = fast_config();
    let transport = Arc::new(MockTransport::silent().with_latency(Duration::from_millis(50)));
    let mut pool = start_pool(&config, &[Arc::clone(&transport)]).await;

    run_fresh(&config, &mut pool, numbers(6)).await;

    assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn out_of_order_completion_keeps_watermark_contiguous() {
    let mut config = fast_config();
    config.sessions.concurrency = 4;
    config.checkpoint.every = 1;
    let transport = Arc::new(MockTransport::silent().with_latency(Duration::from_millis(20)));
    let mut pool = start_pool(&config, &[Arc::clone(&transport)]).await;

    let (_, sink, store) = run_fresh(&config, &mut pool, numbers(17)).await;

    assert_eq!(sink.results().len(), 17);
    let checkpoint = store.get(RUN_KEY).unwrap();
    assert_eq!(checkpoint.last_index, 17);
    assert_eq!(checkpoint.total_checked, 17);
}
