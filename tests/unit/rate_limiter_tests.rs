//! Unit tests for the per-session rolling rate window.

use std::time::Duration;

use tokio::time::Instant;

use regcheck::pacing::RateWindow;

#[test]
fn admits_up_to_ceiling_then_waits() {
    let t0 = Instant::now();
    let mut window = RateWindow::new(3, Duration::from_secs(60));

    for i in 0..3 {
        let now = t0 + Duration::from_secs(i);
        assert!(window.reserve(now).is_ok(), "start {i} should be admitted");
        window.record(now);
    }

    let now = t0 + Duration::from_secs(10);
    let wait = window.reserve(now).expect_err("window is full");
    assert_eq!(wait, Duration::from_secs(50));
    assert!(window.is_limited(now));
}

#[test]
fn slot_frees_when_oldest_start_ages_out() {
    let t0 = Instant::now();
    let mut window = RateWindow::new(2, Duration::from_secs(10));
    window.record(t0);
    window.record(t0 + Duration::from_secs(4));

    assert!(window.reserve(t0 + Duration::from_secs(9)).is_err());
    assert!(window.reserve(t0 + Duration::from_secs(10)).is_ok());
    assert_eq!(window.count_in_window(t0 + Duration::from_secs(10)), 1);
}

#[test]
fn wait_never_exceeds_window() {
    let t0 = Instant::now();
    let mut window = RateWindow::new(1, Duration::from_secs(30));
    window.record(t0);

    let wait = window.reserve(t0).expect_err("full");
    assert!(wait <= window.window());
}

#[test]
fn never_more_than_ceiling_in_any_rolling_window() {
    let t0 = Instant::now();
    let span = Duration::from_millis(1_000);
    let mut window = RateWindow::new(5, span);
    let mut starts = Vec::new();

    let mut now = t0;
    while starts.len() < 40 {
        match window.reserve(now) {
            Ok(()) => {
                window.record(now);
                starts.push(now);
                now += Duration::from_millis(37);
            }
            Err(wait) => now += wait,
        }
    }

    for (i, &start) in starts.iter().enumerate() {
        let inside = starts[i..]
            .iter()
            .take_while(|&&later| later.saturating_duration_since(start) < span)
            .count();
        assert!(inside <= 5, "{inside} starts inside one window beginning at #{i}");
    }
}

#[test]
fn reports_configuration() {
    let window = RateWindow::new(300, Duration::from_secs(3600));
    assert_eq!(window.max_per_window(), 300);
    assert_eq!(window.window(), Duration::from_secs(3600));
    assert!(window.window_start().is_none());
}
