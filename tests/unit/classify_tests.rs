//! Unit tests for transport failure classification.

use std::time::Duration;

use regcheck::config::RetryConfig;
use regcheck::orchestrator::classify::{FailureClass, FailureClassifier};
use regcheck::transport::TransportError;

fn classifier() -> FailureClassifier {
    FailureClassifier::new(&RetryConfig::default().ban_patterns).expect("default patterns compile")
}

#[test]
fn transient_errors_are_retryable() {
    let c = classifier();
    assert_eq!(
        c.classify(&TransportError::Network("connection reset".into())),
        FailureClass::Retryable
    );
    assert_eq!(c.classify(&TransportError::Timeout), FailureClass::Retryable);
}

#[test]
fn auth_errors_lose_the_session() {
    let c = classifier();
    let class = c.classify(&TransportError::Auth("logged out".into()));
    assert_eq!(class, FailureClass::AuthLost);
}

#[test]
fn throttling_carries_retry_after() {
    let c = classifier();
    let err = TransportError::RateLimited {
        retry_after: Some(Duration::from_secs(30)),
        detail: "slow down".into(),
    };
    assert_eq!(
        c.classify(&err),
        FailureClass::Throttled(Some(Duration::from_secs(30)))
    );
}

#[test]
fn rejected_items_are_terminal() {
    let c = classifier();
    assert_eq!(
        c.classify(&TransportError::Rejected("malformed number".into())),
        FailureClass::Terminal
    );
}

#[test]
fn ban_signature_wins_over_variant() {
    let c = classifier();
    assert_eq!(
        c.classify(&TransportError::Network("your account is BANNED".into())),
        FailureClass::Banned
    );
    assert_eq!(
        c.classify(&TransportError::Auth("Account suspended for abuse".into())),
        FailureClass::Banned
    );
    assert_eq!(
        c.classify(&TransportError::Rejected("number blocked".into())),
        FailureClass::Banned
    );
    assert_eq!(
        c.classify(&TransportError::RateLimited {
            retry_after: None,
            detail: "account banned".into(),
        }),
        FailureClass::Banned
    );
}

#[test]
fn ordinary_messages_are_not_ban_signals() {
    let c = classifier();
    assert!(!c.is_ban_signal("connection reset by peer"));
    assert!(!c.is_ban_signal("bandwidth exceeded"));
    assert!(c.is_ban_signal("Spam detected"));
}

#[test]
fn custom_patterns_are_used() {
    let c = FailureClassifier::new(&["kicked out".to_owned()]).unwrap();
    assert!(c.is_ban_signal("You were KICKED OUT"));
    assert!(!c.is_ban_signal("banned"));
}

#[test]
fn invalid_pattern_is_rejected() {
    assert!(FailureClassifier::new(&["[".to_owned()]).is_err());
}
