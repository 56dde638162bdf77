//! Unit tests for phone number normalization.

use regcheck::normalize::{normalize, NormalizeError};

#[test]
fn trunk_zero_and_bare_local_number_agree() {
    let with_trunk = normalize("0791234567", "962").expect("normalizes");
    let without_trunk = normalize("791234567", "962").expect("normalizes");
    assert_eq!(with_trunk, "962791234567");
    assert_eq!(without_trunk, "962791234567");
}

#[test]
fn already_prefixed_number_is_kept() {
    assert_eq!(normalize("962791234567", "962").unwrap(), "962791234567");
}

#[test]
fn formatting_characters_are_stripped() {
    assert_eq!(normalize("+962 (79) 123-4567", "962").unwrap(), "962791234567");
    assert_eq!(normalize(" 079.123.4567 ", "962").unwrap(), "962791234567");
}

#[test]
fn international_double_zero_prefix_is_removed() {
    assert_eq!(normalize("00962791234567", "962").unwrap(), "962791234567");
}

#[test]
fn normalization_is_idempotent() {
    for raw in ["0791234567", "791234567", "+962791234567", "00 962 79 123 4567"] {
        let once = normalize(raw, "962").unwrap();
        let twice = normalize(&once, "962").unwrap();
        assert_eq!(once, twice, "not idempotent for {raw}");
    }
}

#[test]
fn other_country_prefix_is_respected() {
    assert_eq!(normalize("0612345678", "31").unwrap(), "31612345678");
    assert_eq!(normalize("31612345678", "31").unwrap(), "31612345678");
}

#[test]
fn input_without_digits_is_rejected() {
    assert_eq!(normalize("", "962"), Err(NormalizeError::Empty));
    assert_eq!(normalize("n/a", "962"), Err(NormalizeError::Empty));
    assert_eq!(normalize("0", "962"), Err(NormalizeError::Empty));
}

#[test]
fn error_message_is_descriptive() {
    assert_eq!(NormalizeError::Empty.to_string(), "number contains no digits");
}
