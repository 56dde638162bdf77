//! Canonical form of a raw phone number.
//!
//! The normalized identifier is the dedup key downstream and the value sent
//! to the transport, so the rule must stay stable across releases.

use std::fmt::{Display, Formatter};

/// Reasons a raw number cannot be normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeError {
    /// The input held no digits at all.
    Empty,
}

impl Display for NormalizeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "number contains no digits"),
        }
    }
}

impl std::error::Error for NormalizeError {}

/// Normalize `raw` into `<prefix><subscriber digits>`.
///
/// Non-digits are stripped and a leading `00` international prefix is
/// removed. Digits already starting with `prefix` are kept as-is; otherwise
/// a single leading `0` trunk digit is dropped and `prefix` is prepended.
///
/// ```
/// use regcheck::normalize::normalize;
///
/// assert_eq!(normalize("079-123-4567", "962").unwrap(), "962791234567");
/// assert_eq!(normalize("+962 79 123 4567", "962").unwrap(), "962791234567");
/// ```
///
/// # Errors
///
/// Returns [`NormalizeError::Empty`] if `raw` contains no digits.
pub fn normalize(raw: &str, prefix: &str) -> Result<String, NormalizeError> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    let digits = digits.strip_prefix("00").unwrap_or(&digits);
    if digits.is_empty() {
        return Err(NormalizeError::Empty);
    }
    if digits.starts_with(prefix) {
        return Ok(digits.to_owned());
    }

    let local = digits.strip_prefix('0').unwrap_or(digits);
    if local.is_empty() {
        return Err(NormalizeError::Empty);
    }
    Ok(format!("{prefix}{local}"))
}
