//! Per-session pacing: window ceilings and jittered delays.
//!
//! - [`RateWindow`]: hard cap on checks started inside a rolling window
//! - [`DelayPolicy`]: jittered pauses between checks and periodic rest breaks

pub mod delay;
pub mod rate_limiter;

pub use delay::{DelayPolicy, RestBreak, RestKind};
pub use rate_limiter::RateWindow;
