//! Session orchestration modules.
//!
//! Covers failure classification, session lifecycle, pool startup and
//! teardown, the shared work queue, result recording with checkpoints,
//! and the multi-session scheduler that drives it all.

pub mod classify;
pub mod pool;
pub mod queue;
pub mod recorder;
pub mod scheduler;
pub mod session;
