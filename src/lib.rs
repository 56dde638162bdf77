#![forbid(unsafe_code)]

//! Multi-session registration checking for large phone number lists.
//!
//! Numbers are loaded into a shared [`orchestrator::queue::WorkQueue`],
//! dispatched across a pool of authenticated sessions by the
//! [`orchestrator::scheduler::Scheduler`], paced per session by
//! [`pacing`], and recorded durably through [`persistence`] so an
//! interrupted run resumes where it stopped.

pub mod config;
pub mod errors;
pub mod input;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod pacing;
pub mod persistence;
pub mod transport;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
