//! Domain model module declarations.

pub mod checkpoint;
pub mod item;
pub mod report;
pub mod result;
pub mod session;
