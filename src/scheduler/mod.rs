//! Coordinator engine for queue execution.
//!
//! This module provides the single-owner task that drives every queue:
//! commands and lifecycle events are serialized onto its channels and all
//! queue state is private to it.

mod engine;
mod handle;
mod types;

pub use engine::Scheduler;
pub use handle::SchedulerHandle;
pub use types::{CoordinatorState, SchedulerError};
