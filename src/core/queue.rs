//! Per-queue execution state.
//!
//! A [`QueueEntry`] is the value stored in the coordinator's queue table:
//! the FIFO of pending configurations plus the state of the queue's current
//! job. All mutation goes through the coordinator; no other writer exists.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::service::ServiceConfig;
use super::types::ServiceId;

/// State of one live queue.
///
/// The `suspended` flag covers two related conditions: a queue whose running
/// job has been paused by the adapter, and a queue with pending work only
/// that may not advance yet. Which of the two applies is decided by whether
/// `service_id` is set.
#[derive(Debug, Default)]
pub struct QueueEntry {
    /// Pending configurations, front = next to run.
    data: VecDeque<ServiceConfig>,
    /// Runtime id of the queue's current job, if one is running.
    pub service_id: Option<ServiceId>,
    /// Dependency-suspended.
    pub suspended: bool,
    /// Initialization budget reported by the latest start event.
    pub timeout_init: Option<Duration>,
    /// A terminate-before has been seen; awaiting the job's disappearance.
    pub terminate: bool,
    /// Raised by any error-class terminate-before; drains the queue on
    /// final confirmation. Never cleared before erase or advance.
    pub terminate_purge: bool,
    /// Timer re-checking the terminating job's disappearance.
    terminate_timer: Option<JoinHandle<()>>,
}

impl QueueEntry {
    /// Create an empty entry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending configurations (excludes the running one).
    pub fn pending(&self) -> usize {
        self.data.len()
    }

    /// Whether no configurations are pending.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append configurations to the back of the FIFO.
    pub fn extend(&mut self, configs: impl IntoIterator<Item = ServiceConfig>) {
        self.data.extend(configs);
    }

    /// Take the next configuration to run.
    pub fn pop_front(&mut self) -> Option<ServiceConfig> {
        self.data.pop_front()
    }

    /// Snapshot of the pending configurations, front first.
    pub fn pending_configs(&self) -> Vec<ServiceConfig> {
        self.data.iter().cloned().collect()
    }

    /// Drop all pending configurations, keeping the running job.
    pub fn clear_pending(&mut self) {
        self.data.clear();
    }

    /// Install the disappearance re-check timer, cancelling any previous one.
    pub fn set_terminate_timer(&mut self, timer: JoinHandle<()>) {
        self.cancel_terminate_timer();
        self.terminate_timer = Some(timer);
    }

    /// Cancel the pending timer, if any. Cancellation is asynchronous: an
    /// already-fired tick may still be in flight and is dropped by the tick
    /// handler's flag checks.
    pub fn cancel_terminate_timer(&mut self) {
        if let Some(timer) = self.terminate_timer.take() {
            timer.abort();
        }
    }

    /// Whether a disappearance re-check is pending.
    pub fn has_terminate_timer(&self) -> bool {
        self.terminate_timer.is_some()
    }

    /// Leave the terminating state: clear the flag and cancel the timer.
    pub fn clear_termination(&mut self) {
        self.terminate = false;
        self.cancel_terminate_timer();
    }
}

impl Drop for QueueEntry {
    fn drop(&mut self) {
        self.cancel_terminate_timer();
    }
}
