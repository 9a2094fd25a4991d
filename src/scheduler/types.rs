//! Scheduler type definitions.
//!
//! This module contains error types, state enums, and the command and
//! lifecycle-event messages consumed by the coordinator.

use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::core::service::{ServiceConfig, TerminateReason};
use crate::core::types::QueueName;
use crate::runtime::RuntimeError;

/// Errors surfaced by scheduler commands.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The named queue is absent.
    #[error("queue not found: {0}")]
    QueueNotFound(QueueName),

    /// The queue exists but has no current runtime job.
    #[error("no service running for queue: {0}")]
    NotRunning(QueueName),

    /// The first job of a newly created queue failed to start; the queue
    /// was not created.
    #[error("first service of queue '{0}' failed to start; queue purged")]
    Purged(QueueName),

    /// `services_add` was called with no configurations.
    #[error("empty service list for queue: {0}")]
    EmptyServiceList(QueueName),

    /// The coordinator task is gone.
    #[error("channel error: {0}")]
    ChannelError(String),

    /// An adapter failure that maps to no other variant.
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

/// State of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Processing commands and lifecycle events.
    Running,
    /// Shut down; no further commands are served.
    Stopped,
}

/// Commands sent from handles to the coordinator.
pub(crate) enum SchedulerCommand {
    /// List a queue's pending configurations.
    QueueList {
        queue: QueueName,
        response: oneshot::Sender<Result<Vec<ServiceConfig>, SchedulerError>>,
    },
    /// Drop a queue's pending work.
    QueueClear {
        queue: QueueName,
        response: oneshot::Sender<Result<(), SchedulerError>>,
    },
    /// Pause a queue's running job.
    QueueSuspend {
        queue: QueueName,
        response: oneshot::Sender<Result<(), SchedulerError>>,
    },
    /// Resume a queue's running job.
    QueueResume {
        queue: QueueName,
        response: oneshot::Sender<Result<(), SchedulerError>>,
    },
    /// Enqueue configurations, creating the queue if needed.
    ServicesAdd {
        queue: QueueName,
        configs: Vec<ServiceConfig>,
        response: oneshot::Sender<Result<usize, SchedulerError>>,
    },
    /// Stop the running job and drop the queue.
    ServicesRemove {
        queue: QueueName,
        response: oneshot::Sender<Result<(), SchedulerError>>,
    },
    /// Restart a queue's running job in place.
    ServicesRestart {
        queue: QueueName,
        response: oneshot::Sender<Result<(), SchedulerError>>,
    },
    /// Shut the coordinator down.
    Shutdown { response: oneshot::Sender<()> },
}

/// Asynchronous lifecycle notifications delivered by decorated hooks and
/// by the terminate-wait timers.
#[derive(Debug)]
pub(crate) enum LifecycleEvent {
    /// A queue's job finished initialization.
    InitAfter {
        queue: QueueName,
        timeout_init: Duration,
    },
    /// A queue's job is about to terminate.
    TerminateBefore {
        queue: QueueName,
        reason: TerminateReason,
        timeout_terminate: Duration,
    },
    /// Timer tick: re-check whether the terminating job has disappeared.
    TerminateCheck {
        queue: QueueName,
        remaining: Duration,
    },
    /// The terminating job is confirmed gone (or its wait budget ran out).
    Terminated { queue: QueueName },
}
