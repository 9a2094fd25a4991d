//! Scheduler handle for controlling the coordinator.
//!
//! This module provides the [`SchedulerHandle`] type through which external
//! callers issue queue and service commands. The handle is the in-process
//! command surface: it validates what the coordinator assumes (non-empty
//! service lists) and serializes everything else onto the command channel.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, RwLock};

use crate::core::service::ServiceConfig;
use crate::core::types::QueueName;

use super::types::{CoordinatorState, SchedulerCommand, SchedulerError};

/// Buffer size for the command channel between handle and coordinator.
pub(crate) const COMMAND_CHANNEL_BUFFER: usize = 32;

/// Handle for controlling the scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    pub(crate) command_tx: mpsc::Sender<SchedulerCommand>,
    pub(crate) state: Arc<RwLock<CoordinatorState>>,
}

impl SchedulerHandle {
    /// Helper to send a command that returns a result and wait for response.
    async fn send_result_command<T>(
        &self,
        build_command: impl FnOnce(oneshot::Sender<Result<T, SchedulerError>>) -> SchedulerCommand,
        operation: &str,
    ) -> Result<T, SchedulerError>
    where
        T: Send + 'static,
    {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(build_command(response_tx))
            .await
            .map_err(|_| {
                SchedulerError::ChannelError(format!("failed to send {} command", operation))
            })?;

        response_rx.await.map_err(|_| {
            SchedulerError::ChannelError(format!("failed to receive {} response", operation))
        })?
    }

    /// List a queue's pending configurations, front first.
    pub async fn queue_list(
        &self,
        queue: impl Into<QueueName>,
    ) -> Result<Vec<ServiceConfig>, SchedulerError> {
        let queue = queue.into();
        self.send_result_command(
            |response| SchedulerCommand::QueueList { queue, response },
            "queue_list",
        )
        .await
    }

    /// Drop a queue's pending work. The queue itself goes away unless a job
    /// is still running.
    pub async fn queue_clear(&self, queue: impl Into<QueueName>) -> Result<(), SchedulerError> {
        let queue = queue.into();
        self.send_result_command(
            |response| SchedulerCommand::QueueClear { queue, response },
            "queue_clear",
        )
        .await
    }

    /// Pause the queue's running job through the runtime adapter.
    pub async fn queue_suspend(&self, queue: impl Into<QueueName>) -> Result<(), SchedulerError> {
        let queue = queue.into();
        self.send_result_command(
            |response| SchedulerCommand::QueueSuspend { queue, response },
            "queue_suspend",
        )
        .await
    }

    /// Resume the queue's running job through the runtime adapter.
    pub async fn queue_resume(&self, queue: impl Into<QueueName>) -> Result<(), SchedulerError> {
        let queue = queue.into();
        self.send_result_command(
            |response| SchedulerCommand::QueueResume { queue, response },
            "queue_resume",
        )
        .await
    }

    /// Enqueue configurations for a queue, creating it if needed. Returns
    /// the new number of pending configurations.
    pub async fn services_add(
        &self,
        queue: impl Into<QueueName>,
        configs: Vec<ServiceConfig>,
    ) -> Result<usize, SchedulerError> {
        let queue = queue.into();
        if configs.is_empty() {
            return Err(SchedulerError::EmptyServiceList(queue));
        }
        self.send_result_command(
            |response| SchedulerCommand::ServicesAdd {
                queue,
                configs,
                response,
            },
            "services_add",
        )
        .await
    }

    /// Stop the queue's running job and drop the queue.
    pub async fn services_remove(&self, queue: impl Into<QueueName>) -> Result<(), SchedulerError> {
        let queue = queue.into();
        self.send_result_command(
            |response| SchedulerCommand::ServicesRemove { queue, response },
            "services_remove",
        )
        .await
    }

    /// Restart the queue's running job in place.
    pub async fn services_restart(
        &self,
        queue: impl Into<QueueName>,
    ) -> Result<(), SchedulerError> {
        let queue = queue.into();
        self.send_result_command(
            |response| SchedulerCommand::ServicesRestart { queue, response },
            "services_restart",
        )
        .await
    }

    /// Shut the coordinator down.
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(SchedulerCommand::Shutdown {
                response: response_tx,
            })
            .await
            .map_err(|_| {
                SchedulerError::ChannelError("failed to send shutdown command".to_string())
            })?;

        response_rx.await.map_err(|_| {
            SchedulerError::ChannelError("failed to receive shutdown response".to_string())
        })
    }

    /// Get the current coordinator state.
    pub async fn state(&self) -> CoordinatorState {
        *self.state.read().await
    }

    /// Check if the coordinator is running.
    pub async fn is_running(&self) -> bool {
        *self.state.read().await == CoordinatorState::Running
    }
}
