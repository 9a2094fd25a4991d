//! Lifecycle events and event handling.
//!
//! This module provides event emission for queue and service lifecycle
//! events, enabling observability into what the coordinator decides.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::core::types::{QueueName, ServiceId};

/// Lifecycle events emitted by the coordinator.
#[derive(Debug, Clone)]
pub enum Event {
    /// A service was started for a queue.
    ServiceStarted {
        queue: QueueName,
        service_id: ServiceId,
        timestamp: Instant,
    },

    /// A queue's current service began terminating.
    ServiceTerminating {
        queue: QueueName,
        /// Whether the reported reason was a clean shutdown.
        clean: bool,
        timestamp: Instant,
    },

    /// A queue was paused because one of its dependencies has work.
    QueueSuspended { queue: QueueName, timestamp: Instant },

    /// A previously paused queue was resumed.
    QueueResumed { queue: QueueName, timestamp: Instant },

    /// A queue drained or was removed.
    QueueRemoved { queue: QueueName, timestamp: Instant },

    /// A queue was purged after an error-class termination.
    QueuePurged {
        queue: QueueName,
        /// Number of pending configurations dropped.
        dropped: usize,
        timestamp: Instant,
    },

    /// The coordinator stopped because every queue drained.
    SchedulerStopped { timestamp: Instant },
}

impl Event {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> Instant {
        match self {
            Event::ServiceStarted { timestamp, .. } => *timestamp,
            Event::ServiceTerminating { timestamp, .. } => *timestamp,
            Event::QueueSuspended { timestamp, .. } => *timestamp,
            Event::QueueResumed { timestamp, .. } => *timestamp,
            Event::QueueRemoved { timestamp, .. } => *timestamp,
            Event::QueuePurged { timestamp, .. } => *timestamp,
            Event::SchedulerStopped { timestamp } => *timestamp,
        }
    }

    /// Create a ServiceStarted event.
    pub fn service_started(queue: QueueName, service_id: ServiceId) -> Self {
        Event::ServiceStarted {
            queue,
            service_id,
            timestamp: Instant::now(),
        }
    }

    /// Create a ServiceTerminating event.
    pub fn service_terminating(queue: QueueName, clean: bool) -> Self {
        Event::ServiceTerminating {
            queue,
            clean,
            timestamp: Instant::now(),
        }
    }

    /// Create a QueueSuspended event.
    pub fn queue_suspended(queue: QueueName) -> Self {
        Event::QueueSuspended {
            queue,
            timestamp: Instant::now(),
        }
    }

    /// Create a QueueResumed event.
    pub fn queue_resumed(queue: QueueName) -> Self {
        Event::QueueResumed {
            queue,
            timestamp: Instant::now(),
        }
    }

    /// Create a QueueRemoved event.
    pub fn queue_removed(queue: QueueName) -> Self {
        Event::QueueRemoved {
            queue,
            timestamp: Instant::now(),
        }
    }

    /// Create a QueuePurged event.
    pub fn queue_purged(queue: QueueName, dropped: usize) -> Self {
        Event::QueuePurged {
            queue,
            dropped,
            timestamp: Instant::now(),
        }
    }

    /// Create a SchedulerStopped event.
    pub fn scheduler_stopped() -> Self {
        Event::SchedulerStopped {
            timestamp: Instant::now(),
        }
    }
}

/// Handler for receiving lifecycle events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: &Event);
}

/// Event bus for distributing events to registered handlers.
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a new event bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an event handler.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    /// Emit an event to all registered handlers.
    pub async fn emit(&self, event: Event) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.handle(&event).await;
        }
    }

    /// Get the number of registered handlers.
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
