//! # convoy
//!
//! A batch service scheduler: named FIFO queues of service configurations,
//! at most one running job per queue, cross-queue dependency ordering,
//! manual suspend/resume, purge-on-error, and graceful termination with a
//! bounded wait for each job's disappearance.
//!
//! The coordinator is a single task owning all queue state; commands and
//! lifecycle events are serialized over its channels. Jobs themselves run
//! behind a [`ServiceRuntime`] adapter, and the coordinator observes them
//! through the two hooks it decorates into every configuration.

pub mod api;
pub mod config;
pub mod core;
pub mod events;
pub mod runtime;
pub mod scheduler;
pub mod testing;

pub use crate::core::deps::{DependencyGraph, DepsError};
pub use crate::core::queue::QueueEntry;
pub use crate::core::service::{
    CommandSpec, InitHook, ServiceConfig, ServiceKind, ServiceOptions, ServiceSpec,
    TerminateHook, TerminateReason,
};
pub use crate::core::types::{NameError, QueueName, ServiceId};

pub use events::{Event, EventBus, EventHandler};

pub use runtime::{ProcessRuntime, RuntimeError, ServiceRuntime};

pub use scheduler::{CoordinatorState, Scheduler, SchedulerError, SchedulerHandle};

pub use config::{load_settings, ConfigError, Settings};
