//! Runtime adapter abstraction.
//!
//! The scheduler drives services through a [`ServiceRuntime`]: an opaque
//! capability that starts, stops, pauses, resumes, restarts, and probes
//! jobs. The scheduler calls it synchronously from its single owner task
//! and only ever special-cases the [`RuntimeError::NotFound`] error.

mod process;

pub use process::ProcessRuntime;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::service::ServiceConfig;
use crate::core::types::ServiceId;

/// Errors returned by a runtime adapter.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The runtime has no job with this id.
    #[error("service not found: {0}")]
    NotFound(ServiceId),

    /// The configuration cannot be executed by this runtime.
    #[error("unsupported service configuration: {0}")]
    Unsupported(String),

    /// A job failed to start.
    #[error("failed to start service: {0}")]
    StartFailed(String),

    /// Any other adapter failure.
    #[error("runtime error: {0}")]
    Other(String),
}

impl RuntimeError {
    /// Whether this error means the job is gone from the runtime.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::NotFound(_))
    }
}

/// Capability used by the coordinator to manage jobs.
///
/// Implementations deliver lifecycle notifications by invoking the hooks
/// carried in each configuration's options slot: init hooks once the job
/// finished initializing, terminate hooks just before it goes away.
#[async_trait]
pub trait ServiceRuntime: Send + Sync {
    /// Start one job and return its runtime id.
    async fn add(&self, config: ServiceConfig) -> Result<ServiceId, RuntimeError>;

    /// Request an orderly stop.
    async fn remove(&self, id: &ServiceId) -> Result<(), RuntimeError>;

    /// Pause a running job.
    async fn suspend(&self, id: &ServiceId) -> Result<(), RuntimeError>;

    /// Resume a paused job.
    async fn resume(&self, id: &ServiceId) -> Result<(), RuntimeError>;

    /// Restart a job in place, keeping its id.
    async fn restart(&self, id: &ServiceId) -> Result<(), RuntimeError>;

    /// Liveness probe: `Ok` while the job exists, `NotFound` once it has
    /// fully disappeared.
    async fn probe(&self, id: &ServiceId) -> Result<(), RuntimeError>;
}
