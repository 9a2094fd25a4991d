//! Request routing for the batch command surface.
//!
//! Commands arrive as URL suffixes of the form
//! `/batch/<queue>/<method>.<format>`, where the method names one of the
//! queue or service operations and the format selects the wire encoding.
//! The HTTP verb carries the idempotence class of the method: operations
//! that do not change coordinator queue state are GETs (restarting a job
//! changes the job, not the queue), additions are POSTs, and removals are
//! DELETEs.

use axum::http::Method as HttpMethod;
use thiserror::Error;

/// Errors raised while decoding an operation suffix.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    /// The suffix carries no `.<format>` part.
    #[error("malformed operation suffix: {0}")]
    Malformed(String),

    /// The method name is not part of the command surface.
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// The format is neither `erl` nor `json`.
    #[error("unknown format: {0}")]
    UnknownFormat(String),
}

/// The operations addressable over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMethod {
    Queue,
    QueueClear,
    QueueSuspend,
    QueueResume,
    ServicesAdd,
    ServicesRemove,
    ServicesRestart,
}

impl BatchMethod {
    fn parse(name: &str) -> Result<Self, RouteError> {
        match name {
            "queue" => Ok(BatchMethod::Queue),
            "queue_clear" => Ok(BatchMethod::QueueClear),
            "queue_suspend" => Ok(BatchMethod::QueueSuspend),
            "queue_resume" => Ok(BatchMethod::QueueResume),
            "services_add" => Ok(BatchMethod::ServicesAdd),
            "services_remove" => Ok(BatchMethod::ServicesRemove),
            "services_restart" => Ok(BatchMethod::ServicesRestart),
            other => Err(RouteError::UnknownMethod(other.to_string())),
        }
    }

    /// The HTTP verb this method is served under.
    pub fn verb(&self) -> HttpMethod {
        match self {
            BatchMethod::Queue => HttpMethod::GET,
            BatchMethod::QueueClear => HttpMethod::DELETE,
            BatchMethod::QueueSuspend => HttpMethod::GET,
            BatchMethod::QueueResume => HttpMethod::GET,
            BatchMethod::ServicesAdd => HttpMethod::POST,
            BatchMethod::ServicesRemove => HttpMethod::DELETE,
            BatchMethod::ServicesRestart => HttpMethod::GET,
        }
    }
}

/// The wire encodings of the command surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    Erl,
    Json,
}

impl WireFormat {
    fn parse(name: &str) -> Result<Self, RouteError> {
        match name {
            "erl" => Ok(WireFormat::Erl),
            "json" => Ok(WireFormat::Json),
            other => Err(RouteError::UnknownFormat(other.to_string())),
        }
    }
}

/// A decoded `<method>.<format>` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOp {
    pub method: BatchMethod,
    pub format: WireFormat,
}

/// Decode an operation suffix such as `services_add.json`.
pub fn parse_op(suffix: &str) -> Result<BatchOp, RouteError> {
    let (method, format) = suffix
        .rsplit_once('.')
        .ok_or_else(|| RouteError::Malformed(suffix.to_string()))?;
    Ok(BatchOp {
        method: BatchMethod::parse(method)?,
        format: WireFormat::parse(format)?,
    })
}
