//! Batch command dispatch.
//!
//! One wildcard route serves the whole command surface: the operation
//! suffix is decoded, the verb is checked against the per-method table,
//! and the scheduler's answer is encoded in the requested wire format.
//! Taxonomy errors (`not_found`, `not_running`, `purged`) travel in-band
//! as unsuccessful responses, not as HTTP errors.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, Method as HttpMethod, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::core::service::ServiceConfig;
use crate::core::types::QueueName;
use crate::scheduler::{SchedulerError, SchedulerHandle};

use super::errors::ApiError;
use super::route::{parse_op, BatchMethod, WireFormat};
use super::term::{self, Term};

/// Shared application state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub handle: SchedulerHandle,
}

/// Successful command payloads.
enum Reply {
    Ok,
    Count(usize),
    Configs(Vec<ServiceConfig>),
}

/// Compact token for a scheduler error.
fn error_token(error: &SchedulerError) -> String {
    match error {
        SchedulerError::QueueNotFound(_) => "not_found".to_string(),
        SchedulerError::NotRunning(_) => "not_running".to_string(),
        SchedulerError::Purged(_) => "purged".to_string(),
        SchedulerError::EmptyServiceList(_) => "empty_service_list".to_string(),
        SchedulerError::ChannelError(_) => "scheduler_unavailable".to_string(),
        SchedulerError::Runtime(e) => format!("runtime_error: {}", e),
    }
}

fn encode_reply(format: WireFormat, result: Result<Reply, SchedulerError>) -> Response {
    match format {
        WireFormat::Json => {
            let body = match result {
                Ok(Reply::Ok) => json!({"success": true}),
                Ok(Reply::Count(count)) => json!({"success": true, "count": count}),
                Ok(Reply::Configs(configs)) => json!({"success": true, "queue": configs}),
                Err(error) => json!({"success": false, "error": error_token(&error)}),
            };
            Json(body).into_response()
        }
        WireFormat::Erl => {
            let term = match result {
                Ok(Reply::Ok) => Term::atom("ok"),
                Ok(Reply::Count(count)) => {
                    Term::pair(Term::atom("ok"), Term::Int(count as i64))
                }
                Ok(Reply::Configs(configs)) => {
                    Term::pair(Term::atom("ok"), term::configs_to_term(&configs))
                }
                Err(error) => {
                    let token = error_token(&error);
                    Term::pair(Term::atom("error"), Term::Atom(token))
                }
            };
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                term.to_string(),
            )
                .into_response()
        }
    }
}

fn decode_configs(format: WireFormat, body: &Bytes) -> Result<Vec<ServiceConfig>, ApiError> {
    match format {
        WireFormat::Json => serde_json::from_slice(body)
            .map_err(|e| ApiError::BadRequest(format!("invalid configuration body: {}", e))),
        WireFormat::Erl => {
            let text = std::str::from_utf8(body)
                .map_err(|_| ApiError::BadRequest("body is not valid UTF-8".to_string()))?;
            term::parse_configs(text)
                .map_err(|e| ApiError::BadRequest(format!("invalid configuration body: {}", e)))
        }
    }
}

/// Serve one batch command.
pub async fn dispatch(
    State(state): State<ApiState>,
    Path((queue, op)): Path<(String, String)>,
    method: HttpMethod,
    body: Bytes,
) -> Result<Response, ApiError> {
    let op = parse_op(&op).map_err(|e| ApiError::NotFound(e.to_string()))?;
    if method != op.method.verb() {
        return Err(ApiError::MethodNotAllowed(format!(
            "use {} for this operation",
            op.method.verb()
        )));
    }
    let queue = QueueName::parse(&queue)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let handle = &state.handle;
    let result = match op.method {
        BatchMethod::Queue => handle.queue_list(queue).await.map(Reply::Configs),
        BatchMethod::QueueClear => handle.queue_clear(queue).await.map(|()| Reply::Ok),
        BatchMethod::QueueSuspend => handle.queue_suspend(queue).await.map(|()| Reply::Ok),
        BatchMethod::QueueResume => handle.queue_resume(queue).await.map(|()| Reply::Ok),
        BatchMethod::ServicesAdd => {
            let configs = decode_configs(op.format, &body)?;
            handle.services_add(queue, configs).await.map(Reply::Count)
        }
        BatchMethod::ServicesRemove => handle.services_remove(queue).await.map(|()| Reply::Ok),
        BatchMethod::ServicesRestart => handle.services_restart(queue).await.map(|()| Reply::Ok),
    };

    Ok(encode_reply(op.format, result))
}

/// Health check endpoint.
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")}))
}
