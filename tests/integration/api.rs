//! Command surface integration tests.
//!
//! These tests drive the batch endpoint through the router in both wire
//! formats.

use convoy::api::{build_router, create_api_state};
use convoy::testing::{config, MockRuntime};
use convoy::Scheduler;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;

/// Create a router backed by a fresh scheduler over a mock runtime.
async fn create_test_router() -> (Router, Arc<MockRuntime>, convoy::SchedulerHandle) {
    let runtime = MockRuntime::new();
    let scheduler = Scheduler::with_runtime(runtime.clone());
    let (handle, _task) = scheduler.start().await;
    let router = build_router(create_api_state(handle.clone()));
    (router, runtime, handle)
}

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<String>,
) -> (StatusCode, String) {
    use tower::ServiceExt;

    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(body.map(Body::from).unwrap_or_else(Body::empty))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8_lossy(&bytes).to_string())
}

#[tokio::test]
async fn test_health_endpoint() {
    let (router, _runtime, _handle) = create_test_router().await;

    let (status, body) = send(&router, Method::GET, "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);

    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_services_add_and_queue_json() {
    let (router, runtime, _handle) = create_test_router().await;

    let configs = json!([
        {"kind": "external", "spec": {"program": "c1"}},
        {"kind": "external", "spec": {"program": "c2"}}
    ]);
    let (status, body) = send(
        &router,
        Method::POST,
        "/batch/imports/services_add.json",
        Some(configs.to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["count"], 1);
    assert_eq!(runtime.add_labels(), vec!["c1"]);

    let (status, body) = send(&router, Method::GET, "/batch/imports/queue.json", None).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["success"], true);
    let queue = json["queue"].as_array().unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0]["spec"]["program"], "c2");
}

#[tokio::test]
async fn test_unknown_queue_json_error_token() {
    let (router, _runtime, _handle) = create_test_router().await;

    let (status, body) = send(&router, Method::GET, "/batch/ghost/queue.json", None).await;
    // Taxonomy errors travel in-band.
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "not_found");
}

#[tokio::test]
async fn test_services_add_and_queue_erl() {
    let (router, runtime, _handle) = create_test_router().await;

    let body = r#"[[{kind,external},{program,"c1"}],[{kind,external},{program,"c2"}]]"#;
    let (status, reply) = send(
        &router,
        Method::POST,
        "/batch/imports/services_add.erl",
        Some(body.to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply, "{ok,1}");
    assert_eq!(runtime.add_labels(), vec!["c1"]);

    let (status, reply) = send(&router, Method::GET, "/batch/imports/queue.erl", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        reply,
        "{ok,[[{kind,external},{program,\"c2\"}]]}"
    );

    let (_, reply) = send(&router, Method::GET, "/batch/ghost/queue.erl", None).await;
    assert_eq!(reply, "{error,not_found}");
}

#[tokio::test]
async fn test_queue_clear_and_remove_verbs() {
    let (router, _runtime, handle) = create_test_router().await;

    handle
        .services_add("imports", vec![config("c1"), config("c2")])
        .await
        .unwrap();

    let (status, body) = send(
        &router,
        Method::DELETE,
        "/batch/imports/queue_clear.json",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(handle.queue_list("imports").await.unwrap().len(), 0);

    let (status, body) = send(
        &router,
        Method::DELETE,
        "/batch/imports/services_remove.json",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["success"], true);
    assert!(handle.queue_list("imports").await.is_err());
}

#[tokio::test]
async fn test_wrong_verb_is_rejected() {
    let (router, _runtime, _handle) = create_test_router().await;

    let (status, _) = send(&router, Method::GET, "/batch/a/services_add.json", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = send(&router, Method::POST, "/batch/a/queue.json", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_unknown_operation_is_not_found() {
    let (router, _runtime, _handle) = create_test_router().await;

    let (status, _) = send(&router, Method::GET, "/batch/a/queue_flush.json", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&router, Method::GET, "/batch/a/queue.xml", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let (router, _runtime, _handle) = create_test_router().await;

    let (status, _) = send(
        &router,
        Method::POST,
        "/batch/a/services_add.json",
        Some("not json".to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &router,
        Method::POST,
        "/batch/a/services_add.erl",
        Some("{truncated".to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_wildcard_queue_name_is_bad_request() {
    let (router, _runtime, _handle) = create_test_router().await;

    let (status, _) = send(&router, Method::GET, "/batch/im*orts/queue.json", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_restart_over_wire() {
    let (router, runtime, handle) = create_test_router().await;

    handle
        .services_add("imports", vec![config("c1"), config("c2")])
        .await
        .unwrap();
    let (_, reply) = send(
        &router,
        Method::GET,
        "/batch/imports/services_restart.erl",
        None,
    )
    .await;
    assert_eq!(reply, "ok");

    // The queue loses its job before the next restart lands.
    runtime.set_restart_not_found(true);
    let (_, reply) = send(
        &router,
        Method::GET,
        "/batch/imports/services_restart.erl",
        None,
    )
    .await;
    assert_eq!(reply, "{error,not_running}");
}
