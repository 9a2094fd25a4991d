//! Dependency ordering integration tests.
//!
//! Queues with declared dependencies must hold back while their
//! dependencies have work, pause running dependants when a dependency
//! starts, and resume once the dependency drains.

use convoy::testing::{config, MockRuntime, RuntimeCall};
use convoy::{DependencyGraph, Event, EventBus, Scheduler, TerminateReason};
use std::time::Duration;

use crate::common::{wait_for_add, wait_until, RecordingHandler};

fn deps(pairs: &[(&str, &[&str])]) -> DependencyGraph {
    DependencyGraph::new(pairs.iter().map(|(q, ds)| {
        (
            q.to_string(),
            ds.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
        )
    }))
    .unwrap()
}

#[tokio::test]
async fn test_chain_unblocks_in_order() {
    let runtime = MockRuntime::new();
    let scheduler = Scheduler::with_runtime(runtime.clone())
        .with_dependencies(deps(&[("b", &["a"]), ("c", &["b"])]));
    let (handle, task) = scheduler.start().await;

    handle.services_add("a", vec![config("ca")]).await.unwrap();
    handle.services_add("b", vec![config("cb")]).await.unwrap();
    handle.services_add("c", vec![config("cc")]).await.unwrap();

    // Only the head of the chain runs.
    assert_eq!(runtime.add_labels(), vec!["ca"]);

    // a drains: b advances, c stays held because b now has work.
    let id_a = runtime.id_for("ca").unwrap();
    runtime.fire_terminate(&id_a, TerminateReason::Shutdown, Duration::ZERO);
    wait_for_add(&runtime, "cb").await;
    assert_eq!(runtime.add_labels(), vec!["ca", "cb"]);

    // b drains: c advances.
    let id_b = runtime.id_for("cb").unwrap();
    runtime.fire_terminate(&id_b, TerminateReason::Shutdown, Duration::ZERO);
    wait_for_add(&runtime, "cc").await;
    assert_eq!(runtime.add_labels(), vec!["ca", "cb", "cc"]);

    handle.shutdown().await.unwrap();
    let _ = task.await;
}

#[tokio::test]
async fn test_dependant_runs_when_dependency_is_idle() {
    let runtime = MockRuntime::new();
    let scheduler =
        Scheduler::with_runtime(runtime.clone()).with_dependencies(deps(&[("b", &["a"])]));
    let (handle, task) = scheduler.start().await;

    // a is not live, so b may run immediately.
    handle.services_add("b", vec![config("cb")]).await.unwrap();
    assert_eq!(runtime.add_labels(), vec!["cb"]);

    handle.shutdown().await.unwrap();
    let _ = task.await;
}

#[tokio::test]
async fn test_running_dependant_is_paused_and_resumed() {
    let runtime = MockRuntime::new();
    let events = RecordingHandler::new();
    let bus = EventBus::new();
    bus.register(events.clone()).await;

    let scheduler = Scheduler::with_runtime(runtime.clone())
        .with_dependencies(deps(&[("b", &["a"])]))
        .with_event_bus(bus);
    let (handle, task) = scheduler.start().await;

    handle.services_add("b", vec![config("cb")]).await.unwrap();
    let id_b = runtime.id_for("cb").unwrap();

    handle.services_add("a", vec![config("ca")]).await.unwrap();
    assert!(runtime
        .calls()
        .contains(&RuntimeCall::Suspend(id_b.clone())));
    assert_eq!(
        events
            .count_matching(|e| matches!(e, Event::QueueSuspended { .. }))
            .await,
        1
    );

    let id_a = runtime.id_for("ca").unwrap();
    runtime.fire_terminate(&id_a, TerminateReason::Shutdown, Duration::ZERO);

    let runtime_check = runtime.clone();
    let id_b_check = id_b.clone();
    wait_until(
        || {
            runtime_check
                .calls()
                .contains(&RuntimeCall::Resume(id_b_check.clone()))
        },
        "resume of b's job",
    )
    .await;
    assert_eq!(
        events
            .count_matching(|e| matches!(e, Event::QueueResumed { .. }))
            .await,
        1
    );

    handle.shutdown().await.unwrap();
    let _ = task.await;
}

#[tokio::test]
async fn test_two_dependants_resume_after_shared_dependency() {
    let runtime = MockRuntime::new();
    let scheduler = Scheduler::with_runtime(runtime.clone())
        .with_dependencies(deps(&[("b", &["a"]), ("c", &["a"])]));
    let (handle, task) = scheduler.start().await;

    handle.services_add("a", vec![config("ca")]).await.unwrap();
    handle.services_add("b", vec![config("cb")]).await.unwrap();
    handle.services_add("c", vec![config("cc")]).await.unwrap();
    assert_eq!(runtime.add_labels(), vec!["ca"]);

    let id_a = runtime.id_for("ca").unwrap();
    runtime.fire_terminate(&id_a, TerminateReason::Shutdown, Duration::ZERO);

    wait_for_add(&runtime, "cb").await;
    wait_for_add(&runtime, "cc").await;

    handle.shutdown().await.unwrap();
    let _ = task.await;
}

#[tokio::test]
async fn test_removing_dependency_unblocks_dependant() {
    let runtime = MockRuntime::new();
    let scheduler =
        Scheduler::with_runtime(runtime.clone()).with_dependencies(deps(&[("b", &["a"])]));
    let (handle, task) = scheduler.start().await;

    handle.services_add("a", vec![config("ca")]).await.unwrap();
    handle.services_add("b", vec![config("cb")]).await.unwrap();

    // Dropping a entirely counts as the dependency going idle.
    handle.services_remove("a").await.unwrap();
    wait_for_add(&runtime, "cb").await;

    handle.shutdown().await.unwrap();
    let _ = task.await;
}
