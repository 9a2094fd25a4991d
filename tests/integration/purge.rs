//! Purge-on-error integration tests.

use convoy::testing::{config, MockRuntime};
use convoy::{Event, EventBus, Scheduler, Settings, TerminateReason};
use std::time::Duration;

use crate::common::{wait_for_add, RecordingHandler};

#[tokio::test]
async fn test_error_termination_purges_pending_work() {
    let runtime = MockRuntime::new();
    let events = RecordingHandler::new();
    let bus = EventBus::new();
    bus.register(events.clone()).await;

    let scheduler = Scheduler::with_runtime(runtime.clone()).with_event_bus(bus);
    let (handle, task) = scheduler.start().await;

    handle
        .services_add("batch", vec![config("c1"), config("c2"), config("c3")])
        .await
        .unwrap();
    let id = runtime.id_for("c1").unwrap();
    runtime.fire_terminate(&id, TerminateReason::Error("oom".into()), Duration::ZERO);

    let events_check = events.clone();
    wait_until_async(move || {
        let events = events_check.clone();
        async move {
            events
                .count_matching(|e| matches!(e, Event::QueuePurged { dropped: 2, .. }))
                .await
                > 0
        }
    })
    .await;

    assert_eq!(runtime.add_labels(), vec!["c1"]);
    assert!(handle.queue_list("batch").await.is_err());

    handle.shutdown().await.unwrap();
    let _ = task.await;
}

/// Poll an async condition every 10ms until it holds.
async fn wait_until_async<F, Fut>(mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while !cond().await {
        if start.elapsed() > Duration::from_secs(3) {
            panic!("condition not reached in time");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_clean_termination_never_purges() {
    let runtime = MockRuntime::new();
    let events = RecordingHandler::new();
    let bus = EventBus::new();
    bus.register(events.clone()).await;

    let scheduler = Scheduler::with_runtime(runtime.clone()).with_event_bus(bus);
    let (handle, task) = scheduler.start().await;

    handle
        .services_add("batch", vec![config("c1"), config("c2")])
        .await
        .unwrap();
    let id = runtime.id_for("c1").unwrap();
    runtime.fire_terminate(
        &id,
        TerminateReason::ShutdownWith("rolling".into()),
        Duration::ZERO,
    );

    wait_for_add(&runtime, "c2").await;
    assert_eq!(
        events
            .count_matching(|e| matches!(e, Event::QueuePurged { .. }))
            .await,
        0
    );

    handle.shutdown().await.unwrap();
    let _ = task.await;
}

#[tokio::test]
async fn test_purge_flag_is_sticky_across_repeated_notifications() {
    let runtime = MockRuntime::new();
    let events = RecordingHandler::new();
    let bus = EventBus::new();
    bus.register(events.clone()).await;

    let scheduler = Scheduler::with_runtime(runtime.clone()).with_event_bus(bus);
    let (handle, task) = scheduler.start().await;

    handle
        .services_add("batch", vec![config("c1"), config("c2")])
        .await
        .unwrap();
    let id = runtime.id_for("c1").unwrap();

    // An inner hook reports an error first, then an outer hook reports a
    // clean shutdown for the same terminating window. The error must win.
    runtime.fire_terminate_keep(&id, TerminateReason::Error("inner".into()), Duration::from_secs(5));
    runtime.fire_terminate_keep(&id, TerminateReason::Shutdown, Duration::from_secs(5));
    runtime.finish(&id);

    let events_check = events.clone();
    wait_until_async(move || {
        let events = events_check.clone();
        async move {
            events
                .count_matching(|e| matches!(e, Event::QueuePurged { .. }))
                .await
                > 0
        }
    })
    .await;

    // The queue never advanced to c2.
    assert_eq!(runtime.add_labels(), vec!["c1"]);

    handle.shutdown().await.unwrap();
    let _ = task.await;
}

#[tokio::test]
async fn test_purge_disabled_by_settings() {
    let settings: Settings = convoy::config::parse_settings("purge_on_error: false").unwrap();

    let runtime = MockRuntime::new();
    let scheduler =
        Scheduler::with_runtime(runtime.clone()).with_purge_on_error(settings.purge_on_error);
    let (handle, task) = scheduler.start().await;

    handle
        .services_add("batch", vec![config("c1"), config("c2")])
        .await
        .unwrap();
    let id = runtime.id_for("c1").unwrap();
    runtime.fire_terminate(&id, TerminateReason::Error("oom".into()), Duration::ZERO);

    // Without purge-on-error the queue keeps draining.
    wait_for_add(&runtime, "c2").await;

    handle.shutdown().await.unwrap();
    let _ = task.await;
}

#[tokio::test]
async fn test_failed_advance_resumes_dependants() {
    let runtime = MockRuntime::new();
    runtime.fail_add_for("c2");
    let scheduler = Scheduler::with_runtime(runtime.clone()).with_dependencies(
        convoy::DependencyGraph::new([("b".to_string(), vec!["a".to_string()])]).unwrap(),
    );
    let (handle, task) = scheduler.start().await;

    handle
        .services_add("a", vec![config("c1"), config("c2")])
        .await
        .unwrap();
    handle.services_add("b", vec![config("cb")]).await.unwrap();

    // a's advance to c2 fails, dropping a; b must still be unblocked.
    let id = runtime.id_for("c1").unwrap();
    runtime.fire_terminate(&id, TerminateReason::Shutdown, Duration::ZERO);

    wait_for_add(&runtime, "cb").await;
    assert!(handle.queue_list("a").await.is_err());

    handle.shutdown().await.unwrap();
    let _ = task.await;
}

#[tokio::test]
async fn test_purged_queue_resumes_dependants() {
    let runtime = MockRuntime::new();
    let scheduler = Scheduler::with_runtime(runtime.clone()).with_dependencies(
        convoy::DependencyGraph::new([("b".to_string(), vec!["a".to_string()])]).unwrap(),
    );
    let (handle, task) = scheduler.start().await;

    handle
        .services_add("a", vec![config("c1"), config("c2")])
        .await
        .unwrap();
    handle.services_add("b", vec![config("cb")]).await.unwrap();

    let id = runtime.id_for("c1").unwrap();
    runtime.fire_terminate(&id, TerminateReason::Error("oom".into()), Duration::ZERO);

    wait_for_add(&runtime, "cb").await;
    assert!(handle.queue_list("a").await.is_err());

    handle.shutdown().await.unwrap();
    let _ = task.await;
}

#[tokio::test]
async fn test_sticky_purge_survives_wait_ticks() {
    let runtime = MockRuntime::new();
    let events = RecordingHandler::new();
    let bus = EventBus::new();
    bus.register(events.clone()).await;

    let scheduler = Scheduler::with_runtime(runtime.clone()).with_event_bus(bus);
    let (handle, task) = scheduler.start().await;

    handle
        .services_add("batch", vec![config("c1"), config("c2")])
        .await
        .unwrap();
    let id = runtime.id_for("c1").unwrap();

    // Error announced; the job lingers long enough for at least one
    // disappearance re-check before it actually goes away.
    runtime.fire_terminate_keep(&id, TerminateReason::Error("oom".into()), Duration::from_secs(5));
    tokio::time::sleep(Duration::from_millis(600)).await;
    runtime.finish(&id);

    let events_check = events.clone();
    wait_until_async(move || {
        let events = events_check.clone();
        async move {
            events
                .count_matching(|e| matches!(e, Event::QueuePurged { .. }))
                .await
                > 0
        }
    })
    .await;
    assert_eq!(runtime.add_labels(), vec!["c1"]);

    handle.shutdown().await.unwrap();
    let _ = task.await;
}
