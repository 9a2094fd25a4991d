//! Queue workflow integration tests.
//!
//! Drive a queue from submission to drain through the scheduler handle,
//! with the mock runtime standing in for the service host.

use convoy::testing::{config, MockRuntime};
use convoy::{Event, EventBus, Scheduler, SchedulerError, ServiceConfig, TerminateReason};
use std::time::Duration;

use crate::common::{wait_for_add, wait_until, RecordingHandler};

#[tokio::test]
async fn test_single_queue_runs_to_completion() {
    let runtime = MockRuntime::new();
    let events = RecordingHandler::new();
    let bus = EventBus::new();
    bus.register(events.clone()).await;

    let scheduler = Scheduler::with_runtime(runtime.clone()).with_event_bus(bus);
    let (handle, task) = scheduler.start().await;

    let pending = handle
        .services_add("batch", vec![config("c1"), config("c2"), config("c3")])
        .await
        .unwrap();
    assert_eq!(pending, 2);

    // Drive each job to a clean end; the queue advances in FIFO order.
    for label in ["c1", "c2", "c3"] {
        wait_for_add(&runtime, label).await;
        let id = runtime.id_for(label).unwrap();
        runtime.fire_init(&id, Duration::from_millis(20));
        runtime.fire_terminate(&id, TerminateReason::Shutdown, Duration::ZERO);
    }

    let handle_check = handle.clone();
    let start = tokio::time::Instant::now();
    while handle_check.queue_list("batch").await.is_ok() {
        assert!(
            start.elapsed() < Duration::from_secs(3),
            "queue did not drain"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(runtime.add_labels(), vec!["c1", "c2", "c3"]);

    let recorded = events.events().await;
    let started = recorded
        .iter()
        .filter(|e| matches!(e, Event::ServiceStarted { .. }))
        .count();
    assert_eq!(started, 3);
    assert!(recorded
        .iter()
        .any(|e| matches!(e, Event::QueueRemoved { .. })));

    handle.shutdown().await.unwrap();
    let _ = task.await;
}

#[tokio::test]
async fn test_pending_list_reflects_fifo_order() {
    let runtime = MockRuntime::new();
    let scheduler = Scheduler::with_runtime(runtime.clone());
    let (handle, task) = scheduler.start().await;

    handle
        .services_add("batch", vec![config("c1"), config("c2")])
        .await
        .unwrap();
    handle
        .services_add("batch", vec![config("c3")])
        .await
        .unwrap();

    let pending = handle.queue_list("batch").await.unwrap();
    assert_eq!(pending, vec![config("c2"), config("c3")]);

    // Listing twice returns the same answer: it does not consume.
    assert_eq!(handle.queue_list("batch").await.unwrap(), pending);

    handle.shutdown().await.unwrap();
    let _ = task.await;
}

#[tokio::test]
async fn test_cleared_queue_drains_after_current_job() {
    let runtime = MockRuntime::new();
    let scheduler = Scheduler::with_runtime(runtime.clone());
    let (handle, task) = scheduler.start().await;

    handle
        .services_add("batch", vec![config("c1"), config("c2")])
        .await
        .unwrap();
    handle.queue_clear("batch").await.unwrap();
    assert_eq!(
        handle.queue_list("batch").await.unwrap(),
        Vec::<ServiceConfig>::new()
    );

    // With nothing pending, a clean termination removes the queue.
    let id = runtime.id_for("c1").unwrap();
    runtime.fire_terminate(&id, TerminateReason::Shutdown, Duration::ZERO);

    let handle_check = handle.clone();
    let start = tokio::time::Instant::now();
    loop {
        if let Err(SchedulerError::QueueNotFound(_)) = handle_check.queue_list("batch").await {
            break;
        }
        assert!(
            start.elapsed() < Duration::from_secs(3),
            "queue did not drain"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // c2 was never started.
    assert_eq!(runtime.add_labels(), vec!["c1"]);

    handle.shutdown().await.unwrap();
    let _ = task.await;
}

#[tokio::test]
async fn test_suspend_and_resume_pass_through_to_runtime() {
    let runtime = MockRuntime::new();
    let scheduler = Scheduler::with_runtime(runtime.clone());
    let (handle, task) = scheduler.start().await;

    handle
        .services_add("batch", vec![config("c1")])
        .await
        .unwrap();

    handle.queue_suspend("batch").await.unwrap();
    handle.queue_resume("batch").await.unwrap();

    let id = runtime.id_for("c1").unwrap();
    let calls = runtime.calls();
    assert!(calls.contains(&convoy::testing::RuntimeCall::Suspend(id.clone())));
    assert!(calls.contains(&convoy::testing::RuntimeCall::Resume(id)));

    handle.shutdown().await.unwrap();
    let _ = task.await;
}

#[tokio::test]
async fn test_restart_passes_through_to_runtime() {
    let runtime = MockRuntime::new();
    let scheduler = Scheduler::with_runtime(runtime.clone());
    let (handle, task) = scheduler.start().await;

    handle
        .services_add("batch", vec![config("c1")])
        .await
        .unwrap();
    handle.services_restart("batch").await.unwrap();

    let id = runtime.id_for("c1").unwrap();
    assert!(runtime
        .calls()
        .contains(&convoy::testing::RuntimeCall::Restart(id)));

    handle.shutdown().await.unwrap();
    let _ = task.await;
}

#[tokio::test]
async fn test_reinit_after_terminate_keeps_job_running() {
    let runtime = MockRuntime::new();
    let scheduler = Scheduler::with_runtime(runtime.clone());
    let (handle, task) = scheduler.start().await;

    handle
        .services_add("batch", vec![config("c1"), config("c2")])
        .await
        .unwrap();
    let id = runtime.id_for("c1").unwrap();

    // The job announces termination with a long budget, then comes back.
    runtime.fire_terminate_keep(&id, TerminateReason::Shutdown, Duration::from_secs(5));
    runtime.fire_init(&id, Duration::from_millis(20));

    // Well past the first re-check tick, nothing has advanced.
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(runtime.add_labels(), vec!["c1"]);
    assert_eq!(handle.queue_list("batch").await.unwrap(), vec![config("c2")]);

    // Now it really terminates.
    runtime.fire_terminate(&id, TerminateReason::Shutdown, Duration::ZERO);
    wait_until(
        || runtime.add_labels() == vec!["c1", "c2"],
        "advance to c2",
    )
    .await;

    handle.shutdown().await.unwrap();
    let _ = task.await;
}
