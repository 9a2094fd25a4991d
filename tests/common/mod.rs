//! Common test utilities shared across integration tests.

use async_trait::async_trait;
use convoy::testing::MockRuntime;
use convoy::{Event, EventHandler};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Recording event handler for verifying emitted events.
pub struct RecordingHandler {
    events: Mutex<Vec<Event>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }

    pub async fn count_matching(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().await.iter().filter(|e| pred(e)).count()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &Event) {
        self.events.lock().await.push(event.clone());
    }
}

/// Poll a condition every 10ms until it holds.
///
/// This is more reliable than fixed sleeps since scheduling time can vary.
///
/// # Panics
///
/// Panics if the condition does not hold within three seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool, what: &str) {
    let start = tokio::time::Instant::now();
    while !cond() {
        if start.elapsed() > Duration::from_secs(3) {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait until the mock runtime has observed an add for this label.
pub async fn wait_for_add(runtime: &MockRuntime, label: &str) {
    let label = label.to_string();
    wait_until(
        || runtime.add_labels().iter().any(|l| *l == label),
        &format!("add of '{}'", label),
    )
    .await;
}
