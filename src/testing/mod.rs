//! Testing utilities for users of the convoy library.
//!
//! This module provides helpers for testing queue orchestration:
//!
//! - [`MockRuntime`]: a runtime adapter that records every call, can be
//!   scripted to fail, and fires lifecycle hooks on demand
//! - [`RuntimeCall`]: the recorded call shapes for assertions
//! - [`config`]: a one-line service configuration builder

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core::service::{CommandSpec, ServiceConfig, ServiceSpec, TerminateReason};
use crate::core::types::ServiceId;
use crate::runtime::{RuntimeError, ServiceRuntime};

/// Build a labelled configuration. The label doubles as the program name,
/// which is how [`MockRuntime`] identifies add calls.
pub fn config(label: &str) -> ServiceConfig {
    ServiceConfig::command(CommandSpec::new(label))
}

/// One recorded adapter call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    /// A job was started; carries the configuration's label.
    Add(String),
    Remove(ServiceId),
    Suspend(ServiceId),
    Resume(ServiceId),
    Restart(ServiceId),
    Probe(ServiceId),
}

struct Inner {
    next_id: u64,
    running: HashMap<ServiceId, ServiceConfig>,
    ids_by_label: HashMap<String, Vec<ServiceId>>,
    calls: Vec<RuntimeCall>,
    fail_add_labels: HashSet<String>,
    restart_not_found: bool,
}

/// A scriptable in-memory runtime adapter.
///
/// Jobs never run anywhere: the test decides when a job initializes or
/// terminates by firing the hooks the scheduler decorated into its
/// configuration.
///
/// # Example
///
/// ```
/// use convoy::testing::{config, MockRuntime};
/// use convoy::{ServiceRuntime, TerminateReason};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let runtime = MockRuntime::new();
/// let id = runtime
///     .add(config("job"))
///     .await
///     .unwrap();
/// runtime.fire_init(&id, Duration::from_millis(50));
/// runtime.fire_terminate(&id, TerminateReason::Shutdown, Duration::ZERO);
/// # }
/// ```
pub struct MockRuntime {
    inner: Mutex<Inner>,
}

impl MockRuntime {
    /// Create a new mock runtime.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                running: HashMap::new(),
                ids_by_label: HashMap::new(),
                calls: Vec::new(),
                fail_add_labels: HashSet::new(),
                restart_not_found: false,
            }),
        })
    }

    /// Snapshot of every recorded call, in order.
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// The labels of all add calls, in order.
    pub fn add_labels(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter_map(|c| match c {
                RuntimeCall::Add(label) => Some(label.clone()),
                _ => None,
            })
            .collect()
    }

    /// The most recent id assigned to a configuration with this label.
    pub fn id_for(&self, label: &str) -> Option<ServiceId> {
        self.inner
            .lock()
            .unwrap()
            .ids_by_label
            .get(label)
            .and_then(|ids| ids.last().cloned())
    }

    /// Script every future add of this label to fail.
    pub fn fail_add_for(&self, label: &str) {
        self.inner
            .lock()
            .unwrap()
            .fail_add_labels
            .insert(label.to_string());
    }

    /// Script restart calls to answer not-found.
    pub fn set_restart_not_found(&self, value: bool) {
        self.inner.lock().unwrap().restart_not_found = value;
    }

    /// Number of jobs currently held by the mock.
    pub fn running(&self) -> usize {
        self.inner.lock().unwrap().running.len()
    }

    /// Fire the init hooks of a job, front first.
    pub fn fire_init(&self, id: &ServiceId, timeout_init: Duration) {
        let hooks = {
            let inner = self.inner.lock().unwrap();
            inner
                .running
                .get(id)
                .map(|config| config.options.init_hooks.clone())
                .unwrap_or_default()
        };
        for hook in hooks {
            hook.on_init(timeout_init);
        }
    }

    /// Fire the terminate hooks of a job and forget it, so probes answer
    /// not-found from now on.
    pub fn fire_terminate(
        &self,
        id: &ServiceId,
        reason: TerminateReason,
        timeout_terminate: Duration,
    ) {
        self.fire_terminate_hooks(id, &reason, timeout_terminate);
        self.finish(id);
    }

    /// Fire the terminate hooks of a job but keep it alive, so probes keep
    /// succeeding until [`MockRuntime::finish`] is called.
    pub fn fire_terminate_keep(
        &self,
        id: &ServiceId,
        reason: TerminateReason,
        timeout_terminate: Duration,
    ) {
        self.fire_terminate_hooks(id, &reason, timeout_terminate);
    }

    /// Forget a job without firing any hook.
    pub fn finish(&self, id: &ServiceId) {
        self.inner.lock().unwrap().running.remove(id);
    }

    fn fire_terminate_hooks(
        &self,
        id: &ServiceId,
        reason: &TerminateReason,
        timeout_terminate: Duration,
    ) {
        let hooks = {
            let inner = self.inner.lock().unwrap();
            inner
                .running
                .get(id)
                .map(|config| config.options.terminate_hooks.clone())
                .unwrap_or_default()
        };
        for hook in hooks {
            hook.on_terminate(reason, timeout_terminate);
        }
    }
}

/// Label of a configuration: the program name for command shapes, the
/// first key for parameter shapes.
fn label_of(config: &ServiceConfig) -> String {
    match &config.spec {
        ServiceSpec::Command(spec) => spec.program.clone(),
        ServiceSpec::Params(pairs) => pairs
            .first()
            .map(|(key, _)| key.clone())
            .unwrap_or_else(|| "params".to_string()),
    }
}

#[async_trait]
impl ServiceRuntime for MockRuntime {
    async fn add(&self, config: ServiceConfig) -> Result<ServiceId, RuntimeError> {
        let label = label_of(&config);
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(RuntimeCall::Add(label.clone()));
        if inner.fail_add_labels.contains(&label) {
            return Err(RuntimeError::StartFailed(label));
        }
        let id = ServiceId::new(format!("mock-{}", inner.next_id));
        inner.next_id += 1;
        inner.running.insert(id.clone(), config);
        inner.ids_by_label.entry(label).or_default().push(id.clone());
        Ok(id)
    }

    async fn remove(&self, id: &ServiceId) -> Result<(), RuntimeError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(RuntimeCall::Remove(id.clone()));
        if inner.running.remove(id).is_some() {
            Ok(())
        } else {
            Err(RuntimeError::NotFound(id.clone()))
        }
    }

    async fn suspend(&self, id: &ServiceId) -> Result<(), RuntimeError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(RuntimeCall::Suspend(id.clone()));
        if inner.running.contains_key(id) {
            Ok(())
        } else {
            Err(RuntimeError::NotFound(id.clone()))
        }
    }

    async fn resume(&self, id: &ServiceId) -> Result<(), RuntimeError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(RuntimeCall::Resume(id.clone()));
        if inner.running.contains_key(id) {
            Ok(())
        } else {
            Err(RuntimeError::NotFound(id.clone()))
        }
    }

    async fn restart(&self, id: &ServiceId) -> Result<(), RuntimeError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(RuntimeCall::Restart(id.clone()));
        if inner.restart_not_found || !inner.running.contains_key(id) {
            Err(RuntimeError::NotFound(id.clone()))
        } else {
            Ok(())
        }
    }

    async fn probe(&self, id: &ServiceId) -> Result<(), RuntimeError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(RuntimeCall::Probe(id.clone()));
        if inner.running.contains_key(id) {
            Ok(())
        } else {
            Err(RuntimeError::NotFound(id.clone()))
        }
    }
}
