//! Process-backed runtime adapter.
//!
//! [`ProcessRuntime`] executes command-shaped configurations as OS
//! processes. A successful spawn counts as initialization complete (the
//! init hooks fire right after), and the terminate hooks fire once the
//! child exits: exit status zero, or a stop requested through the adapter,
//! is reported as a clean shutdown; anything else as an error reason.
//! Suspend and resume are delivered as SIGSTOP/SIGCONT. The internal and
//! external kind tags are treated alike here; runtimes that host services
//! in-process can distinguish them.

use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::core::service::{CommandSpec, ServiceConfig, ServiceSpec, TerminateReason};
use crate::core::types::ServiceId;

use super::{RuntimeError, ServiceRuntime};

/// Initialization budget reported when a configuration names none.
const DEFAULT_TIMEOUT_INIT: Duration = Duration::from_secs(5);

/// Termination budget reported when a configuration names none.
const DEFAULT_TIMEOUT_TERMINATE: Duration = Duration::from_secs(5);

struct ProcessHandle {
    pid: u32,
    config: ServiceConfig,
    /// Set before an adapter-requested stop so the exit reads as clean.
    stopping: Arc<AtomicBool>,
}

/// Runtime adapter that runs each service as a child process.
pub struct ProcessRuntime {
    services: Arc<Mutex<HashMap<ServiceId, ProcessHandle>>>,
    next_id: AtomicU64,
}

impl ProcessRuntime {
    /// Create an empty process runtime.
    pub fn new() -> Self {
        Self {
            services: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of live child processes.
    pub async fn running(&self) -> usize {
        self.services.lock().await.len()
    }

    async fn spawn_service(
        &self,
        id: ServiceId,
        config: ServiceConfig,
    ) -> Result<(), RuntimeError> {
        let spec = resolve_command(&config)?;

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null());

        let mut child = command
            .spawn()
            .map_err(|e| RuntimeError::StartFailed(format!("{}: {}", spec.program, e)))?;
        let pid = child
            .id()
            .ok_or_else(|| RuntimeError::StartFailed(format!("{}: exited on spawn", spec.program)))?;

        let timeout_init = spec
            .timeout_init_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TIMEOUT_INIT);
        let timeout_terminate = spec
            .timeout_terminate_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TIMEOUT_TERMINATE);

        let stopping = Arc::new(AtomicBool::new(false));
        let handle = ProcessHandle {
            pid,
            config: config.clone(),
            stopping: Arc::clone(&stopping),
        };
        self.services.lock().await.insert(id.clone(), handle);

        for hook in &config.options.init_hooks {
            hook.on_init(timeout_init);
        }

        let services = Arc::clone(&self.services);
        tokio::spawn(async move {
            let status = child.wait().await;
            let clean =
                stopping.load(Ordering::SeqCst) || matches!(&status, Ok(s) if s.success());
            let reason = if clean {
                TerminateReason::Shutdown
            } else {
                match status {
                    Ok(status) => TerminateReason::Error(format!("exit status: {}", status)),
                    Err(e) => TerminateReason::Error(format!("wait failed: {}", e)),
                }
            };
            for hook in &config.options.terminate_hooks {
                hook.on_terminate(&reason, timeout_terminate);
            }
            let mut table = services.lock().await;
            // A restart may have replaced this entry with a newer child.
            if table.get(&id).is_some_and(|h| h.pid == pid) {
                table.remove(&id);
            }
        });

        Ok(())
    }
}

impl Default for ProcessRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceRuntime for ProcessRuntime {
    async fn add(&self, config: ServiceConfig) -> Result<ServiceId, RuntimeError> {
        let id = ServiceId::new(format!("proc-{}", self.next_id.fetch_add(1, Ordering::SeqCst)));
        self.spawn_service(id.clone(), config).await?;
        Ok(id)
    }

    async fn remove(&self, id: &ServiceId) -> Result<(), RuntimeError> {
        let pid = {
            let table = self.services.lock().await;
            let handle = table
                .get(id)
                .ok_or_else(|| RuntimeError::NotFound(id.clone()))?;
            handle.stopping.store(true, Ordering::SeqCst);
            handle.pid
        };
        signal(id, pid, libc::SIGTERM)
    }

    async fn suspend(&self, id: &ServiceId) -> Result<(), RuntimeError> {
        let pid = self.pid_of(id).await?;
        signal(id, pid, libc::SIGSTOP)
    }

    async fn resume(&self, id: &ServiceId) -> Result<(), RuntimeError> {
        let pid = self.pid_of(id).await?;
        signal(id, pid, libc::SIGCONT)
    }

    async fn restart(&self, id: &ServiceId) -> Result<(), RuntimeError> {
        let (pid, config) = {
            let table = self.services.lock().await;
            let handle = table
                .get(id)
                .ok_or_else(|| RuntimeError::NotFound(id.clone()))?;
            handle.stopping.store(true, Ordering::SeqCst);
            (handle.pid, handle.config.clone())
        };
        signal(id, pid, libc::SIGKILL)?;
        // The replacement keeps the id; the old watcher sees a pid mismatch
        // and leaves the fresh entry alone.
        self.spawn_service(id.clone(), config).await
    }

    async fn probe(&self, id: &ServiceId) -> Result<(), RuntimeError> {
        if self.services.lock().await.contains_key(id) {
            Ok(())
        } else {
            Err(RuntimeError::NotFound(id.clone()))
        }
    }
}

impl ProcessRuntime {
    async fn pid_of(&self, id: &ServiceId) -> Result<u32, RuntimeError> {
        self.services
            .lock()
            .await
            .get(id)
            .map(|h| h.pid)
            .ok_or_else(|| RuntimeError::NotFound(id.clone()))
    }
}

/// Extract a runnable command from either configuration shape.
fn resolve_command(config: &ServiceConfig) -> Result<CommandSpec, RuntimeError> {
    match &config.spec {
        ServiceSpec::Command(spec) => Ok(spec.clone()),
        ServiceSpec::Params(pairs) => {
            let mut spec: Option<CommandSpec> = None;
            for (key, value) in pairs {
                if key == "program" {
                    if let Some(program) = value.as_str() {
                        spec = Some(CommandSpec::new(program));
                    }
                }
            }
            let mut spec = spec.ok_or_else(|| {
                RuntimeError::Unsupported("params shape carries no program key".to_string())
            })?;
            for (key, value) in pairs {
                if key == "args" {
                    if let Some(args) = value.as_array() {
                        spec.args = args
                            .iter()
                            .filter_map(|a| a.as_str().map(String::from))
                            .collect();
                    }
                }
            }
            Ok(spec)
        }
    }
}

fn signal(id: &ServiceId, pid: u32, sig: libc::c_int) -> Result<(), RuntimeError> {
    let res = unsafe { libc::kill(pid as libc::pid_t, sig) };
    if res == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Err(RuntimeError::NotFound(id.clone()))
    } else {
        Err(RuntimeError::Other(format!(
            "kill({}, {}) failed: {}",
            pid, sig, err
        )))
    }
}
