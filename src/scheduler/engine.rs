//! Coordinator engine.
//!
//! The coordinator is responsible for:
//! - Running each queue's configurations one at a time, in FIFO order
//! - Holding queues back while a dependency still has work
//! - Pausing and resuming dependants of a starting queue
//! - Waiting out a terminating job's disappearance on a bounded budget
//! - Purging a queue after an error-class termination
//! - Seeding queues from configuration and stopping once everything drains
//!
//! All queue state is owned by a single task that serializes every command
//! and every lifecycle event over its input channels.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::deps::DependencyGraph;
use crate::core::queue::QueueEntry;
use crate::core::service::{InitHook, ServiceConfig, TerminateHook, TerminateReason};
use crate::core::types::QueueName;
use crate::events::{Event, EventBus};
use crate::runtime::ServiceRuntime;

use super::handle::{SchedulerHandle, COMMAND_CHANNEL_BUFFER};
use super::types::{CoordinatorState, LifecycleEvent, SchedulerCommand, SchedulerError};

/// Interval between disappearance re-checks of a terminating job.
const TERMINATE_TICK: Duration = Duration::from_millis(500);

/// Slack added on top of the init and terminate budgets.
const TERMINATE_GRACE: Duration = Duration::from_millis(100);

/// Init-after hook injected into every submitted configuration.
struct QueueInitHook {
    queue: QueueName,
    tx: mpsc::UnboundedSender<LifecycleEvent>,
}

impl InitHook for QueueInitHook {
    fn on_init(&self, timeout_init: Duration) {
        let _ = self.tx.send(LifecycleEvent::InitAfter {
            queue: self.queue.clone(),
            timeout_init,
        });
    }
}

/// Terminate-before hook injected into every submitted configuration.
struct QueueTerminateHook {
    queue: QueueName,
    tx: mpsc::UnboundedSender<LifecycleEvent>,
}

impl TerminateHook for QueueTerminateHook {
    fn on_terminate(&self, reason: &TerminateReason, timeout_terminate: Duration) {
        let _ = self.tx.send(LifecycleEvent::TerminateBefore {
            queue: self.queue.clone(),
            reason: reason.clone(),
            timeout_terminate,
        });
    }
}

/// Spawn the timer that re-checks a terminating job, or declares it
/// terminated once the budget is spent.
fn spawn_terminate_timer(
    tx: mpsc::UnboundedSender<LifecycleEvent>,
    queue: QueueName,
    remaining: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if remaining > TERMINATE_TICK {
            tokio::time::sleep(TERMINATE_TICK).await;
            let _ = tx.send(LifecycleEvent::TerminateCheck {
                queue,
                remaining: remaining - TERMINATE_TICK,
            });
        } else {
            tokio::time::sleep(remaining).await;
            let _ = tx.send(LifecycleEvent::Terminated { queue });
        }
    })
}

/// Batch service scheduler.
///
/// Build one with the runtime adapter it should drive, then call
/// [`Scheduler::start`] to spawn the coordinator task and obtain the
/// controlling [`SchedulerHandle`].
pub struct Scheduler<R: ServiceRuntime> {
    /// Runtime adapter.
    runtime: Arc<R>,
    /// Static precedence between queues.
    deps: DependencyGraph,
    /// Event bus for emitting events.
    event_bus: Arc<EventBus>,
    /// Drain a queue after an error-class termination.
    purge_on_error: bool,
    /// Pause running dependants when one of their dependencies starts.
    suspend_dependants: bool,
    /// Stop once the last queue drains.
    stop_when_done: bool,
    /// Queues seeded at startup.
    seed: Vec<(QueueName, Vec<ServiceConfig>)>,
    /// The queue table. Owned exclusively by the coordinator task.
    queues: HashMap<QueueName, QueueEntry>,
    /// Sender cloned into every injected hook and timer.
    events_tx: mpsc::UnboundedSender<LifecycleEvent>,
    /// Receiver handed to the coordinator task on start.
    events_rx: Option<mpsc::UnboundedReceiver<LifecycleEvent>>,
}

impl<R: ServiceRuntime + 'static> Scheduler<R> {
    /// Create a new scheduler driving the given runtime adapter.
    pub fn new(runtime: R) -> Self {
        Self::with_runtime(Arc::new(runtime))
    }

    /// Create a new scheduler with a shared runtime adapter (for testing).
    pub fn with_runtime(runtime: Arc<R>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            runtime,
            deps: DependencyGraph::empty(),
            event_bus: Arc::new(EventBus::new()),
            purge_on_error: true,
            suspend_dependants: true,
            stop_when_done: false,
            seed: Vec::new(),
            queues: HashMap::new(),
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Set the dependency graph.
    pub fn with_dependencies(mut self, deps: DependencyGraph) -> Self {
        self.deps = deps;
        self
    }

    /// Set the event bus.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Arc::new(event_bus);
        self
    }

    /// Control purge-on-error (default: enabled).
    pub fn with_purge_on_error(mut self, purge: bool) -> Self {
        self.purge_on_error = purge;
        self
    }

    /// Control pausing of running dependants (default: enabled).
    pub fn with_suspend_dependants(mut self, suspend: bool) -> Self {
        self.suspend_dependants = suspend;
        self
    }

    /// Stop the coordinator once all queues drain (default: disabled).
    pub fn with_stop_when_done(mut self, stop: bool) -> Self {
        self.stop_when_done = stop;
        self
    }

    /// Seed queues processed at startup, before any command.
    pub fn with_seed_queues(mut self, seed: Vec<(QueueName, Vec<ServiceConfig>)>) -> Self {
        self.seed = seed;
        self
    }

    /// Get the event bus.
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Start the coordinator task and return a handle for controlling it.
    pub async fn start(mut self) -> (SchedulerHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_BUFFER);
        let events_rx = self.events_rx.take().expect("scheduler already started");
        let state = Arc::new(RwLock::new(CoordinatorState::Running));

        let handle = SchedulerHandle {
            command_tx,
            state: Arc::clone(&state),
        };

        let task = tokio::spawn(async move {
            self.run(command_rx, events_rx, state).await;
        });

        (handle, task)
    }

    /// Main coordinator loop.
    async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<SchedulerCommand>,
        mut events_rx: mpsc::UnboundedReceiver<LifecycleEvent>,
        state: Arc<RwLock<CoordinatorState>>,
    ) {
        self.seed_queues().await;

        loop {
            tokio::select! {
                Some(command) = command_rx.recv() => {
                    if self.handle_command(command).await {
                        info!("scheduler shutting down");
                        break;
                    }
                }
                Some(event) = events_rx.recv() => {
                    if self.handle_event(event).await {
                        info!("all queues drained, stopping");
                        self.event_bus.emit(Event::scheduler_stopped()).await;
                        break;
                    }
                }
                else => break,
            }
        }

        *state.write().await = CoordinatorState::Stopped;
    }

    /// Process seed queues as a sequence of `services_add` calls.
    async fn seed_queues(&mut self) {
        let seed = std::mem::take(&mut self.seed);
        for (queue, configs) in seed {
            if configs.is_empty() {
                continue;
            }
            if let Err(e) = self.services_add(queue.clone(), configs).await {
                warn!(queue = %queue, error = %e, "seed queue failed to start");
            }
        }
    }

    /// Dispatch one command. Returns `true` on shutdown.
    async fn handle_command(&mut self, command: SchedulerCommand) -> bool {
        match command {
            SchedulerCommand::QueueList { queue, response } => {
                let _ = response.send(self.queue_list(&queue));
            }
            SchedulerCommand::QueueClear { queue, response } => {
                let _ = response.send(self.queue_clear(&queue).await);
            }
            SchedulerCommand::QueueSuspend { queue, response } => {
                let _ = response.send(self.queue_suspend(&queue).await);
            }
            SchedulerCommand::QueueResume { queue, response } => {
                let _ = response.send(self.queue_resume(&queue).await);
            }
            SchedulerCommand::ServicesAdd {
                queue,
                configs,
                response,
            } => {
                let _ = response.send(self.services_add(queue, configs).await);
            }
            SchedulerCommand::ServicesRemove { queue, response } => {
                let _ = response.send(self.services_remove(&queue).await);
            }
            SchedulerCommand::ServicesRestart { queue, response } => {
                let _ = response.send(self.services_restart(&queue).await);
            }
            SchedulerCommand::Shutdown { response } => {
                let _ = response.send(());
                return true;
            }
        }
        false
    }

    /// Dispatch one lifecycle event. Returns `true` once the last queue
    /// drained under stop-when-done.
    async fn handle_event(&mut self, event: LifecycleEvent) -> bool {
        match event {
            LifecycleEvent::InitAfter {
                queue,
                timeout_init,
            } => {
                self.handle_init_after(queue, timeout_init);
                false
            }
            LifecycleEvent::TerminateBefore {
                queue,
                reason,
                timeout_terminate,
            } => {
                self.handle_terminate_before(queue, reason, timeout_terminate)
                    .await;
                false
            }
            LifecycleEvent::TerminateCheck { queue, remaining } => {
                self.handle_terminate_check(queue, remaining).await;
                false
            }
            LifecycleEvent::Terminated { queue } => {
                self.handle_terminated(queue).await;
                self.stop_when_done && self.queues.is_empty()
            }
        }
    }

    // ---- Commands ----

    fn queue_list(&self, queue: &QueueName) -> Result<Vec<ServiceConfig>, SchedulerError> {
        self.queues
            .get(queue)
            .map(|entry| entry.pending_configs())
            .ok_or_else(|| SchedulerError::QueueNotFound(queue.clone()))
    }

    async fn queue_clear(&mut self, queue: &QueueName) -> Result<(), SchedulerError> {
        let running = self
            .queues
            .get(queue)
            .ok_or_else(|| SchedulerError::QueueNotFound(queue.clone()))?
            .service_id
            .is_some();
        if running {
            if let Some(entry) = self.queues.get_mut(queue) {
                entry.clear_pending();
            }
        } else {
            self.remove_entry(queue).await;
            self.resume_dependants(queue).await;
        }
        Ok(())
    }

    async fn queue_suspend(&mut self, queue: &QueueName) -> Result<(), SchedulerError> {
        let entry = self
            .queues
            .get(queue)
            .ok_or_else(|| SchedulerError::QueueNotFound(queue.clone()))?;
        let Some(id) = entry.service_id.clone() else {
            return Err(SchedulerError::NotRunning(queue.clone()));
        };
        match self.runtime.suspend(&id).await {
            Ok(()) => Ok(()),
            // The job raced away; nothing left to pause.
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn queue_resume(&mut self, queue: &QueueName) -> Result<(), SchedulerError> {
        let entry = self
            .queues
            .get(queue)
            .ok_or_else(|| SchedulerError::QueueNotFound(queue.clone()))?;
        let Some(id) = entry.service_id.clone() else {
            return Err(SchedulerError::NotRunning(queue.clone()));
        };
        match self.runtime.resume(&id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn services_add(
        &mut self,
        queue: QueueName,
        configs: Vec<ServiceConfig>,
    ) -> Result<usize, SchedulerError> {
        if let Some(entry) = self.queues.get_mut(&queue) {
            entry.extend(configs);
            return Ok(entry.pending());
        }

        // The handle rejects empty lists; stay harmless if one slips through.
        if configs.is_empty() {
            return Ok(0);
        }

        if self.deps_blocked(&queue) {
            let mut entry = QueueEntry::new();
            entry.extend(configs);
            entry.suspended = true;
            let pending = entry.pending();
            debug!(queue = %queue, pending, "queue created held back by dependencies");
            self.queues.insert(queue.clone(), entry);
            self.event_bus.emit(Event::queue_suspended(queue)).await;
            return Ok(pending);
        }

        if self.suspend_dependants {
            self.suspend_dependants_of(&queue).await;
        }

        let mut rest: VecDeque<ServiceConfig> = configs.into();
        let Some(first) = rest.pop_front() else {
            return Ok(0);
        };
        let decorated = self.decorate(&queue, first);
        match self.runtime.add(decorated).await {
            Ok(id) => {
                let mut entry = QueueEntry::new();
                entry.service_id = Some(id.clone());
                entry.extend(rest);
                let pending = entry.pending();
                self.queues.insert(queue.clone(), entry);
                self.event_bus
                    .emit(Event::service_started(queue, id))
                    .await;
                Ok(pending)
            }
            Err(e) => {
                warn!(queue = %queue, error = %e, "first service failed to start; queue purged");
                // The queue never materialized, so undo any dependant pause.
                self.resume_dependants(&queue).await;
                Err(SchedulerError::Purged(queue))
            }
        }
    }

    async fn services_remove(&mut self, queue: &QueueName) -> Result<(), SchedulerError> {
        let entry = self
            .queues
            .get(queue)
            .ok_or_else(|| SchedulerError::QueueNotFound(queue.clone()))?;
        if let Some(id) = entry.service_id.clone() {
            if let Err(e) = self.runtime.remove(&id).await {
                debug!(queue = %queue, error = %e, "stop request failed");
            }
        }
        self.remove_entry(queue).await;
        self.resume_dependants(queue).await;
        Ok(())
    }

    async fn services_restart(&mut self, queue: &QueueName) -> Result<(), SchedulerError> {
        let entry = self
            .queues
            .get(queue)
            .ok_or_else(|| SchedulerError::QueueNotFound(queue.clone()))?;
        let Some(id) = entry.service_id.clone() else {
            return Err(SchedulerError::NotRunning(queue.clone()));
        };
        match self.runtime.restart(&id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                // The job is gone: keep the pending work, or drop the queue
                // if there is none.
                let has_pending = self.queues.get(queue).is_some_and(|e| !e.is_empty());
                if has_pending {
                    if let Some(entry) = self.queues.get_mut(queue) {
                        entry.service_id = None;
                    }
                } else {
                    self.remove_entry(queue).await;
                    self.resume_dependants(queue).await;
                }
                Err(SchedulerError::NotRunning(queue.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    // ---- Lifecycle events ----

    fn handle_init_after(&mut self, queue: QueueName, timeout_init: Duration) {
        let Some(entry) = self.queues.get_mut(&queue) else {
            return;
        };
        debug!(queue = %queue, ?timeout_init, "service initialized");
        entry.timeout_init = Some(timeout_init);
        entry.clear_termination();
    }

    async fn handle_terminate_before(
        &mut self,
        queue: QueueName,
        reason: TerminateReason,
        timeout_terminate: Duration,
    ) {
        let clean = reason.is_clean();
        let purge = self.purge_on_error && !clean;
        let Some(entry) = self.queues.get_mut(&queue) else {
            return;
        };
        if entry.terminate {
            // Repeated notification from an inner hook: only raise the
            // purge flag.
            entry.terminate_purge |= purge;
            return;
        }
        let budget =
            timeout_terminate + entry.timeout_init.unwrap_or(Duration::ZERO) + TERMINATE_GRACE;
        entry.terminate = true;
        entry.terminate_purge |= purge;
        let timer = spawn_terminate_timer(self.events_tx.clone(), queue.clone(), budget);
        entry.set_terminate_timer(timer);
        debug!(queue = %queue, %reason, ?budget, "service terminating");
        self.event_bus
            .emit(Event::service_terminating(queue, clean))
            .await;
    }

    async fn handle_terminate_check(&mut self, queue: QueueName, remaining: Duration) {
        // Cancellation is fire-and-forget, so a stale tick may still arrive;
        // any flag mismatch is a silent drop.
        let Some(entry) = self.queues.get(&queue) else {
            return;
        };
        if !entry.terminate || !entry.has_terminate_timer() {
            return;
        }
        let gone = match entry.service_id.clone() {
            None => true,
            Some(id) => matches!(self.runtime.probe(&id).await, Err(e) if e.is_not_found()),
        };
        if gone {
            self.handle_terminated(queue).await;
        } else if let Some(entry) = self.queues.get_mut(&queue) {
            if entry.terminate {
                let timer = spawn_terminate_timer(self.events_tx.clone(), queue.clone(), remaining);
                entry.set_terminate_timer(timer);
            }
        }
    }

    async fn handle_terminated(&mut self, queue: QueueName) {
        let (purge, empty) = {
            let Some(entry) = self.queues.get_mut(&queue) else {
                return;
            };
            if !entry.terminate {
                // A fresh init raced the timer.
                return;
            }
            entry.clear_termination();
            (entry.terminate_purge, entry.is_empty())
        };

        if purge {
            let dropped = self
                .queues
                .remove(&queue)
                .map(|entry| entry.pending())
                .unwrap_or(0);
            info!(queue = %queue, dropped, "queue purged after error termination");
            self.event_bus
                .emit(Event::queue_purged(queue.clone(), dropped))
                .await;
            self.resume_dependants(&queue).await;
            return;
        }

        if empty {
            self.remove_entry(&queue).await;
            self.resume_dependants(&queue).await;
            return;
        }

        if self.deps_blocked(&queue) {
            if let Some(entry) = self.queues.get_mut(&queue) {
                entry.service_id = None;
                entry.suspended = true;
            }
            self.event_bus.emit(Event::queue_suspended(queue)).await;
            return;
        }

        if !self.start_next(&queue).await {
            self.resume_dependants(&queue).await;
        }
    }

    // ---- Cascades ----

    /// Whether a dependency of `queue` still has work.
    fn deps_blocked(&self, queue: &QueueName) -> bool {
        self.deps
            .is_blocked(queue, |dep| self.queues.contains_key(dep))
    }

    /// Install the coordinator's lifecycle hooks into a configuration.
    fn decorate(&self, queue: &QueueName, mut config: ServiceConfig) -> ServiceConfig {
        config.prepend_init_hook(Arc::new(QueueInitHook {
            queue: queue.clone(),
            tx: self.events_tx.clone(),
        }));
        config.append_terminate_hook(Arc::new(QueueTerminateHook {
            queue: queue.clone(),
            tx: self.events_tx.clone(),
        }));
        config
    }

    /// Remove a queue entry, emitting the removal event. The entry's timer,
    /// if any, is aborted on drop.
    async fn remove_entry(&mut self, queue: &QueueName) -> bool {
        if self.queues.remove(queue).is_some() {
            self.event_bus
                .emit(Event::queue_removed(queue.clone()))
                .await;
            true
        } else {
            false
        }
    }

    /// Start the next pending configuration of `queue`. Returns `false` if
    /// the queue was dropped instead (nothing pending, or the start failed).
    ///
    /// A queue activating out of the held state pauses its running
    /// dependants the same way a fresh start does.
    async fn start_next(&mut self, queue: &QueueName) -> bool {
        let Some(config) = self.queues.get_mut(queue).and_then(|e| e.pop_front()) else {
            self.remove_entry(queue).await;
            return false;
        };
        if self.suspend_dependants {
            self.suspend_dependants_of(queue).await;
        }
        let decorated = self.decorate(queue, config);
        match self.runtime.add(decorated).await {
            Ok(id) => {
                if let Some(entry) = self.queues.get_mut(queue) {
                    entry.service_id = Some(id.clone());
                    entry.suspended = false;
                    entry.terminate_purge = false;
                    entry.clear_termination();
                }
                self.event_bus
                    .emit(Event::service_started(queue.clone(), id))
                    .await;
                true
            }
            Err(e) => {
                warn!(queue = %queue, error = %e, "failed to start next service; dropping queue");
                self.remove_entry(queue).await;
                false
            }
        }
    }

    /// Pause running dependants of a queue that is about to start.
    async fn suspend_dependants_of(&mut self, queue: &QueueName) {
        let candidates: Vec<_> = self
            .deps
            .dependants_of(queue)
            .iter()
            .filter_map(|dep| {
                self.queues.get(dep).and_then(|entry| {
                    if entry.suspended {
                        None
                    } else {
                        entry.service_id.clone().map(|id| (dep.clone(), id))
                    }
                })
            })
            .collect();

        for (name, id) in candidates {
            match self.runtime.suspend(&id).await {
                Ok(()) => {
                    if let Some(entry) = self.queues.get_mut(&name) {
                        entry.suspended = true;
                    }
                    self.event_bus
                        .emit(Event::queue_suspended(name.clone()))
                        .await;
                }
                // The job raced away mid-pause; leave the flag unchanged.
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    warn!(queue = %name, error = %e, "failed to pause dependant");
                }
            }
        }
    }

    /// Scan the dependants of a queue that just went away and resume those
    /// no longer held back. Nested removals extend the scan instead of
    /// recursing.
    async fn resume_dependants(&mut self, queue: &QueueName) {
        let mut worklist: VecDeque<QueueName> =
            self.deps.dependants_of(queue).iter().cloned().collect();

        while let Some(name) = worklist.pop_front() {
            let blocked = self.deps_blocked(&name);
            let Some(entry) = self.queues.get(&name) else {
                continue;
            };
            if !entry.suspended || blocked {
                continue;
            }
            match entry.service_id.clone() {
                Some(id) => match self.runtime.resume(&id).await {
                    Ok(()) => {
                        if let Some(entry) = self.queues.get_mut(&name) {
                            entry.suspended = false;
                        }
                        self.event_bus
                            .emit(Event::queue_resumed(name.clone()))
                            .await;
                    }
                    Err(e) if e.is_not_found() => {
                        // The paused job vanished while its queue was held.
                        let has_pending =
                            self.queues.get(&name).is_some_and(|e| !e.is_empty());
                        if has_pending {
                            if let Some(entry) = self.queues.get_mut(&name) {
                                entry.service_id = None;
                            }
                            if !self.start_next(&name).await {
                                worklist
                                    .extend(self.deps.dependants_of(&name).iter().cloned());
                            }
                        } else {
                            self.remove_entry(&name).await;
                            worklist.extend(self.deps.dependants_of(&name).iter().cloned());
                        }
                    }
                    Err(e) => {
                        warn!(queue = %name, error = %e, "failed to resume dependant");
                    }
                },
                None => {
                    // Pending work only: advance from the first entry.
                    if !self.start_next(&name).await {
                        worklist.extend(self.deps.dependants_of(&name).iter().cloned());
                    }
                }
            }
        }
    }
}
