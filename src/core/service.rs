//! Service configurations and their lifecycle hooks.
//!
//! A [`ServiceConfig`] is the unit of work a queue carries. The scheduler
//! treats the configuration as opaque except for its options slot, where it
//! injects the two lifecycle hooks that let it observe a job starting and
//! terminating.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// How the runtime should treat a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// A service hosted inside the runtime itself.
    #[default]
    Internal,
    /// A service backed by an external program.
    External,
}

/// The body of a service configuration.
///
/// Two shapes are accepted on the wire: an inline command description, or an
/// opaque key-value list interpreted by the runtime adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServiceSpec {
    /// Inline command description.
    Command(CommandSpec),
    /// Opaque key-value parameters.
    Params(Vec<(String, Value)>),
}

/// Inline command shape: a program with arguments and environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program to execute.
    pub program: String,
    /// Command-line arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Initialization budget in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_init_ms: Option<u64>,
    /// Termination budget in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_terminate_ms: Option<u64>,
}

impl CommandSpec {
    /// Create a command spec for a bare program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            timeout_init_ms: None,
            timeout_terminate_ms: None,
        }
    }

    /// Add an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Why a service terminated, as reported by the runtime.
///
/// A reason is *clean* iff it is a plain shutdown or a tagged shutdown;
/// everything else counts as an error and drives purge-on-error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminateReason {
    /// Plain orderly shutdown.
    Shutdown,
    /// Orderly shutdown with an attached detail.
    ShutdownWith(String),
    /// Any other reason.
    Error(String),
}

impl TerminateReason {
    /// Whether this reason is a clean shutdown.
    pub fn is_clean(&self) -> bool {
        matches!(self, TerminateReason::Shutdown | TerminateReason::ShutdownWith(_))
    }
}

impl fmt::Display for TerminateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminateReason::Shutdown => write!(f, "shutdown"),
            TerminateReason::ShutdownWith(detail) => write!(f, "shutdown: {}", detail),
            TerminateReason::Error(detail) => write!(f, "{}", detail),
        }
    }
}

/// Hook invoked by the runtime after a service finished initializing.
pub trait InitHook: Send + Sync {
    /// Called with the initialization budget the service was granted.
    fn on_init(&self, timeout_init: Duration);
}

/// Hook invoked by the runtime just before a service terminates.
pub trait TerminateHook: Send + Sync {
    /// Called with the termination reason and the termination budget.
    fn on_terminate(&self, reason: &TerminateReason, timeout_terminate: Duration);
}

/// The options slot of a configuration: ordered lifecycle hooks.
///
/// Hooks injected by the scheduler are prepended to the init list and
/// appended to the terminate list, so they bracket any hooks the submitter
/// installed (LIFO coupling).
#[derive(Clone, Default)]
pub struct ServiceOptions {
    /// Hooks run after initialization, front first.
    pub init_hooks: Vec<Arc<dyn InitHook>>,
    /// Hooks run before termination, front first.
    pub terminate_hooks: Vec<Arc<dyn TerminateHook>>,
}

impl fmt::Debug for ServiceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceOptions")
            .field("init_hooks", &self.init_hooks.len())
            .field("terminate_hooks", &self.terminate_hooks.len())
            .finish()
    }
}

/// One unit of work for a queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Runtime-facing kind tag.
    #[serde(default)]
    pub kind: ServiceKind,
    /// The configuration body.
    pub spec: ServiceSpec,
    /// Lifecycle hooks; never serialized.
    #[serde(skip)]
    pub options: ServiceOptions,
}

impl ServiceConfig {
    /// Create a configuration from a spec with the default kind.
    pub fn new(spec: ServiceSpec) -> Self {
        Self {
            kind: ServiceKind::default(),
            spec,
            options: ServiceOptions::default(),
        }
    }

    /// Create an external command configuration.
    pub fn command(spec: CommandSpec) -> Self {
        Self {
            kind: ServiceKind::External,
            spec: ServiceSpec::Command(spec),
            options: ServiceOptions::default(),
        }
    }

    /// Set the kind tag.
    pub fn with_kind(mut self, kind: ServiceKind) -> Self {
        self.kind = kind;
        self
    }

    /// Install an init hook ahead of all existing init hooks.
    pub fn prepend_init_hook(&mut self, hook: Arc<dyn InitHook>) {
        self.options.init_hooks.insert(0, hook);
    }

    /// Install a terminate hook after all existing terminate hooks.
    pub fn append_terminate_hook(&mut self, hook: Arc<dyn TerminateHook>) {
        self.options.terminate_hooks.push(hook);
    }
}

impl PartialEq for ServiceConfig {
    fn eq(&self, other: &Self) -> bool {
        // Hooks are deliberately excluded: two configs are the same work
        // item regardless of who is observing them.
        self.kind == other.kind && self.spec == other.spec
    }
}
