//! Configuration type definitions.
//!
//! This module contains the type definitions for the YAML settings file:
//! scheduler flags, dependency pairs, seed queues, and the API endpoint.

use serde::{Deserialize, Serialize};

use crate::core::service::ServiceConfig;

/// Scheduler settings (convoy.yaml).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// On non-clean termination, drain the queue after the job disappears.
    pub purge_on_error: bool,
    /// When a queue starts, pause dependants that are currently running.
    pub suspend_dependants: bool,
    /// Exit cleanly when all queues drain.
    pub stop_when_done: bool,
    /// Disable the command surface; requires `stop_when_done`.
    pub queues_static: bool,
    /// Precedence pairs; validated acyclic at load.
    pub queue_dependencies: Vec<DependencyPair>,
    /// Queues seeded at startup.
    pub queues: Vec<SeedQueue>,
    /// Command surface endpoint.
    pub api: ApiSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            purge_on_error: true,
            suspend_dependants: true,
            stop_when_done: false,
            queues_static: false,
            queue_dependencies: Vec::new(),
            queues: Vec::new(),
            api: ApiSettings::default(),
        }
    }
}

/// One precedence declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyPair {
    /// The queue being held back.
    pub queue: String,
    /// Queues that must be idle before it may run.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// One queue seeded at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedQueue {
    /// Queue name.
    pub queue: String,
    /// Configurations enqueued in order.
    pub services: Vec<ServiceConfig>,
}

/// Command surface endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8455,
        }
    }
}
